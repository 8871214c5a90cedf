//! Wire framing for the three transport paths.
//!
//! One bitstream unit becomes one wire packet. Three formats exist
//! because the transports expose different primitives:
//!
//! | Format                  | Path                | Layout (little-endian)                          |
//! |-------------------------|---------------------|-------------------------------------------------|
//! | [`simple`]              | BLE data channel    | `[u32 len][payload]`                            |
//! | [`typed`]               | TCP socket / vendor | `[u32 total][u8 type][payload]`                 |
//! | [`sdk`]                 | vendor blob channel | `[u32 size][i64 ts_us][u8 key]` + payload       |
//!
//! All three are `tokio_util::codec` implementations: short reads
//! accumulate (`Ok(None)`), a complete packet is only claimed once
//! every byte is buffered, and a malformed length is rejected before
//! any payload-sized allocation. On rejection the codec consumes the
//! offending header and returns [`LinkError::Framing`]; the read loop
//! logs it, bumps a resync counter, and continues at the next header
//! (documented policy: skip and continue).

pub mod sdk;
pub mod simple;
pub mod typed;

pub use sdk::SdkCodec;
pub use simple::SimpleCodec;
pub use typed::TypedCodec;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::transport::TransportKind;

/// Maximum declared payload length any format accepts.
pub const MAX_UNIT_LEN: usize = 1_000_000;

// ── WirePacket ───────────────────────────────────────────────────

/// A parsed wire packet, independent of which format carried it.
#[derive(Debug, Clone, PartialEq)]
pub enum WirePacket {
    /// One bitstream unit plus its metadata. The simple format
    /// carries no metadata; parsing it yields zero/false here.
    Video {
        timestamp_us: i64,
        keyframe: bool,
        payload: Bytes,
    },
    /// Application-defined control payload (UTF-8, typically JSON).
    Control(String),
    /// Keepalive; counted and discarded by the consumer.
    Heartbeat,
}

impl WirePacket {
    /// Frame-type byte used by the typed format.
    pub fn frame_type(&self) -> u8 {
        match self {
            Self::Video { .. } => typed::FRAME_TYPE_VIDEO,
            Self::Control(_) => typed::FRAME_TYPE_CONTROL,
            Self::Heartbeat => typed::FRAME_TYPE_HEARTBEAT,
        }
    }
}

// ── ControlMessage ───────────────────────────────────────────────

/// JSON body of a Control packet. The engine parses the envelope and
/// treats the body as opaque application data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Application-defined topic, e.g. `"orientation"`.
    pub topic: String,
    /// Arbitrary JSON body.
    #[serde(default)]
    pub body: serde_json::Value,
}

impl ControlMessage {
    pub fn to_json(&self) -> Result<String, LinkError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(text)?)
    }
}

// ── WireFormat / LinkCodec ───────────────────────────────────────

/// Which framing a channel speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Bare length-prefixed payloads.
    Simple,
    /// Length + frame-type byte, supports control and heartbeat.
    Typed,
    /// Fixed 13-byte metadata header, one blob per unit.
    SdkHeader,
}

impl WireFormat {
    /// The format each transport speaks by default.
    pub fn for_transport(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Ble => WireFormat::Simple,
            TransportKind::Tcp | TransportKind::Memory => WireFormat::Typed,
            TransportKind::Vendor => WireFormat::SdkHeader,
        }
    }
}

/// Format-dispatching codec so the pipeline stays transport-blind.
#[derive(Debug)]
pub enum LinkCodec {
    Simple(SimpleCodec),
    Typed(TypedCodec),
    Sdk(SdkCodec),
}

impl LinkCodec {
    pub fn new(format: WireFormat) -> Self {
        match format {
            WireFormat::Simple => Self::Simple(SimpleCodec::default()),
            WireFormat::Typed => Self::Typed(TypedCodec::default()),
            WireFormat::SdkHeader => Self::Sdk(SdkCodec::default()),
        }
    }
}

impl Decoder for LinkCodec {
    type Item = WirePacket;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WirePacket>, LinkError> {
        match self {
            Self::Simple(c) => c.decode(src),
            Self::Typed(c) => c.decode(src),
            Self::Sdk(c) => c.decode(src),
        }
    }
}

impl Encoder<WirePacket> for LinkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: WirePacket, dst: &mut BytesMut) -> Result<(), LinkError> {
        match self {
            Self::Simple(c) => c.encode(item, dst),
            Self::Typed(c) => c.encode(item, dst),
            Self::Sdk(c) => c.encode(item, dst),
        }
    }
}
