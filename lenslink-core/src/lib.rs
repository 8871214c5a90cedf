//! # lenslink-core
//!
//! Duplex video streaming engine for a phone ↔ smart-glasses link.
//! Encoded H.264/H.265 units travel over one of three transports —
//! a BLE data channel, a TCP socket, or a vendor SDK session — with
//! negotiation, framing, bounded buffering, and decoder lifecycle
//! handled here; capture, rendering, and the codec hardware stay
//! behind traits.
//!
//! This crate contains:
//! - **Bitstream**: NAL-level classification of access units
//!   (configuration / keyframe / delta, AVC and HEVC)
//! - **Wire**: three `tokio_util` codecs, one per transport framing
//! - **Queue**: bounded drop-oldest frame queues with a non-droppable
//!   path for configuration units
//! - **Negotiate**: attribute-table advertise/scan handshake and the
//!   link phase state machine
//! - **Transport**: channel abstractions for BLE, TCP, vendor SDK,
//!   and in-memory loopback
//! - **Sink**: surface/decoder lifecycle reconciliation
//! - **Pipeline**: the worker loops and [`StreamSession`]
//!   orchestration tying it all together
//! - **Error**: [`LinkError`] — typed, `thiserror`-based error
//!   hierarchy

pub mod bitstream;
pub mod cache;
pub mod device;
pub mod error;
pub mod negotiate;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod surface;
pub mod transport;
pub mod unit;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bitstream::{Classification, StreamInspector, classify, classify_as, contains_config};
pub use cache::ConfigCache;
pub use device::{DecoderDevice, EncodedChunk, EncoderSource};
pub use error::LinkError;
pub use negotiate::{
    ConnectionDescriptor, ConnectionMode, Language, LinkPhase, StreamDirection,
};
pub use pipeline::{
    CounterSnapshot, InboundLeg, OutboundLeg, SessionConfig, SessionEvent, StreamCounters,
    StreamSession, ThroughputEstimator,
};
pub use queue::{CAP_BLE, CAP_LOCAL, CAP_LOW_LATENCY, FrameQueue};
pub use sink::{DecodeSink, SinkState};
pub use surface::{SurfaceHandle, SurfaceId, SurfaceSlot};
pub use transport::{
    BleChannel, ByteStream, ChannelDirection, ChannelFactory, MemoryChannel, TcpChannel,
    TransportChannel, TransportKind, VendorChannel, VendorSession, loopback_pair,
};
pub use unit::{CodecFamily, UnitKind, VideoUnit};
pub use wire::{ControlMessage, LinkCodec, MAX_UNIT_LEN, WireFormat, WirePacket};
