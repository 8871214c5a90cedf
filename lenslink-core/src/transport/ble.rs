//! BLE connection-oriented channel transport.
//!
//! The OS BLE stack is an external collaborator: [`ChannelFactory`]
//! opens an L2CAP-style data channel by PSM and yields its byte
//! stream. Negotiation (service discovery, attribute reads, PSM
//! exchange) lives in [`crate::negotiate`]; once a PSM is known, a
//! [`BleChannel`] is just that stream with direction metadata.

use async_trait::async_trait;

use crate::error::LinkError;
use crate::transport::{ByteStream, ChannelDirection, TransportChannel, TransportKind};

// ── ChannelFactory ───────────────────────────────────────────────

/// Opens outbound BLE data channels by PSM (scanner side).
#[async_trait]
pub trait ChannelFactory: Send {
    async fn open_channel(&mut self, psm: u32) -> Result<Box<dyn ByteStream>, LinkError>;
}

// ── BleChannel ───────────────────────────────────────────────────

/// One directional BLE data channel, already established by the
/// negotiation layer.
pub struct BleChannel {
    psm: u32,
    direction: ChannelDirection,
    stream: Option<Box<dyn ByteStream>>,
}

impl BleChannel {
    pub fn new(psm: u32, direction: ChannelDirection, stream: Box<dyn ByteStream>) -> Self {
        Self {
            psm,
            direction,
            stream: Some(stream),
        }
    }

    /// The PSM this channel was opened on.
    pub fn psm(&self) -> u32 {
        self.psm
    }
}

#[async_trait]
impl TransportChannel for BleChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn direction(&self) -> ChannelDirection {
        self.direction
    }

    async fn connect_or_accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError> {
        match self.stream.take() {
            Some(s) => Ok(s),
            None => Err(LinkError::Protocol("ble channel already established")),
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.stream = None;
        Ok(())
    }
}
