//! In-process loopback transport.
//!
//! A pair of connected channels backed by `tokio::io::duplex`. Used
//! by the peer binary's loopback mode and by the end-to-end test
//! suite; behaviorally identical to the other transports from the
//! pipeline's point of view.

use async_trait::async_trait;
use tokio::io::DuplexStream;

use crate::error::LinkError;
use crate::transport::{ByteStream, ChannelDirection, TransportChannel, TransportKind};

/// One end of an in-process duplex pair.
pub struct MemoryChannel {
    direction: ChannelDirection,
    stream: Option<DuplexStream>,
}

/// Create a connected channel pair. `capacity` is the in-flight byte
/// buffer per direction.
pub fn loopback_pair(capacity: usize) -> (MemoryChannel, MemoryChannel) {
    let (a, b) = tokio::io::duplex(capacity);
    (
        MemoryChannel {
            direction: ChannelDirection::ToPeer,
            stream: Some(a),
        },
        MemoryChannel {
            direction: ChannelDirection::FromPeer,
            stream: Some(b),
        },
    )
}

impl MemoryChannel {
    /// Wrap an existing duplex end (test fixtures).
    pub fn from_stream(stream: DuplexStream, direction: ChannelDirection) -> Self {
        Self {
            direction,
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl TransportChannel for MemoryChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    fn direction(&self) -> ChannelDirection {
        self.direction
    }

    async fn connect_or_accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError> {
        match self.stream.take() {
            Some(s) => Ok(Box::new(s)),
            None => Err(LinkError::Protocol("loopback channel already established")),
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.stream = None;
        Ok(())
    }
}
