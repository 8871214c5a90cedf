//! Transport channel abstraction.
//!
//! Three very different backends — a BLE connection-oriented channel,
//! plain TCP sockets, and a vendor session SDK — unify behind one
//! connect/accept/byte-stream contract. Everything above this layer
//! (framing, queueing, lifecycle) depends only on [`TransportChannel`]
//! and [`ByteStream`]; variant specifics (ports vs. PSMs vs. session
//! handles) are configuration data, never branching in the pipeline.

pub mod ble;
pub mod memory;
pub mod tcp;
pub mod vendor;

pub use ble::{BleChannel, ChannelFactory};
pub use memory::{MemoryChannel, loopback_pair};
pub use tcp::{DiscoveryRecord, TcpChannel};
pub use vendor::{VendorChannel, VendorEvent, VendorSession};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::LinkError;

// ── ByteStream ───────────────────────────────────────────────────

/// The ordered, reliable byte stream every transport yields.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

// ── Metadata ─────────────────────────────────────────────────────

/// Which backend a channel runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Ble,
    Tcp,
    Vendor,
    /// In-process loopback for demos and tests.
    Memory,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ble => write!(f, "ble"),
            Self::Tcp => write!(f, "tcp"),
            Self::Vendor => write!(f, "vendor"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Which direction of the session a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelDirection {
    /// Local encoder → remote decoder.
    ToPeer,
    /// Remote encoder → local decoder.
    FromPeer,
}

// ── TransportChannel ─────────────────────────────────────────────

/// One directional data channel, before and after establishment.
///
/// `connect_or_accept` performs whichever role the channel was
/// configured for (dialing vs. listening, opening vs. accepting) and
/// yields the byte stream. It consumes the channel's one shot:
/// calling it twice is a protocol violation.
#[async_trait]
pub trait TransportChannel: Send {
    /// Backend this channel runs over.
    fn kind(&self) -> TransportKind;

    /// Session direction this channel carries.
    fn direction(&self) -> ChannelDirection;

    /// Establish (or accept) the connection and return its stream.
    async fn connect_or_accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError>;

    /// Tear down any backend resources still held.
    async fn close(&mut self) -> Result<(), LinkError>;
}
