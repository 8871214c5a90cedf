//! TCP socket transport (the WiFi path).
//!
//! The advertiser listens on two fixed ports, one per direction; the
//! scanner resolves the discovery record (or dials known ports
//! directly) and connects plain byte-stream sockets. mDNS itself is
//! an OS primitive outside this crate; [`DiscoveryRecord`] is the
//! data it would carry.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::error::LinkError;
use crate::transport::{ByteStream, ChannelDirection, TransportChannel, TransportKind};

// ── DiscoveryRecord ──────────────────────────────────────────────

/// Well-known service name announced over mDNS.
pub const SERVICE_NAME: &str = "RokidStream";
/// mDNS service type.
pub const SERVICE_TYPE: &str = "_rokidstream._tcp.";

/// Default listen port for the advertiser→scanner direction.
pub const DEFAULT_PORT_TO_PEER: u16 = 40551;
/// Default listen port for the scanner→advertiser direction.
pub const DEFAULT_PORT_FROM_PEER: u16 = 40552;

/// The discovery record the advertiser registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub service_name: String,
    pub service_type: String,
    /// Port carrying advertiser → scanner video.
    pub port_to_peer: u16,
    /// Port carrying scanner → advertiser video.
    pub port_from_peer: u16,
}

impl Default for DiscoveryRecord {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.into(),
            service_type: SERVICE_TYPE.into(),
            port_to_peer: DEFAULT_PORT_TO_PEER,
            port_from_peer: DEFAULT_PORT_FROM_PEER,
        }
    }
}

// ── TcpChannel ───────────────────────────────────────────────────

enum TcpRole {
    /// Dial the peer at this address.
    Dial(SocketAddr),
    /// Bind locally and accept one inbound connection.
    Listen(SocketAddr),
}

/// One directional TCP data channel.
pub struct TcpChannel {
    role: TcpRole,
    direction: ChannelDirection,
    used: bool,
}

impl TcpChannel {
    /// A dialing channel (scanner side).
    pub fn dial(addr: SocketAddr, direction: ChannelDirection) -> Self {
        Self {
            role: TcpRole::Dial(addr),
            direction,
            used: false,
        }
    }

    /// A listening channel (advertiser side).
    pub fn listen(addr: SocketAddr, direction: ChannelDirection) -> Self {
        Self {
            role: TcpRole::Listen(addr),
            direction,
            used: false,
        }
    }
}

#[async_trait]
impl TransportChannel for TcpChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn direction(&self) -> ChannelDirection {
        self.direction
    }

    async fn connect_or_accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError> {
        if self.used {
            return Err(LinkError::Protocol("tcp channel already established"));
        }
        self.used = true;

        let stream = match &self.role {
            TcpRole::Dial(addr) => {
                let stream = TcpStream::connect(addr).await?;
                info!(%addr, direction = ?self.direction, "tcp channel connected");
                stream
            }
            TcpRole::Listen(addr) => {
                let listener = TcpListener::bind(addr).await?;
                let (stream, peer) = listener.accept().await?;
                info!(%peer, direction = ?self.direction, "tcp channel accepted");
                stream
            }
        };
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        // The stream (owned by the caller) carries the socket;
        // nothing else is held here.
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn listen_and_dial_exchange_bytes() {
        // Bind on an ephemeral port first so the dialer knows where.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut server = TcpChannel::listen(addr, ChannelDirection::FromPeer);
        let mut client = TcpChannel::dial(addr, ChannelDirection::ToPeer);

        let server_task = tokio::spawn(async move {
            let mut s = server.connect_or_accept().await.unwrap();
            let mut buf = [0u8; 5];
            s.read_exact(&mut buf).await.unwrap();
            buf
        });

        // Give the listener a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut c = client.connect_or_accept().await.unwrap();
        c.write_all(b"hello").await.unwrap();

        assert_eq!(&server_task.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn channel_is_one_shot() {
        let mut ch = TcpChannel::dial("127.0.0.1:1".parse().unwrap(), ChannelDirection::ToPeer);
        let _ = ch.connect_or_accept().await; // fails to connect, still consumes
        assert!(matches!(
            ch.connect_or_accept().await,
            Err(LinkError::Protocol(_))
        ));
    }

    #[test]
    fn default_record() {
        let rec = DiscoveryRecord::default();
        assert_eq!(rec.service_name, "RokidStream");
        assert!(rec.service_type.ends_with("._tcp."));
        assert_ne!(rec.port_to_peer, rec.port_from_peer);
    }
}
