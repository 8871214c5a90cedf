//! Vendor session SDK transport.
//!
//! The vendor runtime exposes an opaque send/receive blob primitive
//! and reports connection progress through asynchronous callbacks.
//! Both are modeled as seams: [`VendorSession`] for the data path and
//! an mpsc stream of [`VendorEvent`]s for the lifecycle, consumed by
//! [`VendorConnector`] so the state machine keeps single-threaded
//! reasoning. The data path is bridged onto an ordinary byte stream,
//! keeping the rest of the pipeline transport-blind.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use crate::error::LinkError;
use crate::negotiate::LinkPhase;
use crate::transport::{ByteStream, ChannelDirection, TransportChannel, TransportKind};

/// Chunk size the bridge reads from the engine side before handing a
/// blob to the vendor send primitive.
const BRIDGE_CHUNK: usize = 16 * 1024;

// ── VendorSession ────────────────────────────────────────────────

/// The vendor runtime's established data session.
///
/// Methods take `&self`; implementations wrap the vendor handle's own
/// synchronization. Blobs are delivered in order and unfragmented.
#[async_trait]
pub trait VendorSession: Send + Sync + 'static {
    /// Send one opaque blob.
    async fn send_blob(&self, blob: Bytes) -> Result<(), LinkError>;

    /// Receive the next blob; `None` when the session ended.
    async fn recv_blob(&self) -> Result<Option<Bytes>, LinkError>;

    /// Tear the session down.
    async fn close(&self) -> Result<(), LinkError>;
}

// ── VendorChannel ────────────────────────────────────────────────

/// Adapts a [`VendorSession`] into the byte-stream contract.
///
/// Two bridge tasks shuttle bytes: engine writes become vendor blobs
/// (chunk boundaries are irrelevant — the SDK-header codec
/// reassembles), vendor blobs become engine reads.
pub struct VendorChannel {
    direction: ChannelDirection,
    session: Option<Arc<dyn VendorSession>>,
}

impl VendorChannel {
    pub fn new(session: Arc<dyn VendorSession>, direction: ChannelDirection) -> Self {
        Self {
            direction,
            session: Some(session),
        }
    }
}

#[async_trait]
impl TransportChannel for VendorChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Vendor
    }

    fn direction(&self) -> ChannelDirection {
        self.direction
    }

    async fn connect_or_accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError> {
        let session = self
            .session
            .take()
            .ok_or(LinkError::Protocol("vendor channel already established"))?;

        let (engine_side, bridge_side) = tokio::io::duplex(4 * BRIDGE_CHUNK);
        let (mut bridge_read, mut bridge_write) = tokio::io::split(bridge_side);

        // Engine → vendor.
        let tx_session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut buf = vec![0u8; BRIDGE_CHUNK];
            loop {
                let n = match bridge_read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if let Err(e) = tx_session
                    .send_blob(Bytes::copy_from_slice(&buf[..n]))
                    .await
                {
                    warn!("vendor send failed: {e}");
                    break;
                }
            }
            debug!("vendor send bridge ended");
        });

        // Vendor → engine.
        tokio::spawn(async move {
            loop {
                match session.recv_blob().await {
                    Ok(Some(blob)) => {
                        if bridge_write.write_all(&blob).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("vendor recv failed: {e}");
                        break;
                    }
                }
            }
            debug!("vendor recv bridge ended");
        });

        Ok(Box::new(engine_side))
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}

// ── VendorConnector ──────────────────────────────────────────────

/// Connection-progress callbacks from the vendor runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorEvent {
    /// Scanning or advertising started (role-dependent, modeled
    /// identically on both sides).
    SearchStarted,
    /// A peer was found and the runtime is connecting.
    Connecting,
    /// The session is established.
    Connected,
    /// The attempt failed; human-readable reason.
    Failed(String),
    /// An established session dropped.
    Disconnected,
}

/// Drives [`LinkPhase`] from the vendor event stream.
///
/// Any failure returns the phase to Idle and is reported exactly once
/// to the caller; there is no automatic reconnect loop.
pub struct VendorConnector {
    phase: LinkPhase,
    events: mpsc::Receiver<VendorEvent>,
}

impl VendorConnector {
    pub fn new(events: mpsc::Receiver<VendorEvent>) -> Self {
        Self {
            phase: LinkPhase::Idle,
            events,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> &LinkPhase {
        &self.phase
    }

    /// Consume events until the session is established or fails.
    pub async fn wait_connected(&mut self, deadline: Duration) -> Result<(), LinkError> {
        let result = timeout(deadline, self.drive()).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.phase.force_idle();
                Err(e)
            }
            Err(_) => {
                self.phase.force_idle();
                Err(LinkError::Timeout(deadline))
            }
        }
    }

    async fn drive(&mut self) -> Result<(), LinkError> {
        loop {
            let event = self.events.recv().await.ok_or(LinkError::ChannelClosed)?;
            debug!(?event, phase = %self.phase, "vendor event");
            match event {
                VendorEvent::SearchStarted => self.phase.begin_search()?,
                VendorEvent::Connecting => self.phase.begin_connect()?,
                VendorEvent::Connected => {
                    self.phase.complete_connect()?;
                    return Ok(());
                }
                VendorEvent::Failed(reason) => {
                    return Err(LinkError::Other(format!("vendor connect failed: {reason}")));
                }
                VendorEvent::Disconnected => {
                    return Err(LinkError::Other("vendor session dropped".into()));
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
