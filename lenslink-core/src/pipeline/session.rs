//! Session orchestration.
//!
//! A [`StreamSession`] owns the worker tasks of an established link:
//! per outbound leg an encoder-drain and a network-send task, per
//! inbound leg a network-receive and a decoder-feed task. Legs share
//! one running flag, so a transport failure on either side winds the
//! whole session down. Phase changes are published on a watch channel
//! and control/disconnect notifications on an event channel; the
//! embedding application is expected to observe both.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cache::ConfigCache;
use crate::device::{DecoderDevice, EncoderSource};
use crate::error::LinkError;
use crate::negotiate::LinkPhase;
use crate::pipeline::stats::{CounterSnapshot, StreamCounters};
use crate::pipeline::{recv, send};
use crate::queue::{CAP_BLE, CAP_LOCAL, CAP_LOW_LATENCY, FrameQueue};
use crate::sink::DecodeSink;
use crate::surface::SurfaceSlot;
use crate::transport::{ChannelDirection, TransportChannel, TransportKind};
use crate::wire::{ControlMessage, WireFormat};

/// How long [`StreamSession::stop`] waits for a worker before
/// aborting it. Workers exit within one poll interval on their own;
/// the grace period only matters when one is wedged in a blocked
/// write.
const STOP_GRACE: Duration = Duration::from_millis(500);

// ── Configuration / events ───────────────────────────────────────

/// Queue sizing for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Outbound queue depth. Small: shedding stale frames beats
    /// buffering them on a live camera feed.
    pub send_queue_capacity: usize,
    /// Inbound queue depth before the decoder.
    pub recv_queue_capacity: usize,
}

impl SessionConfig {
    /// Sizing appropriate for the given transport.
    pub fn for_transport(kind: TransportKind) -> Self {
        let recv = match kind {
            TransportKind::Ble => CAP_BLE,
            TransportKind::Tcp | TransportKind::Vendor | TransportKind::Memory => CAP_LOCAL,
        };
        Self {
            send_queue_capacity: CAP_LOW_LATENCY,
            recv_queue_capacity: recv,
        }
    }
}

/// Notifications surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A control message arrived from the peer.
    ControlReceived(ControlMessage),
    /// A leg hit a transport error or EOF; the session is winding
    /// down.
    Disconnected {
        direction: ChannelDirection,
        reason: String,
    },
}

// ── Legs ─────────────────────────────────────────────────────────

/// Everything needed to run the sending direction.
pub struct OutboundLeg {
    pub channel: Box<dyn TransportChannel>,
    pub source: Box<dyn EncoderSource>,
}

/// Everything needed to run the receiving direction.
pub struct InboundLeg {
    pub channel: Box<dyn TransportChannel>,
    pub device: Box<dyn DecoderDevice>,
    pub surface: Arc<SurfaceSlot>,
}

// ── StreamSession ────────────────────────────────────────────────

/// Worker-task owner for one established link.
pub struct StreamSession {
    config: SessionConfig,
    running: Arc<AtomicBool>,
    started: bool,
    stopped: bool,
    phase_tx: Arc<watch::Sender<LinkPhase>>,
    phase_rx: watch::Receiver<LinkPhase>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Option<mpsc::Receiver<SessionEvent>>,
    control_tx: Option<mpsc::Sender<ControlMessage>>,
    out_counters: Arc<StreamCounters>,
    in_counters: Arc<StreamCounters>,
    send_queue: Arc<FrameQueue>,
    recv_queue: Arc<FrameQueue>,
    tasks: Vec<JoinHandle<()>>,
    channels: Vec<Box<dyn TransportChannel>>,
}

impl StreamSession {
    pub fn new(config: SessionConfig) -> Self {
        let (phase_tx, phase_rx) = watch::channel(LinkPhase::Idle);
        let (events_tx, events_rx) = mpsc::channel(32);
        Self {
            running: Arc::new(AtomicBool::new(false)),
            started: false,
            stopped: false,
            phase_tx: Arc::new(phase_tx),
            phase_rx,
            events_tx,
            events_rx: Some(events_rx),
            control_tx: None,
            out_counters: Arc::new(StreamCounters::new()),
            in_counters: Arc::new(StreamCounters::new()),
            send_queue: Arc::new(FrameQueue::new(config.send_queue_capacity)),
            recv_queue: Arc::new(FrameQueue::new(config.recv_queue_capacity)),
            tasks: Vec::new(),
            channels: Vec::new(),
            config,
        }
    }

    /// Watch the link phase.
    pub fn phase(&self) -> watch::Receiver<LinkPhase> {
        self.phase_rx.clone()
    }

    /// Take the event receiver. Yields `Some` exactly once.
    pub fn events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Sender for outgoing control messages. `None` before
    /// [`start`](Self::start) or on a receive-only session.
    pub fn control_sender(&self) -> Option<mpsc::Sender<ControlMessage>> {
        self.control_tx.clone()
    }

    /// Counters for the sending direction.
    pub fn outbound_stats(&self) -> CounterSnapshot {
        self.out_counters.snapshot()
    }

    /// Counters for the receiving direction.
    pub fn inbound_stats(&self) -> CounterSnapshot {
        self.in_counters.snapshot()
    }

    /// Establish the given legs and spawn their workers.
    ///
    /// Both channels are opened before any task starts, so a failure
    /// leaves nothing half-running and the phase back at [`LinkPhase::Idle`],
    /// and the session may be started again. At least one leg is
    /// required.
    pub async fn start(
        &mut self,
        outbound: Option<OutboundLeg>,
        inbound: Option<InboundLeg>,
    ) -> Result<(), LinkError> {
        if self.started {
            return Err(LinkError::Protocol("session already started"));
        }
        if outbound.is_none() && inbound.is_none() {
            return Err(LinkError::Protocol("session needs at least one leg"));
        }
        self.started = true;

        let mut phase = LinkPhase::Idle;
        phase.begin_search()?;
        phase.begin_connect()?;
        let _ = self.phase_tx.send(phase.clone());

        // Open every channel up front.
        let mut opened_out = None;
        if let Some(mut leg) = outbound {
            let stream = match leg.channel.connect_or_accept().await {
                Ok(s) => s,
                Err(e) => {
                    self.abandon_connect();
                    return Err(e);
                }
            };
            opened_out = Some((leg.channel, stream, leg.source));
        }
        let mut opened_in = None;
        if let Some(mut leg) = inbound {
            let stream = match leg.channel.connect_or_accept().await {
                Ok(s) => s,
                Err(e) => {
                    if let Some((mut ch, _, _)) = opened_out {
                        let _ = ch.close().await;
                    }
                    self.abandon_connect();
                    return Err(e);
                }
            };
            opened_in = Some((leg.channel, stream, leg.device, leg.surface));
        }

        phase.complete_connect()?;
        phase.begin_streaming()?;
        let _ = self.phase_tx.send(phase);
        self.running.store(true, Ordering::SeqCst);

        if let Some((channel, stream, source)) = opened_out {
            let format = WireFormat::for_transport(channel.kind());
            info!(kind = %channel.kind(), ?format, "outbound leg up");
            let (control_tx, control_rx) = mpsc::channel(32);
            self.control_tx = Some(control_tx);

            let cache = Arc::new(ConfigCache::new());
            self.tasks.push(tokio::spawn(send::encoder_drain(
                source,
                self.send_queue.clone(),
                cache,
                self.out_counters.clone(),
                self.running.clone(),
            )));

            let (_read, write) = tokio::io::split(stream);
            let queue = self.send_queue.clone();
            let counters = self.out_counters.clone();
            let running = self.running.clone();
            let events = self.events_tx.clone();
            let phase_tx = self.phase_tx.clone();
            let direction = channel.direction();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) =
                    send::network_send(write, format, queue, control_rx, counters, running.clone())
                        .await
                {
                    warn!(error = %e, "send leg failed");
                    running.store(false, Ordering::SeqCst);
                    phase_tx.send_modify(|p| p.force_idle());
                    let _ = events
                        .send(SessionEvent::Disconnected {
                            direction,
                            reason: e.to_string(),
                        })
                        .await;
                }
            }));
            self.channels.push(channel);
        }

        if let Some((channel, stream, device, surface)) = opened_in {
            let format = WireFormat::for_transport(channel.kind());
            info!(kind = %channel.kind(), ?format, "inbound leg up");
            let (control_fwd_tx, mut control_fwd_rx) = mpsc::channel(32);

            let (read, _write) = tokio::io::split(stream);
            let queue = self.recv_queue.clone();
            let counters = self.in_counters.clone();
            let running = self.running.clone();
            let events = self.events_tx.clone();
            let phase_tx = self.phase_tx.clone();
            let direction = channel.direction();
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = recv::network_receive(
                    read,
                    format,
                    queue,
                    control_fwd_tx,
                    counters,
                    running.clone(),
                )
                .await
                {
                    warn!(error = %e, "receive leg failed");
                    running.store(false, Ordering::SeqCst);
                    phase_tx.send_modify(|p| p.force_idle());
                    let _ = events
                        .send(SessionEvent::Disconnected {
                            direction,
                            reason: e.to_string(),
                        })
                        .await;
                }
            }));

            let events = self.events_tx.clone();
            self.tasks.push(tokio::spawn(async move {
                while let Some(msg) = control_fwd_rx.recv().await {
                    let _ = events.send(SessionEvent::ControlReceived(msg)).await;
                }
            }));

            let sink = DecodeSink::new(
                device,
                surface,
                Arc::new(ConfigCache::new()),
                self.in_counters.clone(),
            );
            self.tasks.push(tokio::spawn(recv::decoder_feed(
                sink,
                self.recv_queue.clone(),
                self.running.clone(),
            )));
            self.channels.push(channel);
        }

        Ok(())
    }

    /// Roll a failed connect back to Idle so the caller can retry.
    fn abandon_connect(&mut self) {
        self.started = false;
        self.phase_tx.send_modify(|p| p.force_idle());
    }

    /// Tear the session down. Idempotent; later calls are no-ops.
    ///
    /// Clears the running flag, joins every worker (each exits within
    /// one poll interval; one that does not is aborted after
    /// [`STOP_GRACE`]), closes the channels, and drops any queued
    /// frames.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("stopping session");

        self.running.store(false, Ordering::SeqCst);
        for mut task in self.tasks.drain(..) {
            if timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!("worker outlived the stop grace period, aborting");
                task.abort();
            }
        }
        for mut channel in self.channels.drain(..) {
            if let Err(e) = channel.close().await {
                warn!(error = %e, "channel close failed");
            }
        }
        self.send_queue.clear();
        self.recv_queue.clear();
        self.control_tx = None;
        self.phase_tx.send_modify(|p| p.force_idle());

        info!(
            out = ?self.out_counters.snapshot(),
            inbound = ?self.in_counters.snapshot(),
            "session stopped"
        );
    }

    /// Queue sizing this session was built with.
    pub fn config(&self) -> SessionConfig {
        self.config
    }
}

// ── Tests ────────────────────────────────────────────────────────
