//! Send-side pipeline workers.
//!
//! Two cooperating loops per outbound direction, joined by a bounded
//! [`FrameQueue`]: the drain loop pulls encoded chunks from the
//! [`EncoderSource`], classifies them, and enqueues; the network loop
//! dequeues and writes framed packets to the channel. Splitting them
//! keeps a stalled link from ever blocking the encoder — the queue
//! absorbs the stall by shedding the oldest deltas.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace, warn};

use crate::bitstream::StreamInspector;
use crate::cache::ConfigCache;
use crate::device::EncoderSource;
use crate::error::LinkError;
use crate::pipeline::stats::{StreamCounters, ThroughputEstimator};
use crate::queue::FrameQueue;
use crate::unit::{UnitKind, VideoUnit};
use crate::wire::{ControlMessage, LinkCodec, WireFormat, WirePacket};

/// How long a worker sleeps in a poll before re-checking its running
/// flag. Also the dequeue timeout of the network loop, so shutdown
/// latency is bounded by one interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Idle gap after which the sender emits a heartbeat on formats that
/// carry one.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// ── Encoder drain loop ───────────────────────────────────────────

/// Pull units from `source` until it ends or `running` clears.
///
/// Every chunk is classified by NAL inspection; configuration units
/// prime the cache and enter the queue with the non-droppable path,
/// and each keyframe gets the cached configuration re-enqueued ahead
/// of it so a receiver that dropped the original can still initialize.
pub async fn encoder_drain(
    mut source: Box<dyn EncoderSource>,
    queue: Arc<FrameQueue>,
    cache: Arc<ConfigCache>,
    counters: Arc<StreamCounters>,
    running: Arc<AtomicBool>,
) {
    let mut inspector = StreamInspector::new();
    while running.load(Ordering::SeqCst) {
        // A source that is always ready would otherwise monopolize a
        // current-thread runtime.
        tokio::task::yield_now().await;
        let chunk = match timeout(POLL_INTERVAL, source.next_unit()).await {
            Err(_) => continue,
            Ok(Ok(Some(chunk))) => chunk,
            Ok(Ok(None)) => {
                debug!("encoder source ended");
                break;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "encoder source failed");
                break;
            }
        };

        let class = inspector.inspect(&chunk.data);
        let unit = VideoUnit::new(chunk.data, class.kind, class.codec, chunk.timestamp_us);
        trace!(kind = ?unit.kind, len = unit.len(), "drained unit");

        match unit.kind {
            UnitKind::Config => {
                cache.observe(&unit);
                queue.force_enqueue_config(unit);
            }
            UnitKind::Keyframe => {
                if let Some(config) = cache.snapshot() {
                    queue.force_enqueue_config(config);
                    counters.inc_reinjections();
                }
                queue.try_enqueue(unit);
            }
            UnitKind::Delta => queue.try_enqueue(unit),
        }
    }
}

// ── Network send loop ────────────────────────────────────────────

/// Drive one framed write to completion while honoring `running`.
///
/// A peer that stops reading leaves the write pending indefinitely.
/// Polling the same future under a timeout keeps the packet intact
/// across ticks and lets the loop notice a shutdown within one
/// interval. Returns `Ok(false)` when shutdown interrupted the write.
async fn send_bounded<W>(
    framed: &mut FramedWrite<W, LinkCodec>,
    packet: WirePacket,
    running: &AtomicBool,
) -> Result<bool, LinkError>
where
    W: AsyncWrite + Send + Unpin,
{
    let send = framed.send(packet);
    tokio::pin!(send);
    loop {
        match timeout(POLL_INTERVAL, &mut send).await {
            Ok(res) => {
                res?;
                return Ok(true);
            }
            Err(_) if running.load(Ordering::SeqCst) => continue,
            Err(_) => return Ok(false),
        }
    }
}

/// Drain the queue onto the wire until `running` clears.
///
/// Control messages arriving on `control_rx` are interleaved with
/// video; on formats without a control frame the codec drops them.
/// Write failures are fatal for the loop — the session surfaces them
/// as a disconnect.
pub async fn network_send<W>(
    writer: W,
    format: WireFormat,
    queue: Arc<FrameQueue>,
    mut control_rx: mpsc::Receiver<ControlMessage>,
    counters: Arc<StreamCounters>,
    running: Arc<AtomicBool>,
) -> Result<(), LinkError>
where
    W: AsyncWrite + Send + Unpin,
{
    let mut framed = FramedWrite::new(writer, LinkCodec::new(format));
    let mut throughput = ThroughputEstimator::new();
    let mut last_activity = Instant::now();

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            biased;

            Some(msg) = control_rx.recv() => {
                if !send_bounded(&mut framed, WirePacket::Control(msg.to_json()?), &running).await? {
                    break;
                }
                last_activity = Instant::now();
            }
            unit = queue.dequeue(POLL_INTERVAL) => {
                match unit {
                    Some(unit) => {
                        let bytes = unit.len() as u64;
                        let packet = WirePacket::Video {
                            timestamp_us: unit.timestamp_us,
                            keyframe: unit.kind.is_keyframe(),
                            payload: unit.payload,
                        };
                        if !send_bounded(&mut framed, packet, &running).await? {
                            break;
                        }
                        counters.inc_sent();
                        throughput.record(bytes);
                        last_activity = Instant::now();
                    }
                    None => {
                        if last_activity.elapsed() >= HEARTBEAT_INTERVAL {
                            trace!("link idle, sending heartbeat");
                            if !send_bounded(&mut framed, WirePacket::Heartbeat, &running).await? {
                                break;
                            }
                            last_activity = Instant::now();
                        }
                    }
                }
            }
        }
    }

    match timeout(POLL_INTERVAL, framed.flush()).await {
        Ok(res) => res?,
        Err(_) => debug!("final flush timed out on a stalled link"),
    }
    debug!(
        fps = throughput.estimate_fps(),
        bps = throughput.estimate_bps(),
        "send loop stopped"
    );
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
