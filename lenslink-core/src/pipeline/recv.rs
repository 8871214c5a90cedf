//! Receive-side pipeline workers.
//!
//! Mirrors the send side: the network loop reads framed packets off
//! the channel and enqueues video units; the decoder-feed loop
//! dequeues and pushes them through the [`DecodeSink`]. Framing
//! errors are recoverable — the codec has already resynchronized past
//! the bad header, so the loop logs, counts, and keeps reading.
//! Transport errors are not: the loop returns them and the session
//! reports a disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::bitstream::StreamInspector;
use crate::device::DecoderDevice;
use crate::error::LinkError;
use crate::pipeline::send::POLL_INTERVAL;
use crate::pipeline::stats::StreamCounters;
use crate::queue::FrameQueue;
use crate::sink::DecodeSink;
use crate::unit::VideoUnit;
use crate::wire::{ControlMessage, LinkCodec, WireFormat, WirePacket};

// ── Network receive loop ─────────────────────────────────────────

/// Read packets from the wire until EOF, a transport error, or
/// `running` clears.
///
/// Video units are reclassified locally (Simple-format frames carry
/// no metadata) and enqueued; control bodies are forwarded on
/// `control_tx`; heartbeats are counted and dropped.
pub async fn network_receive<R>(
    reader: R,
    format: WireFormat,
    queue: Arc<FrameQueue>,
    control_tx: mpsc::Sender<ControlMessage>,
    counters: Arc<StreamCounters>,
    running: Arc<AtomicBool>,
) -> Result<(), LinkError>
where
    R: AsyncRead + Send + Unpin,
{
    let mut framed = FramedRead::new(reader, LinkCodec::new(format));
    let mut inspector = StreamInspector::new();

    while running.load(Ordering::SeqCst) {
        let item = match timeout(POLL_INTERVAL, framed.next()).await {
            Err(_) => continue,
            Ok(None) => {
                debug!("peer closed the channel");
                return Err(LinkError::ChannelClosed);
            }
            Ok(Some(item)) => item,
        };

        match item {
            Ok(WirePacket::Video {
                timestamp_us,
                payload,
                ..
            }) => {
                let class = inspector.inspect(&payload);
                let unit = VideoUnit::new(payload, class.kind, class.codec, timestamp_us);
                trace!(kind = ?unit.kind, len = unit.len(), "received unit");
                counters.inc_received();
                if unit.kind.is_config() {
                    queue.force_enqueue_config(unit);
                } else {
                    queue.try_enqueue(unit);
                }
            }
            Ok(WirePacket::Control(text)) => match ControlMessage::from_json(&text) {
                Ok(msg) => {
                    debug!(topic = %msg.topic, "control message");
                    // Receiver gone means nobody listens; not fatal.
                    let _ = control_tx.send(msg).await;
                }
                Err(e) => warn!(error = %e, "malformed control body"),
            },
            Ok(WirePacket::Heartbeat) => {
                trace!("heartbeat");
                counters.inc_heartbeats();
            }
            Err(e) if e.is_framing() => {
                warn!(error = %e, "framing error, resynchronizing");
                counters.inc_resyncs();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ── Decoder feed loop ────────────────────────────────────────────

/// Dequeue received units into the sink until `running` clears, then
/// release the decoder.
pub async fn decoder_feed<D: DecoderDevice>(
    mut sink: DecodeSink<D>,
    queue: Arc<FrameQueue>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        if let Some(unit) = queue.dequeue(POLL_INTERVAL).await {
            sink.feed(&unit);
        }
    }
    sink.shutdown();
}

// ── Tests ────────────────────────────────────────────────────────
