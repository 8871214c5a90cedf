//! Bounded, priority-aware frame queue between pipeline stages.
//!
//! Real-time streaming prefers bounded staleness over completeness:
//! an overfull queue means the consumer (radio or decoder) cannot
//! keep up, and the correct response is to discard old, now-useless
//! frames rather than grow latency without bound. Hence drop-oldest
//! on overflow — with one exception: Config units are never dropped,
//! because without one the consumer's decoder can never initialize.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::debug;

use crate::unit::{UnitKind, VideoUnit};

// ── Capacity presets ─────────────────────────────────────────────

/// Lowest-latency camera-to-peer paths.
pub const CAP_LOW_LATENCY: usize = 2;
/// Balanced BLE paths.
pub const CAP_BLE: usize = 10;
/// WiFi / local / loopback paths.
pub const CAP_LOCAL: usize = 30;

// ── FrameQueue ───────────────────────────────────────────────────

/// One queued unit plus its enqueue timestamp.
#[derive(Debug)]
struct QueuedFrame {
    unit: VideoUnit,
    enqueued_at: Instant,
}

/// Bounded FIFO with drop-oldest overflow and a Config priority rule.
///
/// Thread-safe; designed for single-producer/single-consumer use per
/// direction but tolerates a consumer swap during decoder
/// reinitialization (any task may call [`dequeue`](Self::dequeue)).
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<VecDeque<QueuedFrame>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. On a full queue the oldest entry is
    /// evicted first (drop-oldest), incrementing the dropped counter.
    pub fn try_enqueue(&self, unit: VideoUnit) {
        let mut guard = self.inner.lock().expect("frame queue poisoned");
        if guard.len() >= self.capacity {
            if let Some(old) = guard.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    age_ms = old.enqueued_at.elapsed().as_millis() as u64,
                    kind = ?old.unit.kind,
                    "queue full, evicted oldest frame"
                );
            }
        }
        guard.push_back(QueuedFrame {
            unit,
            enqueued_at: Instant::now(),
        });
        drop(guard);
        self.notify.notify_one();
    }

    /// Enqueue a Config unit, evicting as many older entries as it
    /// takes. Config units are never themselves dropped.
    pub fn force_enqueue_config(&self, unit: VideoUnit) {
        debug_assert_eq!(unit.kind, UnitKind::Config);
        let mut guard = self.inner.lock().expect("frame queue poisoned");
        while guard.len() >= self.capacity {
            if guard.pop_front().is_some() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        guard.push_back(QueuedFrame {
            unit,
            enqueued_at: Instant::now(),
        });
        drop(guard);
        self.notify.notify_one();
    }

    /// Wait up to `timeout` for a frame. Returns `None` on empty
    /// timeout, which is also the cancellation check interval for
    /// consumer loops.
    pub async fn dequeue(&self, timeout: Duration) -> Option<VideoUnit> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self
                .inner
                .lock()
                .expect("frame queue poisoned")
                .pop_front()
            {
                return Some(frame.unit);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // A permit stored by notify_one between the lock release
            // and this await wakes us immediately.
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue poisoned").len()
    }

    /// True when no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames evicted since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard all queued frames (stream stop).
    pub fn clear(&self) {
        self.inner.lock().expect("frame queue poisoned").clear();
    }
}

// ── Tests ────────────────────────────────────────────────────────
