//! Per-direction stream statistics.
//!
//! Counters are plain atomics shared across the workers of one
//! direction; the throughput estimator keeps a rolling window of
//! `(timestamp, bytes)` samples for smoothed FPS and byte-rate
//! figures. Both feed the observability surface consumed by the
//! excluded UI layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ── StreamCounters ───────────────────────────────────────────────

/// Monotonic event counters for one stream direction.
///
/// Recoverable errors are never silently swallowed: every drop,
/// resync, init failure, and decode fault lands in exactly one of
/// these.
#[derive(Debug, Default)]
pub struct StreamCounters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
    config_reinjections: AtomicU64,
    resyncs: AtomicU64,
    heartbeats: AtomicU64,
    init_failures: AtomicU64,
    decode_faults: AtomicU64,
}

/// Plain-value copy of the counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub config_reinjections: u64,
    pub resyncs: u64,
    pub heartbeats: u64,
    pub init_failures: u64,
    pub decode_faults: u64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reinjections(&self) {
        self.config_reinjections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resyncs(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_heartbeats(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_init_failures(&self) {
        self.init_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decode_faults(&self) {
        self.decode_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            config_reinjections: self.config_reinjections.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            init_failures: self.init_failures.load(Ordering::Relaxed),
            decode_faults: self.decode_faults.load(Ordering::Relaxed),
        }
    }
}

// ── ThroughputEstimator ──────────────────────────────────────────

/// Rolling-window estimator for frame rate and byte throughput.
pub struct ThroughputEstimator {
    /// Samples: `(when, bytes)` — one per frame.
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl ThroughputEstimator {
    /// Estimator with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            total_bytes: 0,
        }
    }

    /// Record one frame of `bytes` at the current instant.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Estimated throughput in bytes/second over the window.
    pub fn estimate_bps(&self) -> u64 {
        let secs = match self.span() {
            Some(d) => d.as_secs_f64(),
            None => return 0,
        };
        (self.total_bytes as f64 / secs) as u64
    }

    /// Estimated frames/second over the window.
    pub fn estimate_fps(&self) -> f64 {
        let secs = match self.span() {
            Some(d) => d.as_secs_f64(),
            None => return 0.0,
        };
        self.samples.len() as f64 / secs
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn span(&self) -> Option<Duration> {
        match (self.samples.front(), self.samples.back()) {
            (Some((first, _)), Some((last, _))) => {
                let d = last.duration_since(*first);
                Some(if d.is_zero() {
                    Duration::from_millis(1)
                } else {
                    d
                })
            }
            _ => None,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
