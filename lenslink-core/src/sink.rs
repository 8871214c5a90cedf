//! Surface/decoder lifecycle state machine.
//!
//! Owns the invariant: *a Codec Device is active if and only if a
//! valid display surface exists and a configuration unit is known.*
//! The surface is owned by a display subsystem that creates, resizes,
//! and destroys it on its own clock; units arrive from the network on
//! another. The sink reconciles the two at every feed by snapshotting
//! the [`SurfaceSlot`] — the version counter is the single source of
//! truth for staleness, and no decode call is ever issued against a
//! stale version.
//!
//! ```text
//!  SurfaceAbsent ──surface──► SurfaceReady ──init ok──► DecoderActive(v)
//!       ▲                        ▲   │                        │
//!       │ destroyed              │   └──── init failed ───────┤
//!       └────────────────────────┴──── fault / version bump ──┘
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bitstream::contains_config;
use crate::cache::ConfigCache;
use crate::device::DecoderDevice;
use crate::pipeline::stats::StreamCounters;
use crate::surface::{SurfaceHandle, SurfaceSlot};
use crate::unit::{UnitKind, VideoUnit};

// ── SinkState ────────────────────────────────────────────────────

/// Lifecycle state of the decode side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No display surface exists. Config units are still cached so
    /// initialization is instant once a surface appears; everything
    /// else is dropped.
    SurfaceAbsent,
    /// A surface exists but the decoder is not (yet) initialized.
    SurfaceReady,
    /// The decoder is bound to exactly this surface version.
    DecoderActive { version: u64 },
}

// ── DecodeSink ───────────────────────────────────────────────────

/// Feeds received units into a [`DecoderDevice`], keeping its
/// lifecycle consistent with the surface.
pub struct DecodeSink<D: DecoderDevice> {
    device: D,
    state: SinkState,
    surface: Arc<SurfaceSlot>,
    cache: Arc<ConfigCache>,
    counters: Arc<StreamCounters>,
}

impl<D: DecoderDevice> DecodeSink<D> {
    pub fn new(
        device: D,
        surface: Arc<SurfaceSlot>,
        cache: Arc<ConfigCache>,
        counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            device,
            state: SinkState::SurfaceAbsent,
            surface,
            cache,
            counters,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Feed one received unit.
    ///
    /// Never fails: every fault is absorbed into a state transition
    /// and an observable counter.
    pub fn feed(&mut self, unit: &VideoUnit) {
        let snapshot = self.surface.snapshot();
        self.reconcile(snapshot);

        // Config units are cached in every state, including Absent.
        self.cache.observe(unit);

        match self.state {
            SinkState::SurfaceAbsent => {
                if unit.kind != UnitKind::Config {
                    self.counters.inc_dropped();
                }
            }
            SinkState::SurfaceReady => {
                if unit.kind == UnitKind::Config {
                    return; // cached above; stay
                }
                let handle = match snapshot {
                    Some(h) => h,
                    // Reconcile parks in Absent when the snapshot is
                    // empty, so this arm never sees None.
                    None => return,
                };
                match self.usable_config(unit) {
                    Some(config) => self.try_initialize(&config, handle, unit),
                    None => {
                        self.counters.inc_dropped();
                        debug!("no configuration known yet, dropping {:?}", unit.kind);
                    }
                }
            }
            SinkState::DecoderActive { version } => {
                if let Err(e) = self.device.decode(unit) {
                    warn!(version, "decode fault: {e}");
                    self.counters.inc_decode_faults();
                    self.device.release();
                    self.state = match self.surface.snapshot() {
                        Some(_) => SinkState::SurfaceReady,
                        None => SinkState::SurfaceAbsent,
                    };
                } else {
                    self.counters.inc_decoded();
                }
            }
        }
    }

    /// Release the device and clear cached configuration (stream
    /// stop). Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if matches!(self.state, SinkState::DecoderActive { .. }) {
            self.device.release();
        }
        self.state = match self.surface.snapshot() {
            Some(_) => SinkState::SurfaceReady,
            None => SinkState::SurfaceAbsent,
        };
        self.cache.clear();
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Align the state machine with the latest surface snapshot.
    ///
    /// A version bump releases any decoder bound to the old version
    /// before anything else happens; a vanished surface releases and
    /// parks in Absent.
    fn reconcile(&mut self, snapshot: Option<SurfaceHandle>) {
        match (self.state, snapshot) {
            (SinkState::DecoderActive { .. }, None) => {
                self.device.release();
                self.state = SinkState::SurfaceAbsent;
            }
            (SinkState::DecoderActive { version }, Some(h)) if version != h.version => {
                debug!(old = version, new = h.version, "surface changed, releasing decoder");
                self.device.release();
                self.state = SinkState::SurfaceReady;
            }
            (SinkState::SurfaceReady, None) => {
                self.state = SinkState::SurfaceAbsent;
            }
            (SinkState::SurfaceAbsent, Some(_)) => {
                self.state = SinkState::SurfaceReady;
            }
            _ => {}
        }
    }

    /// A configuration usable for initialization: the unit itself if
    /// it is a Config, the cached Config, or a keyframe carrying an
    /// inline parameter set.
    fn usable_config(&self, unit: &VideoUnit) -> Option<bytes::Bytes> {
        if unit.kind == UnitKind::Config {
            return Some(unit.payload.clone());
        }
        if let Some(cached) = self.cache.snapshot() {
            return Some(cached.payload);
        }
        if unit.kind == UnitKind::Keyframe && contains_config(&unit.payload, unit.codec) {
            return Some(unit.payload.clone());
        }
        None
    }

    fn try_initialize(&mut self, config: &bytes::Bytes, handle: SurfaceHandle, unit: &VideoUnit) {
        match self.device.configure(config, &handle) {
            Ok(()) => {
                debug!(version = handle.version, "decoder initialized");
                self.state = SinkState::DecoderActive {
                    version: handle.version,
                };
                // The triggering unit is decodable now; don't lose it.
                if let Err(e) = self.device.decode(unit) {
                    warn!("decode fault right after init: {e}");
                    self.counters.inc_decode_faults();
                    self.device.release();
                    self.state = SinkState::SurfaceReady;
                } else {
                    self.counters.inc_decoded();
                }
            }
            Err(e) => {
                warn!(version = handle.version, "decoder init failed: {e}");
                self.counters.inc_init_failures();
                self.counters.inc_dropped();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
