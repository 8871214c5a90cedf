//! Display surface handle with version tracking.
//!
//! The display subsystem and the network/decoding workers run on
//! independent clocks: a surface can appear, resize, or vanish at any
//! moment, entirely unrelated to network events. A monotonically
//! increasing version number is the single source of truth that lets
//! the decoding side detect staleness — a decoder instance is valid
//! for exactly one surface version, and any mismatch invalidates it.

use std::sync::Mutex;

// ── SurfaceHandle ────────────────────────────────────────────────

/// Opaque identifier of an externally-owned display target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// A display target plus its version at publication time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle {
    /// Platform-mapped surface identity.
    pub id: SurfaceId,
    /// Monotonic version; bumped on every create/resize event.
    pub version: u64,
}

// ── SurfaceSlot ──────────────────────────────────────────────────

/// Shared publication point for the current surface.
///
/// The display thread publishes create/resize/destroy events; the
/// decode sink reads a snapshot at each feed. The critical section is
/// a single field swap, never held across I/O.
#[derive(Debug, Default)]
pub struct SurfaceSlot {
    inner: Mutex<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    current: Option<SurfaceHandle>,
    next_version: u64,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a surface create or resize. Assigns and returns the
    /// new version; every call invalidates any prior handle.
    pub fn publish(&self, id: SurfaceId) -> SurfaceHandle {
        let mut guard = self.inner.lock().expect("surface slot poisoned");
        guard.next_version += 1;
        let handle = SurfaceHandle {
            id,
            version: guard.next_version,
        };
        guard.current = Some(handle);
        handle
    }

    /// Publish a surface destroy.
    pub fn destroy(&self) {
        self.inner.lock().expect("surface slot poisoned").current = None;
    }

    /// Snapshot of the live surface, if any.
    pub fn snapshot(&self) -> Option<SurfaceHandle> {
        self.inner.lock().expect("surface slot poisoned").current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_monotonic() {
        let slot = SurfaceSlot::new();
        let a = slot.publish(SurfaceId(1));
        let b = slot.publish(SurfaceId(1)); // resize of the same target
        assert!(b.version > a.version);
        assert_eq!(slot.snapshot(), Some(b));
    }

    #[test]
    fn destroy_clears_snapshot() {
        let slot = SurfaceSlot::new();
        slot.publish(SurfaceId(7));
        slot.destroy();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn versions_survive_destroy() {
        // A recreated surface must not reuse an old version.
        let slot = SurfaceSlot::new();
        let a = slot.publish(SurfaceId(1));
        slot.destroy();
        let b = slot.publish(SurfaceId(1));
        assert!(b.version > a.version);
    }
}
