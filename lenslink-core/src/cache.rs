//! Last-seen codec configuration, shared across workers.
//!
//! Decoders cannot initialize without a parameter set, and keyframes
//! are only useful when the consumer holds one. The cache keeps the
//! most recent Config unit per stream so the producer can re-inject
//! it ahead of every keyframe and the decode sink can (re)initialize
//! instantly when a surface appears.

use std::sync::Mutex;

use crate::unit::{UnitKind, VideoUnit};

/// Shared, atomically-swapped store for the last Config unit.
///
/// Readers take a cheap snapshot (`Bytes` clone); writers publish the
/// whole unit. The lock is never held across I/O.
#[derive(Debug, Default)]
pub struct ConfigCache {
    inner: Mutex<Option<VideoUnit>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a Config unit. Non-config units are ignored, so callers
    /// can offer every observed unit without pre-filtering.
    pub fn observe(&self, unit: &VideoUnit) {
        if unit.kind != UnitKind::Config {
            return;
        }
        let mut guard = self.inner.lock().expect("config cache poisoned");
        *guard = Some(unit.clone());
    }

    /// Snapshot of the cached Config unit, if any.
    pub fn snapshot(&self) -> Option<VideoUnit> {
        self.inner.lock().expect("config cache poisoned").clone()
    }

    /// Whether a configuration has been observed.
    pub fn is_primed(&self) -> bool {
        self.inner.lock().expect("config cache poisoned").is_some()
    }

    /// Forget the cached configuration (stream stop).
    pub fn clear(&self) {
        *self.inner.lock().expect("config cache poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::CodecFamily;
    use bytes::Bytes;

    fn unit(kind: UnitKind) -> VideoUnit {
        VideoUnit::new(Bytes::from_static(&[0, 0, 0, 1, 0x67]), kind, CodecFamily::Avc, 0)
    }

    #[test]
    fn observe_stores_only_config() {
        let cache = ConfigCache::new();
        assert!(!cache.is_primed());

        cache.observe(&unit(UnitKind::Keyframe));
        assert!(!cache.is_primed());

        cache.observe(&unit(UnitKind::Config));
        assert!(cache.is_primed());
        assert_eq!(cache.snapshot().unwrap().kind, UnitKind::Config);
    }

    #[test]
    fn clear_forgets() {
        let cache = ConfigCache::new();
        cache.observe(&unit(UnitKind::Config));
        cache.clear();
        assert!(cache.snapshot().is_none());
    }
}
