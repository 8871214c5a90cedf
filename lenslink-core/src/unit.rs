//! Shared bitstream unit types used across the pipeline stages.
//!
//! A [`VideoUnit`] is the smallest thing the engine moves: one
//! NAL-style access unit or parameter set produced by a hardware
//! encoder, already classified. It is immutable once constructed and
//! has exactly one owner at a time — producer, queue, or consumer.

use bytes::Bytes;

// ── UnitKind ─────────────────────────────────────────────────────

/// Classification of a bitstream unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A parameter-set unit (SPS/PPS for AVC, VPS/SPS/PPS for HEVC).
    /// Required before a decoder can be initialized; never dropped.
    Config,
    /// A self-contained IDR/IRAP access unit a decoder can start from.
    Keyframe,
    /// Any other access unit; depends on prior decoder state.
    Delta,
}

impl UnitKind {
    /// True for parameter-set units.
    pub fn is_config(self) -> bool {
        matches!(self, UnitKind::Config)
    }

    /// True for IDR/IRAP units.
    pub fn is_keyframe(self) -> bool {
        matches!(self, UnitKind::Keyframe)
    }
}

// ── CodecFamily ──────────────────────────────────────────────────

/// Video codec family inferred from the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecFamily {
    /// H.264 / AVC.
    Avc,
    /// H.265 / HEVC.
    Hevc,
    /// No start code found yet, or family not determined.
    #[default]
    Unknown,
}

impl std::fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Avc => write!(f, "AVC"),
            Self::Hevc => write!(f, "HEVC"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ── VideoUnit ────────────────────────────────────────────────────

/// One classified bitstream unit plus its capture timestamp.
#[derive(Debug, Clone)]
pub struct VideoUnit {
    /// The raw access-unit bytes (Annex-B, start codes included).
    pub payload: Bytes,
    /// Derived classification.
    pub kind: UnitKind,
    /// Derived codec family.
    pub codec: CodecFamily,
    /// Producer timestamp in microseconds.
    pub timestamp_us: i64,
}

impl VideoUnit {
    /// Construct a unit from already-classified parts.
    pub fn new(payload: Bytes, kind: UnitKind, codec: CodecFamily, timestamp_us: i64) -> Self {
        Self {
            payload,
            kind,
            codec,
            timestamp_us,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
