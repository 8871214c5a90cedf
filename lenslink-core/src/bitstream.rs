//! Bitstream classification without a container format.
//!
//! Hardware codecs hand out raw Annex-B access units; the wire
//! protocol needs to know whether a unit is a parameter set, a
//! keyframe, or a delta frame before queueing it, and which codec
//! family produced it. [`classify`] answers both from the first NAL
//! header it finds. Pure functions, no I/O.
//!
//! ## NAL header rules
//!
//! After a `00 00 01` / `00 00 00 01` start code, with `b` the next byte:
//!
//! | Family | Type extraction    | Config        | Keyframe   |
//! |--------|--------------------|---------------|------------|
//! | AVC    | `b & 0x1F`         | 7, 8          | 5          |
//! | HEVC   | `(b >> 1) & 0x3F`  | 32, 33, 34    | 16..=21    |
//!
//! Family inference is a heuristic (HEVC rule first — a computed HEVC
//! type in `0..=40` is tentatively HEVC, anything above is AVC). It is
//! applied only until the first Config unit is observed; after that
//! [`StreamInspector`] treats the Config's family as authoritative.

use crate::unit::{CodecFamily, UnitKind};

/// How far into a unit we look for the first start code.
const SCAN_LIMIT: usize = 100;

/// Upper bound of the "plausible HEVC NAL type" heuristic range.
const HEVC_PLAUSIBLE_MAX: u8 = 40;

// ── Classification ───────────────────────────────────────────────

/// Result of classifying one bitstream unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: UnitKind,
    pub codec: CodecFamily,
}

impl Classification {
    /// The fallback when no start code (or no byte after it) exists.
    pub const OPAQUE: Self = Self {
        kind: UnitKind::Delta,
        codec: CodecFamily::Unknown,
    };
}

// ── Free functions ───────────────────────────────────────────────

/// Classify a raw bitstream unit, inferring the codec family.
///
/// Scans the first [`SCAN_LIMIT`] bytes for an Annex-B start code.
/// Returns [`Classification::OPAQUE`] when none is found.
pub fn classify(bytes: &[u8]) -> Classification {
    let Some(nal) = first_nal_byte(bytes) else {
        return Classification::OPAQUE;
    };

    let codec = infer_family(nal);
    Classification {
        kind: classify_nal(nal, codec),
        codec,
    }
}

/// Classify under a known codec family, bypassing the heuristic.
pub fn classify_as(bytes: &[u8], codec: CodecFamily) -> Classification {
    if codec == CodecFamily::Unknown {
        return classify(bytes);
    }
    let Some(nal) = first_nal_byte(bytes) else {
        return Classification {
            kind: UnitKind::Delta,
            codec,
        };
    };
    Classification {
        kind: classify_nal(nal, codec),
        codec,
    }
}

/// True when the unit carries a parameter-set NAL anywhere in its
/// body, not just at the front. Used to detect keyframes with inline
/// configuration, which can initialize a decoder on their own.
pub fn contains_config(bytes: &[u8], codec: CodecFamily) -> bool {
    let mut pos = 0;
    while let Some(idx) = find_start_code(&bytes[pos..], bytes.len() - pos) {
        let nal_at = pos + idx;
        if nal_at >= bytes.len() {
            break;
        }
        let nal = bytes[nal_at];
        let family = if codec == CodecFamily::Unknown {
            infer_family(nal)
        } else {
            codec
        };
        if classify_nal(nal, family) == UnitKind::Config {
            return true;
        }
        pos = nal_at + 1;
    }
    false
}

// ── StreamInspector ──────────────────────────────────────────────

/// Per-stream classifier that locks the codec family on the first
/// Config unit it sees.
///
/// The family heuristic can misread an AVC non-IDR slice as a low
/// HEVC type under some byte patterns; a stream's first parameter set
/// is authoritative, so once one is observed the heuristic is bypassed
/// and [`classify_as`] is used with the locked family.
#[derive(Debug, Default)]
pub struct StreamInspector {
    family: CodecFamily,
}

impl StreamInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The locked family, or `Unknown` before the first Config unit.
    pub fn family(&self) -> CodecFamily {
        self.family
    }

    /// Classify one unit, updating the locked family when a Config
    /// unit is observed.
    pub fn inspect(&mut self, bytes: &[u8]) -> Classification {
        let result = if self.family == CodecFamily::Unknown {
            classify(bytes)
        } else {
            classify_as(bytes, self.family)
        };
        if result.kind == UnitKind::Config && self.family == CodecFamily::Unknown {
            self.family = result.codec;
        }
        result
    }

    /// Forget the locked family (stream stop / restart).
    pub fn reset(&mut self) {
        self.family = CodecFamily::Unknown;
    }
}

// ── Internal ─────────────────────────────────────────────────────

/// Index of the byte following the first `00 00 01` within `limit`
/// bytes, or `None`. A 4-byte `00 00 00 01` start code matches via
/// its trailing three bytes.
fn find_start_code(bytes: &[u8], limit: usize) -> Option<usize> {
    let end = bytes.len().min(limit);
    if end < 4 {
        return None;
    }
    for i in 0..end - 3 {
        if bytes[i] == 0 && bytes[i + 1] == 0 && bytes[i + 2] == 1 {
            return Some(i + 3);
        }
    }
    None
}

/// The NAL header byte of the first start-coded NAL, if present.
fn first_nal_byte(bytes: &[u8]) -> Option<u8> {
    find_start_code(bytes, SCAN_LIMIT).map(|idx| bytes[idx])
}

/// Heuristic family inference from a single NAL header byte.
fn infer_family(nal: u8) -> CodecFamily {
    let hevc_type = (nal >> 1) & 0x3F;
    if hevc_type <= HEVC_PLAUSIBLE_MAX {
        CodecFamily::Hevc
    } else {
        CodecFamily::Avc
    }
}

/// Classify a NAL header byte under a known family.
fn classify_nal(nal: u8, codec: CodecFamily) -> UnitKind {
    match codec {
        CodecFamily::Avc => match nal & 0x1F {
            7 | 8 => UnitKind::Config,
            5 => UnitKind::Keyframe,
            _ => UnitKind::Delta,
        },
        CodecFamily::Hevc => match (nal >> 1) & 0x3F {
            32 | 33 | 34 => UnitKind::Config,
            16..=21 => UnitKind::Keyframe,
            _ => UnitKind::Delta,
        },
        CodecFamily::Unknown => UnitKind::Delta,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avc_sps_is_config() {
        let unit = [0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F];
        let c = classify(&unit);
        assert_eq!(c.kind, UnitKind::Config);
        assert_eq!(c.codec, CodecFamily::Avc);
    }

    #[test]
    fn avc_idr_is_keyframe() {
        let unit = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];
        let c = classify(&unit);
        assert_eq!(c.kind, UnitKind::Keyframe);
        assert_eq!(c.codec, CodecFamily::Avc);
    }

    #[test]
    fn avc_non_idr_is_delta() {
        let unit = [0x00, 0x00, 0x00, 0x01, 0x61, 0xE0, 0x00, 0x00];
        let c = classify(&unit);
        assert_eq!(c.kind, UnitKind::Delta);
        assert_eq!(c.codec, CodecFamily::Avc);
    }

    #[test]
    fn hevc_sps_is_config() {
        // 0x42 >> 1 & 0x3F == 33 (SPS_NUT)
        let unit = [0x00, 0x00, 0x01, 0x42, 0x01, 0x01];
        let c = classify(&unit);
        assert_eq!(c.kind, UnitKind::Config);
        assert_eq!(c.codec, CodecFamily::Hevc);
    }

    #[test]
    fn hevc_irap_is_keyframe() {
        // 0x26 >> 1 & 0x3F == 19 (IDR_W_RADL)
        let unit = [0x00, 0x00, 0x00, 0x01, 0x26, 0x01];
        let c = classify(&unit);
        assert_eq!(c.kind, UnitKind::Keyframe);
        assert_eq!(c.codec, CodecFamily::Hevc);
    }

    #[test]
    fn no_start_code_is_opaque_delta() {
        let unit = [0xFF; 64];
        assert_eq!(classify(&unit), Classification::OPAQUE);
    }

    #[test]
    fn start_code_only_in_first_100_bytes() {
        let mut unit = vec![0xFF; 150];
        unit[120] = 0x00;
        unit[121] = 0x00;
        unit[122] = 0x01;
        unit[123] = 0x67;
        assert_eq!(classify(&unit), Classification::OPAQUE);
    }

    #[test]
    fn truncated_after_start_code() {
        // Start code present but no NAL byte after it.
        let unit = [0x00, 0x00, 0x01];
        assert_eq!(classify(&unit), Classification::OPAQUE);
    }

    #[test]
    fn classify_as_bypasses_heuristic() {
        // 0x01: the heuristic reads HEVC type 0 and would call this
        // HEVC TRAIL_N; under a locked AVC family it is a Delta slice.
        let unit = [0x00, 0x00, 0x00, 0x01, 0x01];
        let h = classify(&unit);
        assert_eq!(h.codec, CodecFamily::Hevc);

        let a = classify_as(&unit, CodecFamily::Avc);
        assert_eq!(a.codec, CodecFamily::Avc);
        assert_eq!(a.kind, UnitKind::Delta);
    }

    #[test]
    fn inspector_locks_family_on_first_config() {
        let mut insp = StreamInspector::new();
        assert_eq!(insp.family(), CodecFamily::Unknown);

        let sps = [0x00, 0x00, 0x00, 0x01, 0x67, 0x64];
        assert_eq!(insp.inspect(&sps).kind, UnitKind::Config);
        assert_eq!(insp.family(), CodecFamily::Avc);

        // An ambiguous byte that the raw heuristic would call HEVC is
        // now classified under the locked AVC family.
        let slice = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A];
        let c = insp.inspect(&slice);
        assert_eq!(c.codec, CodecFamily::Avc);
        assert_eq!(c.kind, UnitKind::Delta);

        insp.reset();
        assert_eq!(insp.family(), CodecFamily::Unknown);
    }

    #[test]
    fn contains_config_finds_inline_sps() {
        // Keyframe with SPS + PPS prepended by the encoder.
        let unit = [
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, // IDR first
            0x00, 0x00, 0x00, 0x01, 0x67, 0x64, // SPS inline
        ];
        assert!(contains_config(&unit, CodecFamily::Avc));

        let bare = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88];
        assert!(!contains_config(&bare, CodecFamily::Avc));
    }
}
