//! Synthetic codec devices.
//!
//! The encoder emits a deterministic Annex-B H.264 pattern — an SPS
//! up front, then a keyframe at every interval boundary and deltas in
//! between — paced at the configured frame rate. The decoder just
//! counts. Together they let a peer run the full pipeline with no
//! codec hardware attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info};

use lenslink_core::device::{DecoderDevice, EncodedChunk, EncoderSource};
use lenslink_core::error::LinkError;
use lenslink_core::surface::SurfaceHandle;
use lenslink_core::unit::VideoUnit;

use crate::config::StreamConfig;

// NAL unit headers of the generated pattern.
const NAL_SPS: u8 = 0x67;
const NAL_IDR: u8 = 0x65;
const NAL_NON_IDR: u8 = 0x41;

// ── SyntheticEncoder ─────────────────────────────────────────────

/// Paced generator of a classifiable H.264 elementary stream.
///
/// Pacing uses an absolute deadline kept in `self`, so a cancelled
/// and retried `next_unit` resumes the same schedule instead of
/// restarting its sleep.
pub struct SyntheticEncoder {
    fps: u32,
    keyframe_interval: u32,
    unit_bytes: usize,
    frame_index: u64,
    next_deadline: Option<tokio::time::Instant>,
}

impl SyntheticEncoder {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            fps: u32::from(config.fps.max(1)),
            keyframe_interval: config.keyframe_interval.max(1),
            unit_bytes: config.unit_bytes.max(16),
            frame_index: 0,
            next_deadline: None,
        }
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.fps))
    }

    fn timestamp_us(&self) -> i64 {
        (self.frame_index as i64) * (1_000_000 / i64::from(self.fps))
    }

    /// Annex-B unit: start code, NAL header, deterministic filler.
    fn build_unit(&self, nal: u8, len: usize) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + 1 + len);
        buf.put_slice(&[0, 0, 0, 1]);
        buf.put_u8(nal);
        for i in 0..len {
            buf.put_u8((self.frame_index as usize + i) as u8);
        }
        buf.freeze()
    }
}

#[async_trait]
impl EncoderSource for SyntheticEncoder {
    async fn next_unit(&mut self) -> Result<Option<EncodedChunk>, LinkError> {
        // First access unit is the parameter set, unpaced.
        if self.frame_index == 0 {
            self.frame_index = 1;
            debug!("emitting parameter set");
            return Ok(Some(EncodedChunk {
                timestamp_us: 0,
                data: self.build_unit(NAL_SPS, 32),
            }));
        }

        let frame_duration = self.frame_duration();
        let deadline = *self
            .next_deadline
            .get_or_insert_with(|| tokio::time::Instant::now() + frame_duration);
        tokio::time::sleep_until(deadline).await;
        self.next_deadline = Some(deadline + frame_duration);

        // Frame 1, interval+1, 2*interval+1, … are keyframes.
        let picture_index = self.frame_index - 1;
        let nal = if picture_index % u64::from(self.keyframe_interval) == 0 {
            NAL_IDR
        } else {
            NAL_NON_IDR
        };
        let chunk = EncodedChunk {
            timestamp_us: self.timestamp_us(),
            data: self.build_unit(nal, self.unit_bytes),
        };
        self.frame_index += 1;
        Ok(Some(chunk))
    }
}

// ── CountingDecoder ──────────────────────────────────────────────

/// Decoder that counts what it is fed and logs lifecycle changes.
pub struct CountingDecoder {
    decoded: Arc<AtomicU64>,
    configured: bool,
}

impl CountingDecoder {
    pub fn new() -> Self {
        Self {
            decoded: Arc::new(AtomicU64::new(0)),
            configured: false,
        }
    }

    /// Shared decode counter, for reporting after the device moved
    /// into the session.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.decoded.clone()
    }
}

impl Default for CountingDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderDevice for CountingDecoder {
    fn configure(&mut self, config: &[u8], surface: &SurfaceHandle) -> Result<(), LinkError> {
        info!(
            config_len = config.len(),
            surface_version = surface.version,
            "decoder configured"
        );
        self.configured = true;
        Ok(())
    }

    fn decode(&mut self, unit: &VideoUnit) -> Result<(), LinkError> {
        if !self.configured {
            return Err(LinkError::Decode("decode before configure".into()));
        }
        let n = self.decoded.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 300 == 0 {
            info!(frames = n, ts_us = unit.timestamp_us, "decoding");
        }
        Ok(())
    }

    fn release(&mut self) {
        info!("decoder released");
        self.configured = false;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use lenslink_core::bitstream::classify;
    use lenslink_core::unit::{CodecFamily, UnitKind};

    fn config() -> StreamConfig {
        StreamConfig {
            fps: 240, // keep the paced test fast
            keyframe_interval: 3,
            unit_bytes: 64,
        }
    }

    #[tokio::test]
    async fn emits_classifiable_cadence() {
        let mut enc = SyntheticEncoder::new(&config());
        let mut kinds = Vec::new();
        for _ in 0..8 {
            let chunk = enc.next_unit().await.unwrap().unwrap();
            let class = classify(&chunk.data);
            assert_eq!(class.codec, CodecFamily::Avc);
            kinds.push(class.kind);
        }
        assert_eq!(
            kinds,
            vec![
                UnitKind::Config,
                UnitKind::Keyframe,
                UnitKind::Delta,
                UnitKind::Delta,
                UnitKind::Keyframe,
                UnitKind::Delta,
                UnitKind::Delta,
                UnitKind::Keyframe,
            ]
        );
    }

    #[tokio::test]
    async fn timestamps_advance_monotonically() {
        let mut enc = SyntheticEncoder::new(&config());
        let mut last = -1;
        for _ in 0..5 {
            let chunk = enc.next_unit().await.unwrap().unwrap();
            assert!(chunk.timestamp_us > last || chunk.timestamp_us == 0);
            last = chunk.timestamp_us;
        }
    }

    #[test]
    fn counting_decoder_requires_configure() {
        let mut dec = CountingDecoder::new();
        let unit = VideoUnit::new(
            Bytes::from_static(&[0, 0, 0, 1, NAL_NON_IDR, 1]),
            UnitKind::Delta,
            CodecFamily::Avc,
            0,
        );
        assert!(dec.decode(&unit).is_err());

        let surface = SurfaceHandle {
            id: lenslink_core::surface::SurfaceId(1),
            version: 1,
        };
        dec.configure(&[0x67], &surface).unwrap();
        dec.decode(&unit).unwrap();
        assert_eq!(dec.counter().load(Ordering::Relaxed), 1);
    }
}
