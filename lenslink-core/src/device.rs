//! Seams for the opaque hardware Codec Device.
//!
//! The engine never touches the encoder or decoder hardware directly.
//! It drains an [`EncoderSource`] on one side and drives a
//! [`DecoderDevice`] on the other; real implementations wrap the
//! platform codec, tests use scripted fakes. Buffer acquisition
//! inside an implementation is expected to be a bounded wait (1–10 ms
//! on real hardware).

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::LinkError;
use crate::surface::SurfaceHandle;
use crate::unit::VideoUnit;

// ── EncoderSource ────────────────────────────────────────────────

/// One raw access unit drained from the encoder, before
/// classification.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Encoder timestamp in microseconds.
    pub timestamp_us: i64,
    /// Raw Annex-B bytes.
    pub data: Bytes,
}

/// The encoder-drain side of the Codec Device.
#[async_trait]
pub trait EncoderSource: Send {
    /// Next encoded access unit, or `None` when the encoder has
    /// ended the stream.
    ///
    /// Must be cancel-safe: the drain loop bounds each call with a
    /// timeout and retries, so a paced implementation has to keep its
    /// schedule in `self` (absolute deadlines, not fresh sleeps).
    async fn next_unit(&mut self) -> Result<Option<EncodedChunk>, LinkError>;
}

// ── DecoderDevice ────────────────────────────────────────────────

/// The decode-and-paint side of the Codec Device.
///
/// A configured instance is valid for exactly one surface version;
/// the lifecycle state machine in [`crate::sink`] enforces that
/// [`decode`](Self::decode) is never called against a stale one.
pub trait DecoderDevice: Send {
    /// Bind the device to `surface` using the given parameter set.
    /// Errors map to [`LinkError::CodecInit`].
    fn configure(&mut self, config: &[u8], surface: &SurfaceHandle) -> Result<(), LinkError>;

    /// Feed one unit to the configured device. Errors map to
    /// [`LinkError::Decode`] (typically the surface vanished
    /// underneath the codec).
    fn decode(&mut self, unit: &VideoUnit) -> Result<(), LinkError>;

    /// Release the device. Idempotent; called on every surface
    /// change, decode fault, and stream stop.
    fn release(&mut self);
}

impl DecoderDevice for Box<dyn DecoderDevice> {
    fn configure(&mut self, config: &[u8], surface: &SurfaceHandle) -> Result<(), LinkError> {
        (**self).configure(config, surface)
    }

    fn decode(&mut self, unit: &VideoUnit) -> Result<(), LinkError> {
        (**self).decode(unit)
    }

    fn release(&mut self) {
        (**self).release();
    }
}
