//! Simple framing: `[u32 length][payload]`.
//!
//! Used on the BLE connection-oriented data channels, where each
//! direction carries nothing but raw bitstream units. The format has
//! no frame-type byte, so [`WirePacket::Control`] and
//! [`WirePacket::Heartbeat`] cannot be carried — encoding them is a
//! no-op, and decoding always yields `Video` with empty metadata.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::wire::{MAX_UNIT_LEN, WirePacket};

const LEN_SIZE: usize = 4;

/// Codec for the simple length-prefixed format.
#[derive(Debug, Default)]
pub struct SimpleCodec;

impl Decoder for SimpleCodec {
    type Item = WirePacket;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WirePacket>, LinkError> {
        if src.len() < LEN_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes(src[0..LEN_SIZE].try_into().unwrap()) as usize;

        // Validate before reserving a single payload byte.
        if declared == 0 {
            src.advance(LEN_SIZE);
            return Err(LinkError::Framing {
                reason: "zero length",
                declared: 0,
            });
        }
        if declared > MAX_UNIT_LEN {
            src.advance(LEN_SIZE);
            return Err(LinkError::Framing {
                reason: "length exceeds maximum",
                declared: declared as u64,
            });
        }

        if src.len() < LEN_SIZE + declared {
            src.reserve(LEN_SIZE + declared - src.len());
            return Ok(None);
        }

        src.advance(LEN_SIZE);
        let payload = src.split_to(declared).freeze();
        Ok(Some(WirePacket::Video {
            timestamp_us: 0,
            keyframe: false,
            payload,
        }))
    }
}

impl Encoder<WirePacket> for SimpleCodec {
    type Error = LinkError;

    fn encode(&mut self, item: WirePacket, dst: &mut BytesMut) -> Result<(), LinkError> {
        let WirePacket::Video { payload, .. } = item else {
            // Control and heartbeat have no representation here.
            return Ok(());
        };
        if payload.is_empty() || payload.len() > MAX_UNIT_LEN {
            return Err(LinkError::Framing {
                reason: "unit length out of range",
                declared: payload.len() as u64,
            });
        }
        dst.reserve(LEN_SIZE + payload.len());
        dst.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
