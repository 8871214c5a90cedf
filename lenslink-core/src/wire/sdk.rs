//! SDK-header framing: 13-byte metadata header + payload, one blob.
//!
//! The vendor session channel does not separate metadata from
//! payload, so each unit travels as a single opaque blob:
//!
//! ```text
//! size:          u32  (4)   payload length
//! timestamp_us:  i64  (8)
//! is_keyframe:   u8   (1)
//! payload:       [u8] (size bytes)
//! ```
//!
//! [`encode_blob`] builds one such blob for the vendor send
//! primitive; [`SdkCodec`] reassembles blobs arriving as an ordered
//! byte stream, tolerating arbitrary chunk boundaries.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::wire::{MAX_UNIT_LEN, WirePacket};

/// Fixed header size preceding each payload.
pub const SDK_HEADER_SIZE: usize = 13;

/// Build the single opaque blob for one video unit.
pub fn encode_blob(timestamp_us: i64, keyframe: bool, payload: &Bytes) -> Result<Bytes, LinkError> {
    if payload.is_empty() || payload.len() > MAX_UNIT_LEN {
        return Err(LinkError::Framing {
            reason: "unit length out of range",
            declared: payload.len() as u64,
        });
    }
    let mut blob = BytesMut::with_capacity(SDK_HEADER_SIZE + payload.len());
    blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    blob.extend_from_slice(&timestamp_us.to_le_bytes());
    blob.extend_from_slice(&[keyframe as u8]);
    blob.extend_from_slice(payload);
    Ok(blob.freeze())
}

/// Codec for the SDK-header format.
#[derive(Debug, Default)]
pub struct SdkCodec;

impl Decoder for SdkCodec {
    type Item = WirePacket;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WirePacket>, LinkError> {
        if src.len() < SDK_HEADER_SIZE {
            return Ok(None);
        }

        let size = u32::from_le_bytes(src[0..4].try_into().unwrap()) as usize;

        if size == 0 {
            src.advance(SDK_HEADER_SIZE);
            return Err(LinkError::Framing {
                reason: "zero length",
                declared: 0,
            });
        }
        if size > MAX_UNIT_LEN {
            src.advance(SDK_HEADER_SIZE);
            return Err(LinkError::Framing {
                reason: "length exceeds maximum",
                declared: size as u64,
            });
        }

        if src.len() < SDK_HEADER_SIZE + size {
            src.reserve(SDK_HEADER_SIZE + size - src.len());
            return Ok(None);
        }

        let timestamp_us = i64::from_le_bytes(src[4..12].try_into().unwrap());
        let keyframe = src[12] != 0;
        src.advance(SDK_HEADER_SIZE);
        let payload = src.split_to(size).freeze();

        Ok(Some(WirePacket::Video {
            timestamp_us,
            keyframe,
            payload,
        }))
    }
}

impl Encoder<WirePacket> for SdkCodec {
    type Error = LinkError;

    fn encode(&mut self, item: WirePacket, dst: &mut BytesMut) -> Result<(), LinkError> {
        let WirePacket::Video {
            timestamp_us,
            keyframe,
            payload,
        } = item
        else {
            // The vendor channel carries video only.
            return Ok(());
        };
        let blob = encode_blob(timestamp_us, keyframe, &payload)?;
        dst.extend_from_slice(&blob);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_layout() {
        let payload = Bytes::from_static(b"unit");
        let blob = encode_blob(-1, true, &payload).unwrap();
        assert_eq!(blob.len(), SDK_HEADER_SIZE + 4);
        assert_eq!(&blob[0..4], &4u32.to_le_bytes());
        assert_eq!(&blob[4..12], &(-1i64).to_le_bytes());
        assert_eq!(blob[12], 1);
        assert_eq!(&blob[13..], b"unit");
    }

    #[test]
    fn decode_reassembles_split_blobs() {
        let payload = Bytes::from_static(b"0123456789abcdef");
        let blob = encode_blob(55, false, &payload).unwrap();

        let mut codec = SdkCodec;
        let mut buf = BytesMut::new();

        // First half of the blob: incomplete.
        buf.extend_from_slice(&blob[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&blob[10..]);
        let out = codec.decode(&mut buf).unwrap().unwrap();
        match out {
            WirePacket::Video {
                timestamp_us,
                keyframe,
                payload,
            } => {
                assert_eq!(timestamp_us, 55);
                assert!(!keyframe);
                assert_eq!(&payload[..], b"0123456789abcdef");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn two_blobs_back_to_back() {
        let a = encode_blob(1, true, &Bytes::from_static(b"aa")).unwrap();
        let b = encode_blob(2, false, &Bytes::from_static(b"bbb")).unwrap();

        let mut codec = SdkCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a);
        buf.extend_from_slice(&b);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, WirePacket::Video { timestamp_us: 1, .. }));
        assert!(matches!(second, WirePacket::Video { timestamp_us: 2, .. }));
    }

    #[test]
    fn oversized_blob_rejected() {
        let mut codec = SdkCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&2_000_000u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 9]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Framing {
                declared: 2_000_000,
                ..
            }
        ));
        assert!(buf.capacity() < MAX_UNIT_LEN);
    }

    #[test]
    fn encode_blob_rejects_empty_and_oversized() {
        assert!(encode_blob(0, false, &Bytes::new()).is_err());
        let big = Bytes::from(vec![0u8; MAX_UNIT_LEN + 1]);
        assert!(encode_blob(0, false, &big).is_err());
    }
}
