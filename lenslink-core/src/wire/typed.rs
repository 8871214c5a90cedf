//! Typed framing: `[u32 totalLength][u8 frameType][payload]`.
//!
//! Used on the TCP socket and vendor-session paths. `totalLength`
//! counts the frame-type byte plus the payload. Three frame types:
//!
//! - `0x01` Video — payload is `[i64 timestampUs][u8 isKeyframe][unit]`
//! - `0x02` Control — payload is a UTF-8 string (typically JSON)
//! - `0x03` Heartbeat — empty payload, counted and ignored

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LinkError;
use crate::wire::{MAX_UNIT_LEN, WirePacket};

pub const FRAME_TYPE_VIDEO: u8 = 0x01;
pub const FRAME_TYPE_CONTROL: u8 = 0x02;
pub const FRAME_TYPE_HEARTBEAT: u8 = 0x03;

const LEN_SIZE: usize = 4;
/// Video metadata: i64 timestamp + keyframe byte.
const VIDEO_META: usize = 9;
/// Largest admissible `totalLength`: type byte + video metadata +
/// a maximum-size bitstream unit.
const MAX_TOTAL: usize = 1 + VIDEO_META + MAX_UNIT_LEN;

/// Codec for the typed format.
#[derive(Debug, Default)]
pub struct TypedCodec;

impl Decoder for TypedCodec {
    type Item = WirePacket;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WirePacket>, LinkError> {
        if src.len() < LEN_SIZE {
            return Ok(None);
        }

        let total = u32::from_le_bytes(src[0..LEN_SIZE].try_into().unwrap()) as usize;

        if total == 0 {
            src.advance(LEN_SIZE);
            return Err(LinkError::Framing {
                reason: "zero length",
                declared: 0,
            });
        }
        if total > MAX_TOTAL {
            src.advance(LEN_SIZE);
            return Err(LinkError::Framing {
                reason: "length exceeds maximum",
                declared: total as u64,
            });
        }

        if src.len() < LEN_SIZE + total {
            src.reserve(LEN_SIZE + total - src.len());
            return Ok(None);
        }

        src.advance(LEN_SIZE);
        let mut body = src.split_to(total);
        let frame_type = body.get_u8();

        match frame_type {
            FRAME_TYPE_VIDEO => {
                if body.len() < VIDEO_META {
                    return Err(LinkError::Framing {
                        reason: "video payload shorter than metadata",
                        declared: total as u64,
                    });
                }
                let timestamp_us = body.get_i64_le();
                let keyframe = body.get_u8() != 0;
                Ok(Some(WirePacket::Video {
                    timestamp_us,
                    keyframe,
                    payload: body.freeze(),
                }))
            }
            FRAME_TYPE_CONTROL => {
                let text = String::from_utf8(body.to_vec()).map_err(|_| LinkError::Framing {
                    reason: "control payload not utf-8",
                    declared: total as u64,
                })?;
                Ok(Some(WirePacket::Control(text)))
            }
            FRAME_TYPE_HEARTBEAT => Ok(Some(WirePacket::Heartbeat)),
            other => Err(LinkError::UnknownVariant {
                type_name: "FrameType",
                value: other as u64,
            }),
        }
    }
}

impl Encoder<WirePacket> for TypedCodec {
    type Error = LinkError;

    fn encode(&mut self, item: WirePacket, dst: &mut BytesMut) -> Result<(), LinkError> {
        match item {
            WirePacket::Video {
                timestamp_us,
                keyframe,
                payload,
            } => {
                if payload.is_empty() || payload.len() > MAX_UNIT_LEN {
                    return Err(LinkError::Framing {
                        reason: "unit length out of range",
                        declared: payload.len() as u64,
                    });
                }
                let total = 1 + VIDEO_META + payload.len();
                dst.reserve(LEN_SIZE + total);
                dst.extend_from_slice(&(total as u32).to_le_bytes());
                dst.extend_from_slice(&[FRAME_TYPE_VIDEO]);
                dst.extend_from_slice(&timestamp_us.to_le_bytes());
                dst.extend_from_slice(&[keyframe as u8]);
                dst.extend_from_slice(&payload);
            }
            WirePacket::Control(text) => {
                let total = 1 + text.len();
                if total > MAX_TOTAL {
                    return Err(LinkError::Framing {
                        reason: "control payload too large",
                        declared: total as u64,
                    });
                }
                dst.reserve(LEN_SIZE + total);
                dst.extend_from_slice(&(total as u32).to_le_bytes());
                dst.extend_from_slice(&[FRAME_TYPE_CONTROL]);
                dst.extend_from_slice(text.as_bytes());
            }
            WirePacket::Heartbeat => {
                dst.reserve(LEN_SIZE + 1);
                dst.extend_from_slice(&1u32.to_le_bytes());
                dst.extend_from_slice(&[FRAME_TYPE_HEARTBEAT]);
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn video_roundtrip() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(
                WirePacket::Video {
                    timestamp_us: 123_456,
                    keyframe: true,
                    payload: Bytes::from_static(b"\x00\x00\x00\x01\x65frame"),
                },
                &mut buf,
            )
            .unwrap();

        let out = codec.decode(&mut buf).unwrap().unwrap();
        match out {
            WirePacket::Video {
                timestamp_us,
                keyframe,
                payload,
            } => {
                assert_eq!(timestamp_us, 123_456);
                assert!(keyframe);
                assert_eq!(&payload[..], b"\x00\x00\x00\x01\x65frame");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn control_roundtrip() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(
                WirePacket::Control(r#"{"topic":"fov"}"#.into()),
                &mut buf,
            )
            .unwrap();

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(out, WirePacket::Control(r#"{"topic":"fov"}"#.into()));
    }

    #[test]
    fn heartbeat_roundtrip() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        codec.encode(WirePacket::Heartbeat, &mut buf).unwrap();
        assert_eq!(buf.len(), 5);

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(out, WirePacket::Heartbeat);
    }

    #[test]
    fn short_read_accumulates_across_split_delivery() {
        let mut codec = TypedCodec;
        let mut full = BytesMut::new();
        codec
            .encode(
                WirePacket::Video {
                    timestamp_us: 7,
                    keyframe: false,
                    payload: Bytes::from_static(b"0123456789"),
                },
                &mut full,
            )
            .unwrap();

        // Deliver one byte at a time; only the last byte completes it.
        let mut buf = BytesMut::new();
        let full = full.freeze();
        for (i, byte) in full.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let got = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(got.is_none(), "claimed complete at byte {i}");
            } else {
                assert!(matches!(got, Some(WirePacket::Video { .. })));
            }
        }
    }

    #[test]
    fn oversized_total_rejected() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(MAX_TOTAL as u32 + 1).to_le_bytes());

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(err.is_framing());
        assert!(buf.capacity() < MAX_UNIT_LEN);
    }

    #[test]
    fn unknown_frame_type_is_recoverable() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&[0x7F]);
        // A valid heartbeat follows the junk packet.
        codec.encode(WirePacket::Heartbeat, &mut buf).unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, LinkError::UnknownVariant { value: 0x7F, .. }));

        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(out, WirePacket::Heartbeat);
    }

    #[test]
    fn truncated_video_metadata_rejected() {
        let mut codec = TypedCodec;
        let mut buf = BytesMut::new();
        // total = 3: type byte + 2 bytes, less than the 9-byte metadata.
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&[FRAME_TYPE_VIDEO, 0xAA, 0xBB]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(err.is_framing());
        assert!(buf.is_empty());
    }
}
