//! Domain-specific error types for the LensLink protocol engine.
//!
//! All fallible operations return `Result<T, LinkError>`.
//! No panics on invalid input — every error is typed, and every
//! recoverable error is handled at the component boundary where it
//! occurs (framing errors resynchronize, codec errors drop and retry,
//! transport errors surface as a disconnect).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the streaming engine.
#[derive(Debug, Error)]
pub enum LinkError {
    // ── Framing Errors ───────────────────────────────────────────
    /// A wire packet header declared a malformed or out-of-range
    /// length. Recovery policy: the offending header is consumed and
    /// reading continues at the next header ("skip and continue").
    #[error("framing error: {reason} (declared {declared} bytes)")]
    Framing { reason: &'static str, declared: u64 },

    /// A frame type byte did not map to any known wire packet kind.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    // ── Codec Device Errors ──────────────────────────────────────
    /// The Codec Device refused a configuration. Recovered by
    /// retrying on the next Config or Keyframe unit.
    #[error("codec init failed: {0}")]
    CodecInit(String),

    /// Runtime fault from the Codec Device, typically caused by the
    /// display surface being invalidated underneath the decoder.
    #[error("decode fault: {0}")]
    Decode(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The transport channel closed or reported an I/O failure.
    /// Never retried automatically — surfaced as a disconnect event.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The negotiation service was not found after bounded retries.
    #[error("negotiation timed out after {attempts} attempts")]
    NegotiationTimeout { attempts: u32 },

    // ── Descriptor / State Errors ────────────────────────────────
    /// A connection descriptor was missing a field required for its
    /// negotiated mode and direction.
    #[error("invalid connection descriptor: {0}")]
    InvalidDescriptor(&'static str),

    /// An operation was attempted in a link phase that forbids it.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a control payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// UTF-8 conversion failed (control channel payload).
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl LinkError {
    /// True for errors the read loop absorbs by resynchronizing at
    /// the next wire header rather than dropping the connection.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            LinkError::Framing { .. } | LinkError::UnknownVariant { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LinkError {
    fn from(s: String) -> Self {
        LinkError::Other(s)
    }
}

impl From<&str> for LinkError {
    fn from(s: &str) -> Self {
        LinkError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LinkError::ChannelClosed
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = LinkError::Framing {
            reason: "length out of range",
            declared: 2_000_000,
        };
        assert!(e.to_string().contains("2000000"));

        let e = LinkError::NegotiationTimeout { attempts: 3 };
        assert!(e.to_string().contains("3 attempts"));
    }

    #[test]
    fn framing_errors_are_recoverable() {
        assert!(
            LinkError::Framing {
                reason: "zero length",
                declared: 0
            }
            .is_framing()
        );
        assert!(
            LinkError::UnknownVariant {
                type_name: "FrameType",
                value: 0x7F
            }
            .is_framing()
        );
        assert!(!LinkError::ChannelClosed.is_framing());
    }

    #[test]
    fn from_string() {
        let e: LinkError = "something broke".into();
        assert!(matches!(e, LinkError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: LinkError = io_err.into();
        assert!(matches!(e, LinkError::Transport(_)));
    }
}
