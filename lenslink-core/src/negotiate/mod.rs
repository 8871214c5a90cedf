//! Connection and capability negotiation.
//!
//! Two roles: the **Advertiser** opens resources first and announces
//! availability; the **Scanner** discovers, reads capabilities, then
//! acts. The BLE attribute exchange, the TCP discovery record, and
//! the vendor SDK lifecycle all end in the same place: a validated
//! [`ConnectionDescriptor`] and one byte-stream channel per
//! negotiated direction. No data transfer starts before the direction
//! flag and every required channel identifier are known.

pub mod advertiser;
pub mod scanner;

pub use advertiser::{
    AcceptedChannels, AdvertisedLink, Advertiser, AttributeHost, ChannelHost, ChannelListener,
};
pub use scanner::{AttributeClient, Scanner, ScannerChannels};

use std::time::Instant;

use crate::error::LinkError;

// ── Negotiated values ────────────────────────────────────────────

/// Transport selected for the session (BLE mode byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionMode {
    /// BLE connection-oriented data channel.
    BleChannel = 1,
    /// WiFi TCP socket pair.
    Socket = 2,
    /// Vendor session SDK.
    VendorSdk = 3,
}

impl ConnectionMode {
    pub fn from_byte(b: u8) -> Result<Self, LinkError> {
        match b {
            1 => Ok(Self::BleChannel),
            2 => Ok(Self::Socket),
            3 => Ok(Self::VendorSdk),
            other => Err(LinkError::UnknownVariant {
                type_name: "ConnectionMode",
                value: other as u64,
            }),
        }
    }
}

/// Negotiated stream direction. The advertiser is device A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamDirection {
    /// Advertiser encodes, scanner decodes.
    AToB = 1,
    /// Scanner encodes, advertiser decodes.
    BToA = 2,
    /// Both run concurrently and independently.
    Bidirectional = 3,
}

impl StreamDirection {
    pub fn from_byte(b: u8) -> Result<Self, LinkError> {
        match b {
            1 => Ok(Self::AToB),
            2 => Ok(Self::BToA),
            3 => Ok(Self::Bidirectional),
            other => Err(LinkError::UnknownVariant {
                type_name: "StreamDirection",
                value: other as u64,
            }),
        }
    }

    /// Does the advertiser-side encoder run?
    pub fn advertiser_sends(self) -> bool {
        matches!(self, Self::AToB | Self::Bidirectional)
    }

    /// Does the scanner-side encoder run?
    pub fn scanner_sends(self) -> bool {
        matches!(self, Self::BToA | Self::Bidirectional)
    }
}

/// UI language, exchanged so the peer can mirror on-screen text.
/// Cosmetic; an unknown index falls back to English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Language {
    #[default]
    English = 0,
    Chinese = 1,
    Japanese = 2,
    Korean = 3,
}

impl Language {
    pub fn from_index(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::English),
            1 => Some(Self::Chinese),
            2 => Some(Self::Japanese),
            3 => Some(Self::Korean),
            _ => None,
        }
    }
}

// ── Attributes ───────────────────────────────────────────────────

/// The readable attributes the advertiser publishes. The underlying
/// attribute-read primitive allows one outstanding read at a time,
/// so the scanner reads these strictly sequentially, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Mode,
    Direction,
    Language,
    /// Channel identifier for the A→B leg.
    PsmPrimary,
    /// Channel identifier for the B→A leg.
    PsmSecondary,
}

/// The full attribute values an advertiser exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSet {
    pub mode: ConnectionMode,
    pub direction: StreamDirection,
    pub language: Language,
    pub psm_primary: Option<u32>,
    pub psm_secondary: Option<u32>,
}

impl AttributeSet {
    /// Raw bytes of one attribute as the stack would serve them:
    /// single bytes for mode/direction/language, `u32` LE for PSMs.
    pub fn value_of(&self, attr: Attribute) -> Option<Vec<u8>> {
        match attr {
            Attribute::Mode => Some(vec![self.mode as u8]),
            Attribute::Direction => Some(vec![self.direction as u8]),
            Attribute::Language => Some(vec![self.language as u8]),
            Attribute::PsmPrimary => self.psm_primary.map(|p| p.to_le_bytes().to_vec()),
            Attribute::PsmSecondary => self.psm_secondary.map(|p| p.to_le_bytes().to_vec()),
        }
    }
}

// ── ConnectionDescriptor ─────────────────────────────────────────

/// Per-session negotiated state. Construction validates the
/// invariant that every channel identifier required by the mode and
/// direction is present, so holders can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub mode: ConnectionMode,
    pub direction: StreamDirection,
    pub language: Language,
    /// PSM of the A→B leg (BLE mode only).
    pub psm_primary: Option<u32>,
    /// PSM of the B→A leg (BLE mode only).
    pub psm_secondary: Option<u32>,
}

impl ConnectionDescriptor {
    pub fn new(
        mode: ConnectionMode,
        direction: StreamDirection,
        language: Language,
        psm_primary: Option<u32>,
        psm_secondary: Option<u32>,
    ) -> Result<Self, LinkError> {
        if mode == ConnectionMode::BleChannel {
            if direction.advertiser_sends() && psm_primary.is_none() {
                return Err(LinkError::InvalidDescriptor(
                    "missing primary channel identifier",
                ));
            }
            if direction.scanner_sends() && psm_secondary.is_none() {
                return Err(LinkError::InvalidDescriptor(
                    "missing secondary channel identifier",
                ));
            }
        }
        Ok(Self {
            mode,
            direction,
            language,
            psm_primary,
            psm_secondary,
        })
    }
}

// ── LinkPhase ────────────────────────────────────────────────────

/// Lifecycle of a peer link, shared by all three transports.
///
/// ```text
///  Idle ──► Searching ──► Connecting ──► Connected ──► Streaming
///    ▲          │              │              │             │
///    └──────────┴──────────────┴──────────────┴─────────────┘
/// ```
///
/// Transitions return `Result` instead of panicking; any failure
/// path goes through [`force_idle`](Self::force_idle).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// No activity. Initial / terminal state.
    #[default]
    Idle,
    /// Scanning or advertising, depending on role.
    Searching,
    /// Peer found; channel establishment in progress.
    Connecting,
    /// Channels are up, no media flowing yet.
    Connected { since: Instant },
    /// Media is flowing.
    Streaming { since: Instant },
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Searching => write!(f, "Searching"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Streaming { .. } => write!(f, "Streaming"),
        }
    }
}

impl LinkPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Streaming { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Valid from: `Idle`.
    pub fn begin_search(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Idle => {
                *self = Self::Searching;
                Ok(())
            }
            _ => Err(LinkError::Protocol("cannot search: not Idle")),
        }
    }

    /// Valid from: `Searching`.
    pub fn begin_connect(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Searching => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(LinkError::Protocol("cannot connect: not Searching")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(LinkError::Protocol("cannot complete connect: not Connecting")),
        }
    }

    /// Valid from: `Connected`.
    pub fn begin_streaming(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Connected { since } => {
                *self = Self::Streaming { since: *since };
                Ok(())
            }
            _ => Err(LinkError::Protocol("cannot stream: not Connected")),
        }
    }

    /// Valid from: `Streaming` (stream stop without disconnect).
    pub fn end_streaming(&mut self) -> Result<(), LinkError> {
        match self {
            Self::Streaming { since } => {
                *self = Self::Connected { since: *since };
                Ok(())
            }
            _ => Err(LinkError::Protocol("cannot end streaming: not Streaming")),
        }
    }

    /// Reset to `Idle` from any state. Used for every failure and
    /// disconnect path; user-initiated retry starts fresh from here.
    pub fn force_idle(&mut self) {
        *self = Self::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
