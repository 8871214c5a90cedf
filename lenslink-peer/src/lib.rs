//! # lenslink-peer — headless streaming peer
//!
//! Reference peer built on `lenslink-core`: a synthetic encoder feeds
//! the outbound leg and a counting decoder drains the inbound one, so
//! two instances (or one in loopback mode) exercise the full duplex
//! pipeline without camera or display hardware.
//!
//! ## Modes
//!
//! - **Advertise**: listen for the peer on two TCP ports.
//! - **Scan**: dial an advertising peer.
//! - **Loopback**: run both peers in-process over in-memory channels.

pub mod config;
pub mod source;
