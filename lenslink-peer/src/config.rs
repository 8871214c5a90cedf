//! Configuration for the streaming peer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use lenslink_core::transport::tcp::{DEFAULT_PORT_FROM_PEER, DEFAULT_PORT_TO_PEER};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Synthetic stream settings.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address of the advertising peer (scan mode) or the bind
    /// address (advertise mode).
    pub peer_addr: String,
    /// Port of the advertiser → scanner video leg.
    pub port_to_peer: u16,
    /// Port of the scanner → advertiser video leg.
    pub port_from_peer: u16,
}

/// Synthetic stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Target frames per second.
    pub fps: u8,
    /// Frames between keyframes.
    pub keyframe_interval: u32,
    /// Payload size of a generated delta frame in bytes.
    pub unit_bytes: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_addr: "127.0.0.1".into(),
            port_to_peer: DEFAULT_PORT_TO_PEER,
            port_from_peer: DEFAULT_PORT_FROM_PEER,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            keyframe_interval: 30,
            unit_bytes: 4096,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl PeerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.network.port_to_peer, DEFAULT_PORT_TO_PEER);
        assert_eq!(cfg.stream.fps, 30);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: PeerConfig = toml::from_str(
            r#"
            [stream]
            fps = 60
            "#,
        )
        .unwrap();
        assert_eq!(cfg.stream.fps, 60);
        assert_eq!(cfg.stream.keyframe_interval, 30);
        assert_eq!(cfg.network.port_to_peer, DEFAULT_PORT_TO_PEER);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = PeerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: PeerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.network.peer_addr, cfg.network.peer_addr);
        assert_eq!(back.stream.unit_bytes, cfg.stream.unit_bytes);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = PeerConfig::load(Path::new("/nonexistent/lenslink.toml"));
        assert_eq!(cfg.stream.fps, 30);
    }
}
