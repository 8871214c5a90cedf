//! Scanner role: discover, read capabilities, then act.
//!
//! The attribute-read primitive allows only one outstanding read at a
//! time, so the capability chain is strictly sequential: mode →
//! direction → language → channel identifier(s). Data channels open
//! only after the direction flag and every required PSM are known —
//! never earlier, for any interleaving of read completions.
//!
//! Cached, outdated discovery results are a known environmental risk:
//! each discovery retry invalidates the stack's cached service list
//! before re-discovering.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::negotiate::{
    Attribute, ConnectionDescriptor, ConnectionMode, Language, StreamDirection,
};
use crate::transport::ble::{BleChannel, ChannelFactory};
use crate::transport::ChannelDirection;

/// Discovery attempts before giving up.
const DISCOVERY_RETRIES: u32 = 3;
/// Backoff between discovery attempts.
const DISCOVERY_BACKOFF: Duration = Duration::from_millis(500);

// ── AttributeClient ──────────────────────────────────────────────

/// Scanner side of the BLE stack.
#[async_trait]
pub trait AttributeClient: Send {
    /// Discover the peer's service. `false` means not found (retry
    /// candidate), an error means the stack itself failed.
    async fn discover_service(&mut self) -> Result<bool, LinkError>;

    /// Drop any cached service list before the next discovery.
    fn invalidate_cache(&mut self);

    /// Read one attribute. Only one read may be outstanding.
    async fn read_attribute(&mut self, attr: Attribute) -> Result<Vec<u8>, LinkError>;
}

// ── Scanner ──────────────────────────────────────────────────────

/// Channels the scanner opened, mapped to session directions.
pub struct ScannerChannels {
    /// Carries local encoder → peer (the B→A leg).
    pub to_peer: Option<BleChannel>,
    /// Carries peer → local decoder (the A→B leg).
    pub from_peer: Option<BleChannel>,
}

/// BLE-path scanner.
pub struct Scanner {
    retries: u32,
    backoff: Duration,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            retries: DISCOVERY_RETRIES,
            backoff: DISCOVERY_BACKOFF,
        }
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override retry policy (tests).
    pub fn with_retry(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Discover the service and read the full capability chain.
    pub async fn negotiate(
        &self,
        client: &mut dyn AttributeClient,
    ) -> Result<ConnectionDescriptor, LinkError> {
        self.discover(client).await?;

        // Strictly sequential read chain; each read awaits the
        // previous completion.
        let mode = ConnectionMode::from_byte(first_byte(
            client.read_attribute(Attribute::Mode).await?,
            "mode",
        )?)?;
        let direction = StreamDirection::from_byte(first_byte(
            client.read_attribute(Attribute::Direction).await?,
            "direction",
        )?)?;
        let language_byte = first_byte(
            client.read_attribute(Attribute::Language).await?,
            "language",
        )?;
        let language = Language::from_index(language_byte).unwrap_or_else(|| {
            debug!(language_byte, "unknown language index, defaulting to English");
            Language::default()
        });

        let psm_primary = if mode == ConnectionMode::BleChannel && direction.advertiser_sends() {
            Some(psm_value(
                client.read_attribute(Attribute::PsmPrimary).await?,
            )?)
        } else {
            None
        };
        let psm_secondary = if mode == ConnectionMode::BleChannel && direction.scanner_sends() {
            Some(psm_value(
                client.read_attribute(Attribute::PsmSecondary).await?,
            )?)
        } else {
            None
        };

        let descriptor =
            ConnectionDescriptor::new(mode, direction, language, psm_primary, psm_secondary)?;
        info!(?mode, ?direction, ?psm_primary, ?psm_secondary, "negotiation complete");
        Ok(descriptor)
    }

    /// Open the data channel(s) for a validated descriptor.
    ///
    /// The descriptor's constructor guarantees every required PSM is
    /// present, so this can only be reached with the direction flag
    /// and identifiers known.
    pub async fn open_channels(
        &self,
        descriptor: &ConnectionDescriptor,
        factory: &mut dyn ChannelFactory,
    ) -> Result<ScannerChannels, LinkError> {
        let from_peer = match descriptor.psm_primary {
            Some(psm) => {
                let stream = factory.open_channel(psm).await?;
                Some(BleChannel::new(psm, ChannelDirection::FromPeer, stream))
            }
            None => None,
        };
        let to_peer = match descriptor.psm_secondary {
            Some(psm) => {
                let stream = factory.open_channel(psm).await?;
                Some(BleChannel::new(psm, ChannelDirection::ToPeer, stream))
            }
            None => None,
        };
        Ok(ScannerChannels { to_peer, from_peer })
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn discover(&self, client: &mut dyn AttributeClient) -> Result<(), LinkError> {
        for attempt in 1..=self.retries {
            if client.discover_service().await? {
                debug!(attempt, "service discovered");
                return Ok(());
            }
            warn!(attempt, "service not found");
            if attempt < self.retries {
                client.invalidate_cache();
                tokio::time::sleep(self.backoff).await;
            }
        }
        Err(LinkError::NegotiationTimeout {
            attempts: self.retries,
        })
    }
}

fn first_byte(value: Vec<u8>, what: &'static str) -> Result<u8, LinkError> {
    value
        .first()
        .copied()
        .ok_or(LinkError::InvalidDescriptor(what))
}

fn psm_value(value: Vec<u8>) -> Result<u32, LinkError> {
    if value.len() < 4 {
        return Err(LinkError::InvalidDescriptor("channel identifier truncated"));
    }
    Ok(u32::from_le_bytes(value[0..4].try_into().unwrap()))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::AttributeSet;
    use crate::transport::ByteStream;
    use std::sync::{Arc, Mutex};

    /// Records the order of every stack interaction; read results
    /// resolve only after a yield, exercising callback interleaving.
    struct RecordingStack {
        attrs: AttributeSet,
        log: Arc<Mutex<Vec<String>>>,
        found_after: u32,
        attempts: u32,
    }

    impl RecordingStack {
        fn new(attrs: AttributeSet, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                attrs,
                log,
                found_after: 0,
                attempts: 0,
            }
        }
    }

    #[async_trait]
    impl AttributeClient for RecordingStack {
        async fn discover_service(&mut self) -> Result<bool, LinkError> {
            self.attempts += 1;
            self.log.lock().unwrap().push("discover".into());
            Ok(self.attempts > self.found_after)
        }

        fn invalidate_cache(&mut self) {
            self.log.lock().unwrap().push("invalidate".into());
        }

        async fn read_attribute(&mut self, attr: Attribute) -> Result<Vec<u8>, LinkError> {
            // Completion arrives "later", like a stack callback.
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(format!("read:{attr:?}"));
            self.attrs
                .value_of(attr)
                .ok_or(LinkError::InvalidDescriptor("attribute not published"))
        }
    }

    #[async_trait]
    impl ChannelFactory for RecordingStack {
        async fn open_channel(&mut self, psm: u32) -> Result<Box<dyn ByteStream>, LinkError> {
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(format!("open:{psm}"));
            let (a, _b) = tokio::io::duplex(64);
            Ok(Box::new(a))
        }
    }

    fn bidi_attrs() -> AttributeSet {
        AttributeSet {
            mode: ConnectionMode::BleChannel,
            direction: StreamDirection::Bidirectional,
            language: Language::English,
            psm_primary: Some(111),
            psm_secondary: Some(222),
        }
    }

    #[tokio::test]
    async fn read_chain_is_strictly_sequential() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RecordingStack::new(bidi_attrs(), Arc::clone(&log));

        let scanner = Scanner::new();
        let descriptor = scanner.negotiate(&mut stack).await.unwrap();
        assert_eq!(descriptor.psm_primary, Some(111));
        assert_eq!(descriptor.psm_secondary, Some(222));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "discover",
                "read:Mode",
                "read:Direction",
                "read:Language",
                "read:PsmPrimary",
                "read:PsmSecondary",
            ]
        );
    }

    #[tokio::test]
    async fn channels_open_only_after_all_reads() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RecordingStack::new(bidi_attrs(), Arc::clone(&log));

        let scanner = Scanner::new();
        let descriptor = scanner.negotiate(&mut stack).await.unwrap();
        let channels = scanner.open_channels(&descriptor, &mut stack).await.unwrap();
        assert!(channels.to_peer.is_some() && channels.from_peer.is_some());

        // Every read precedes every open.
        let log = log.lock().unwrap();
        let last_read = log.iter().rposition(|e| e.starts_with("read:")).unwrap();
        let first_open = log.iter().position(|e| e.starts_with("open:")).unwrap();
        assert!(last_read < first_open, "log: {log:?}");
    }

    #[tokio::test]
    async fn one_way_reads_one_psm() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let attrs = AttributeSet {
            direction: StreamDirection::AToB,
            psm_secondary: None,
            ..bidi_attrs()
        };
        let mut stack = RecordingStack::new(attrs, Arc::clone(&log));

        let descriptor = Scanner::new().negotiate(&mut stack).await.unwrap();
        assert_eq!(descriptor.psm_primary, Some(111));
        assert_eq!(descriptor.psm_secondary, None);
        assert!(!log.lock().unwrap().iter().any(|e| e == "read:PsmSecondary"));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_retries_with_backoff_and_cache_invalidation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RecordingStack::new(bidi_attrs(), Arc::clone(&log));
        stack.found_after = 2; // found on the third attempt

        let start = tokio::time::Instant::now();
        Scanner::new().negotiate(&mut stack).await.unwrap();

        // Two backoff sleeps of 500 ms under paused time.
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        let log = log.lock().unwrap();
        assert_eq!(
            log.iter().filter(|e| *e == "discover").count(),
            3
        );
        assert_eq!(log.iter().filter(|e| *e == "invalidate").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_exhaustion_is_negotiation_timeout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RecordingStack::new(bidi_attrs(), Arc::clone(&log));
        stack.found_after = 10; // never found within 3 attempts

        let err = Scanner::new().negotiate(&mut stack).await.unwrap_err();
        assert!(matches!(err, LinkError::NegotiationTimeout { attempts: 3 }));
        // No attribute was read and no channel was opened.
        assert!(!log.lock().unwrap().iter().any(|e| e.starts_with("read:")));
    }
}
