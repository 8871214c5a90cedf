//! Advertiser role: open resources first, then announce.
//!
//! The BLE advertiser opens its data-channel listeners *before*
//! advertising, because the assigned channel identifiers (PSMs) are
//! part of the published attributes. Failure to open any listener or
//! the advertising resource is the one fatal condition at session
//! start: it propagates immediately, never a silent partial start.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::info;

use crate::error::LinkError;
use crate::negotiate::{AttributeSet, ConnectionDescriptor, ConnectionMode, Language, StreamDirection};
use crate::transport::ble::BleChannel;
use crate::transport::{ByteStream, ChannelDirection};

// ── BLE stack seams ──────────────────────────────────────────────

/// One open data-channel listener with its assigned PSM.
#[async_trait]
pub trait ChannelListener: Send + 'static {
    /// The transport-assigned channel identifier.
    fn psm(&self) -> u32;

    /// Accept exactly one inbound connection.
    async fn accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError>;
}

/// Opens data-channel listeners (advertiser side of the BLE stack).
#[async_trait]
pub trait ChannelHost: Send {
    async fn open_listener(&mut self) -> Result<Box<dyn ChannelListener>, LinkError>;
}

/// Publishes attributes and controls advertising.
#[async_trait]
pub trait AttributeHost: Send {
    /// Expose the attribute values as read-only characteristics.
    async fn publish(&mut self, attrs: &AttributeSet) -> Result<(), LinkError>;

    /// Begin advertising the service.
    async fn start_advertising(&mut self) -> Result<(), LinkError>;

    /// Stop advertising (after the scanner connected).
    async fn stop_advertising(&mut self) -> Result<(), LinkError>;
}

// ── Advertiser ───────────────────────────────────────────────────

/// BLE-path advertiser.
pub struct Advertiser {
    direction: StreamDirection,
    language: Language,
}

impl Advertiser {
    pub fn new(direction: StreamDirection, language: Language) -> Self {
        Self {
            direction,
            language,
        }
    }

    /// Open listeners, publish attributes, start advertising.
    ///
    /// Listeners are opened up front for every leg the direction
    /// needs, so both PSMs are known before the first advertisement
    /// goes out.
    pub async fn advertise(
        &self,
        attributes: &mut dyn AttributeHost,
        channels: &mut dyn ChannelHost,
    ) -> Result<AdvertisedLink, LinkError> {
        let primary = if self.direction.advertiser_sends() {
            Some(channels.open_listener().await?)
        } else {
            None
        };
        let secondary = if self.direction.scanner_sends() {
            Some(channels.open_listener().await?)
        } else {
            None
        };

        let psm_primary = primary.as_ref().map(|l| l.psm());
        let psm_secondary = secondary.as_ref().map(|l| l.psm());

        let descriptor = ConnectionDescriptor::new(
            ConnectionMode::BleChannel,
            self.direction,
            self.language,
            psm_primary,
            psm_secondary,
        )?;

        let attrs = AttributeSet {
            mode: ConnectionMode::BleChannel,
            direction: self.direction,
            language: self.language,
            psm_primary,
            psm_secondary,
        };
        attributes.publish(&attrs).await?;
        attributes.start_advertising().await?;
        info!(?psm_primary, ?psm_secondary, "advertising with open listeners");

        Ok(AdvertisedLink {
            descriptor,
            primary,
            secondary,
        })
    }
}

// ── AdvertisedLink ───────────────────────────────────────────────

/// Channels accepted from the scanner, mapped to session directions.
pub struct AcceptedChannels {
    /// Carries local encoder → peer (the A→B leg).
    pub to_peer: Option<BleChannel>,
    /// Carries peer → local decoder (the B→A leg).
    pub from_peer: Option<BleChannel>,
}

/// An advertising session whose listeners are live.
pub struct AdvertisedLink {
    pub descriptor: ConnectionDescriptor,
    primary: Option<Box<dyn ChannelListener>>,
    secondary: Option<Box<dyn ChannelListener>>,
}

impl AdvertisedLink {
    /// Accept one inbound connection per open listener.
    ///
    /// Each listener accepts on its own task, concurrently; the call
    /// resolves when every leg the direction needs is connected.
    pub async fn accept_channels(self) -> Result<AcceptedChannels, LinkError> {
        let mut tasks = Vec::new();
        let mut legs = Vec::new();

        if let Some(mut listener) = self.primary {
            legs.push(ChannelDirection::ToPeer);
            tasks.push(tokio::spawn(async move {
                let psm = listener.psm();
                let stream = listener.accept().await?;
                Ok::<_, LinkError>((psm, stream))
            }));
        }
        if let Some(mut listener) = self.secondary {
            legs.push(ChannelDirection::FromPeer);
            tasks.push(tokio::spawn(async move {
                let psm = listener.psm();
                let stream = listener.accept().await?;
                Ok::<_, LinkError>((psm, stream))
            }));
        }

        let joined = try_join_all(tasks)
            .await
            .map_err(|e| LinkError::Other(format!("accept task panicked: {e}")))?;

        let mut accepted = AcceptedChannels {
            to_peer: None,
            from_peer: None,
        };
        for (leg, result) in legs.into_iter().zip(joined) {
            let (psm, stream) = result?;
            info!(psm, ?leg, "inbound data channel accepted");
            let channel = BleChannel::new(psm, leg, stream);
            match leg {
                ChannelDirection::ToPeer => accepted.to_peer = Some(channel),
                ChannelDirection::FromPeer => accepted.from_peer = Some(channel),
            }
        }
        Ok(accepted)
    }
}

// ── Tests ────────────────────────────────────────────────────────
