//! Full-link integration: BLE-style negotiation over an in-memory
//! medium, then duplex streaming with decode on both ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use lenslink_core::device::{DecoderDevice, EncodedChunk, EncoderSource};
use lenslink_core::error::LinkError;
use lenslink_core::negotiate::{
    Advertiser, AttributeClient, AttributeHost, AttributeSet, ChannelHost, ChannelListener,
    ConnectionMode, Language, Scanner, StreamDirection,
};
use lenslink_core::negotiate::Attribute;
use lenslink_core::pipeline::{InboundLeg, OutboundLeg, SessionConfig, StreamSession};
use lenslink_core::surface::{SurfaceHandle, SurfaceId, SurfaceSlot};
use lenslink_core::transport::ble::ChannelFactory;
use lenslink_core::transport::{ByteStream, TransportKind};
use lenslink_core::unit::{UnitKind, VideoUnit};

// ── In-memory BLE medium ─────────────────────────────────────────

/// Shared state standing in for the radio: the published attribute
/// table, the advertising flag, and one rendezvous queue per open
/// listener PSM.
#[derive(Default)]
struct Medium {
    attrs: std::sync::Mutex<Option<AttributeSet>>,
    advertising: AtomicBool,
    listeners: std::sync::Mutex<HashMap<u32, mpsc::Sender<DuplexStream>>>,
}

struct FakeHost {
    medium: Arc<Medium>,
}

#[async_trait]
impl AttributeHost for FakeHost {
    async fn publish(&mut self, attrs: &AttributeSet) -> Result<(), LinkError> {
        *self.medium.attrs.lock().unwrap() = Some(attrs.clone());
        Ok(())
    }

    async fn start_advertising(&mut self) -> Result<(), LinkError> {
        self.medium.advertising.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), LinkError> {
        self.medium.advertising.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeListener {
    psm: u32,
    rx: mpsc::Receiver<DuplexStream>,
}

#[async_trait]
impl ChannelListener for FakeListener {
    fn psm(&self) -> u32 {
        self.psm
    }

    async fn accept(&mut self) -> Result<Box<dyn ByteStream>, LinkError> {
        let stream = self.rx.recv().await.ok_or(LinkError::ChannelClosed)?;
        Ok(Box::new(stream))
    }
}

struct FakeChannelHost {
    medium: Arc<Medium>,
    psms: Vec<u32>,
}

#[async_trait]
impl ChannelHost for FakeChannelHost {
    async fn open_listener(&mut self) -> Result<Box<dyn ChannelListener>, LinkError> {
        let psm = self.psms.remove(0);
        let (tx, rx) = mpsc::channel(1);
        self.medium.listeners.lock().unwrap().insert(psm, tx);
        Ok(Box::new(FakeListener { psm, rx }))
    }
}

struct FakeClient {
    medium: Arc<Medium>,
}

#[async_trait]
impl AttributeClient for FakeClient {
    async fn discover_service(&mut self) -> Result<bool, LinkError> {
        Ok(self.medium.advertising.load(Ordering::SeqCst))
    }

    fn invalidate_cache(&mut self) {}

    async fn read_attribute(&mut self, attr: Attribute) -> Result<Vec<u8>, LinkError> {
        self.medium
            .attrs
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|a| a.value_of(attr))
            .ok_or(LinkError::Protocol("attribute not published"))
    }
}

#[async_trait]
impl ChannelFactory for FakeClient {
    async fn open_channel(&mut self, psm: u32) -> Result<Box<dyn ByteStream>, LinkError> {
        let tx = self
            .medium
            .listeners
            .lock()
            .unwrap()
            .get(&psm)
            .cloned()
            .ok_or(LinkError::Protocol("no listener on that channel"))?;
        let (near, far) = tokio::io::duplex(256 * 1024);
        tx.send(far)
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        Ok(Box::new(near))
    }
}

// ── Codec device fakes ───────────────────────────────────────────

struct ScriptSource {
    chunks: Vec<EncodedChunk>,
}

#[async_trait]
impl EncoderSource for ScriptSource {
    async fn next_unit(&mut self) -> Result<Option<EncodedChunk>, LinkError> {
        if self.chunks.is_empty() {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(None);
        }
        Ok(Some(self.chunks.remove(0)))
    }
}

#[derive(Default)]
struct Recording {
    configures: usize,
    decoded: Vec<UnitKind>,
}

struct RecordingDevice {
    log: Arc<std::sync::Mutex<Recording>>,
}

impl DecoderDevice for RecordingDevice {
    fn configure(&mut self, _config: &[u8], _surface: &SurfaceHandle) -> Result<(), LinkError> {
        self.log.lock().unwrap().configures += 1;
        Ok(())
    }

    fn decode(&mut self, unit: &VideoUnit) -> Result<(), LinkError> {
        self.log.lock().unwrap().decoded.push(unit.kind);
        Ok(())
    }

    fn release(&mut self) {}
}

fn avc(nal_type: u8, ts: i64) -> EncodedChunk {
    EncodedChunk {
        timestamp_us: ts,
        data: Bytes::from(vec![0, 0, 0, 1, nal_type, 0x11, 0x22, 0x33]),
    }
}

fn camera_script() -> Vec<EncodedChunk> {
    vec![
        avc(0x67, 0),       // SPS
        avc(0x65, 0),       // IDR
        avc(0x41, 33_000),  // delta
        avc(0x41, 66_000),  // delta
    ]
}

async fn wait_for_decodes(log: &Arc<std::sync::Mutex<Recording>>, want: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if log.lock().unwrap().decoded.len() >= want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("peer never decoded the script");
}

// ── The test ─────────────────────────────────────────────────────

#[tokio::test]
async fn bidirectional_link_end_to_end() {
    let medium = Arc::new(Medium::default());

    // Advertiser (glasses side): open listeners, publish, advertise.
    let advertiser = Advertiser::new(StreamDirection::Bidirectional, Language::English);
    let mut host = FakeHost {
        medium: medium.clone(),
    };
    let mut channel_host = FakeChannelHost {
        medium: medium.clone(),
        psms: vec![111, 222],
    };
    let link = advertiser
        .advertise(&mut host, &mut channel_host)
        .await
        .unwrap();
    assert_eq!(link.descriptor.psm_primary, Some(111));
    assert_eq!(link.descriptor.psm_secondary, Some(222));

    // Scanner (phone side): discover, read the capability chain.
    let scanner = Scanner::new();
    let mut client = FakeClient {
        medium: medium.clone(),
    };
    let descriptor = scanner.negotiate(&mut client).await.unwrap();
    assert_eq!(descriptor.mode, ConnectionMode::BleChannel);
    assert_eq!(descriptor.direction, StreamDirection::Bidirectional);
    assert_eq!(descriptor.psm_primary, Some(111));
    assert_eq!(descriptor.psm_secondary, Some(222));

    // Bring the data channels up on both ends concurrently.
    let (accepted, opened) = tokio::join!(link.accept_channels(), async {
        scanner.open_channels(&descriptor, &mut client).await
    });
    let accepted = accepted.unwrap();
    let opened = opened.unwrap();

    // Both peers run a full duplex session.
    let adv_log = Arc::new(std::sync::Mutex::new(Recording::default()));
    let scan_log = Arc::new(std::sync::Mutex::new(Recording::default()));

    let adv_surface = Arc::new(SurfaceSlot::new());
    adv_surface.publish(SurfaceId(1));
    let scan_surface = Arc::new(SurfaceSlot::new());
    scan_surface.publish(SurfaceId(2));

    let mut adv_session = StreamSession::new(SessionConfig::for_transport(TransportKind::Ble));
    adv_session
        .start(
            Some(OutboundLeg {
                channel: Box::new(accepted.to_peer.unwrap()),
                source: Box::new(ScriptSource {
                    chunks: camera_script(),
                }),
            }),
            Some(InboundLeg {
                channel: Box::new(accepted.from_peer.unwrap()),
                device: Box::new(RecordingDevice {
                    log: adv_log.clone(),
                }),
                surface: adv_surface,
            }),
        )
        .await
        .unwrap();

    let mut scan_session = StreamSession::new(SessionConfig::for_transport(TransportKind::Ble));
    scan_session
        .start(
            Some(OutboundLeg {
                channel: Box::new(opened.to_peer.unwrap()),
                source: Box::new(ScriptSource {
                    chunks: camera_script(),
                }),
            }),
            Some(InboundLeg {
                channel: Box::new(opened.from_peer.unwrap()),
                device: Box::new(RecordingDevice {
                    log: scan_log.clone(),
                }),
                surface: scan_surface,
            }),
        )
        .await
        .unwrap();

    // Each side sent SPS, IDR, delta, delta; with the config
    // re-injected before the keyframe the peer decodes key + 2 deltas
    // after a single initialization.
    wait_for_decodes(&adv_log, 3).await;
    wait_for_decodes(&scan_log, 3).await;

    for log in [&adv_log, &scan_log] {
        let log = log.lock().unwrap();
        assert_eq!(log.configures, 1);
        assert_eq!(
            log.decoded,
            vec![UnitKind::Keyframe, UnitKind::Delta, UnitKind::Delta]
        );
    }

    let adv_in = adv_session.inbound_stats();
    assert_eq!(adv_in.frames_received, 5, "config, reinject, key, 2 deltas");
    assert_eq!(adv_in.frames_decoded, 3);
    // A keyframe arriving before any config would have been dropped.
    assert_eq!(adv_in.frames_dropped, 0);
    assert_eq!(adv_session.outbound_stats().config_reinjections, 1);

    adv_session.stop().await;
    scan_session.stop().await;
}
