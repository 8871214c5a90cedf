//! LensLink peer — entry point.
//!
//! ```text
//! lenslink-peer --role advertise       Listen for a scanning peer
//! lenslink-peer --role scan            Dial an advertising peer
//! lenslink-peer --role loopback        Run both peers in-process
//! lenslink-peer --config <path>        Load a custom config TOML
//! lenslink-peer --gen-config           Write default config to stdout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lenslink_core::pipeline::{InboundLeg, OutboundLeg, SessionConfig, SessionEvent, StreamSession};
use lenslink_core::surface::{SurfaceId, SurfaceSlot};
use lenslink_core::transport::{
    ChannelDirection, DiscoveryRecord, TcpChannel, TransportChannel, loopback_pair,
};

use lenslink_peer::config::PeerConfig;
use lenslink_peer::source::{CountingDecoder, SyntheticEncoder};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// Listen on both video ports and wait for the peer.
    Advertise,
    /// Dial an advertising peer.
    Scan,
    /// Run both ends in one process over in-memory channels.
    Loopback,
}

#[derive(Parser, Debug)]
#[command(name = "lenslink-peer", about = "LensLink duplex streaming peer")]
struct Cli {
    /// Which end of the link this process plays.
    #[arg(long, value_enum, default_value_t = Role::Loopback)]
    role: Role,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lenslink.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&PeerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = PeerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lenslink-peer v{}", env!("CARGO_PKG_VERSION"));
    info!(role = ?cli.role, fps = config.stream.fps, "starting");

    match cli.role {
        Role::Loopback => run_loopback(&config).await,
        Role::Advertise | Role::Scan => run_tcp(&config, cli.role).await,
    }
}

// ── Loopback mode ────────────────────────────────────────────────

/// Two full peers in one process, joined by in-memory channels; the
/// whole pipeline runs except the radio.
async fn run_loopback(config: &PeerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (a_out, b_in) = loopback_pair(256 * 1024);
    let (b_out, a_in) = loopback_pair(256 * 1024);

    let session_a = start_peer("peer-a", config, Box::new(a_out), Box::new(a_in)).await?;
    let session_b = start_peer("peer-b", config, Box::new(b_out), Box::new(b_in)).await?;

    run_until_ctrl_c(vec![session_a, session_b]).await;
    Ok(())
}

// ── TCP mode ─────────────────────────────────────────────────────

async fn run_tcp(config: &PeerConfig, role: Role) -> Result<(), Box<dyn std::error::Error>> {
    let to_peer: SocketAddr =
        format!("{}:{}", config.network.peer_addr, config.network.port_to_peer).parse()?;
    let from_peer: SocketAddr = format!(
        "{}:{}",
        config.network.peer_addr, config.network.port_from_peer
    )
    .parse()?;

    // The advertiser listens on both legs; the scanner dials them.
    // Leg naming is advertiser-relative, so the scanner's outbound
    // leg dials the advertiser's from-peer port.
    let (out_channel, in_channel): (Box<dyn TransportChannel>, Box<dyn TransportChannel>) =
        match role {
            Role::Advertise => {
                // What an mDNS responder would announce for us; the
                // responder itself is an OS facility.
                let record = DiscoveryRecord {
                    port_to_peer: config.network.port_to_peer,
                    port_from_peer: config.network.port_from_peer,
                    ..DiscoveryRecord::default()
                };
                info!(
                    service = %record.service_name,
                    port_to_peer = record.port_to_peer,
                    port_from_peer = record.port_from_peer,
                    "advertising"
                );
                (
                    Box::new(TcpChannel::listen(to_peer, ChannelDirection::ToPeer)),
                    Box::new(TcpChannel::listen(from_peer, ChannelDirection::FromPeer)),
                )
            }
            Role::Scan => (
                Box::new(TcpChannel::dial(from_peer, ChannelDirection::ToPeer)),
                Box::new(TcpChannel::dial(to_peer, ChannelDirection::FromPeer)),
            ),
            Role::Loopback => unreachable!("loopback handled by caller"),
        };

    let session = start_peer("peer", config, out_channel, in_channel).await?;
    run_until_ctrl_c(vec![session]).await;
    Ok(())
}

// ── Shared peer bring-up ─────────────────────────────────────────

async fn start_peer(
    name: &'static str,
    config: &PeerConfig,
    out_channel: Box<dyn TransportChannel>,
    in_channel: Box<dyn TransportChannel>,
) -> Result<StreamSession, Box<dyn std::error::Error>> {
    let kind = out_channel.kind();
    let mut session = StreamSession::new(SessionConfig::for_transport(kind));

    // Surface exists for the life of the process.
    let surface = Arc::new(SurfaceSlot::new());
    surface.publish(SurfaceId(1));

    let mut events = session.events().expect("events taken once");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::ControlReceived(msg) => {
                    info!(peer = name, topic = %msg.topic, "control message")
                }
                SessionEvent::Disconnected { direction, reason } => {
                    info!(peer = name, ?direction, %reason, "peer disconnected")
                }
            }
        }
    });

    session
        .start(
            Some(OutboundLeg {
                channel: out_channel,
                source: Box::new(SyntheticEncoder::new(&config.stream)),
            }),
            Some(InboundLeg {
                channel: in_channel,
                device: Box::new(CountingDecoder::new()),
                surface,
            }),
        )
        .await?;
    info!(peer = name, ?kind, "session streaming");
    Ok(session)
}

/// Periodic stats until Ctrl-C, then orderly teardown.
async fn run_until_ctrl_c(mut sessions: Vec<StreamSession>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    ticker.tick().await; // first tick is immediate
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                for session in &sessions {
                    let out = session.outbound_stats();
                    let inbound = session.inbound_stats();
                    info!(
                        sent = out.frames_sent,
                        received = inbound.frames_received,
                        decoded = inbound.frames_decoded,
                        dropped = out.frames_dropped + inbound.frames_dropped,
                        resyncs = inbound.resyncs,
                        "stats"
                    );
                }
            }
        }
    }
    for session in &mut sessions {
        session.stop().await;
    }
}
