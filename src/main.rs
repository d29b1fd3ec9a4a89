//! navlink - external display link for turn-by-turn navigation
//!
//! `push` feeds synthetic routing updates through the display-link client;
//! `emulate` stands in for the display so the link can be exercised end to
//! end on one machine.

use clap::{Parser, Subcommand};
use navlink_client::{DisplayLinkClient, Endpoint, LinkConfig, SharedConfig};
use navlink_protocol::{Command, Decoder, Frame, DEFAULT_PORT};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "navlink")]
#[command(about = "External display link for turn-by-turn navigation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push synthetic routing updates to an external display
    Push {
        /// Display host
        #[arg(long, default_value = "192.168.4.1", env = "NAVLINK_HOST")]
        host: String,

        /// Display port
        #[arg(long, default_value_t = DEFAULT_PORT, env = "NAVLINK_PORT")]
        port: u16,

        /// Producer update interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,

        /// Push on every eligible tick even when the payload is unchanged
        #[arg(long)]
        always_send: bool,
    },

    /// Emulate an external display: log frames, answer PING with PONG
    Emulate {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Listen port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Push {
            host,
            port,
            interval_ms,
            always_send,
        } => push(host, port, interval_ms, always_send).await,
        Commands::Emulate { bind, port } => emulate(bind, port).await,
    }
}

async fn push(
    host: String,
    port: u16,
    interval_ms: u64,
    always_send: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = Arc::new(SharedConfig::new(Endpoint::new(host, port)));
    let mut config = LinkConfig::default();
    if always_send {
        config = config.with_always_send();
    }

    let client = DisplayLinkClient::new(provider, config);
    client.start();
    tracing::info!("pushing synthetic route updates (ctrl-c to stop)");

    let mut dist_to_turn_m: u64 = 900;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.schedule_update(&sample_payload(dist_to_turn_m));
                dist_to_turn_m = if dist_to_turn_m <= 10 { 900 } else { dist_to_turn_m - 10 };
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    client.close().await;
    Ok(())
}

/// A routing payload in the shape the navigation layer produces. The client
/// itself treats it as an opaque string.
fn sample_payload(dist_to_turn_m: u64) -> String {
    serde_json::json!({
        "cDist": format!("{} m", dist_to_turn_m),
        "cTurn": 3,
        "cStreet": "Harvard Street",
        "nStreet": "College Avenue",
        "tDist": "4.2 km",
        "tPerc": "37",
        "tTimeLeft": 380,
        "cSpeed": "48km/h",
    })
    .to_string()
}

async fn emulate(bind: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind((bind.as_str(), port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "emulated display listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "host connected");
        tokio::spawn(async move {
            if let Err(e) = serve_display(stream).await {
                tracing::info!(error = %e, "session ended");
            } else {
                tracing::info!("host disconnected");
            }
        });
    }
}

async fn serve_display(
    mut stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut decoder = Decoder::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.extend(&buf[..n]);

        while let Some(frame) = decoder.decode_frame()? {
            match frame.command {
                Command::Ping => {
                    stream.write_all(&Frame::pong().encode()?).await?;
                    tracing::debug!("ping answered");
                }
                Command::UpdateTime => {
                    tracing::info!(
                        millis = %String::from_utf8_lossy(&frame.payload),
                        "clock sync"
                    );
                }
                Command::UpdateRoutingInfo => {
                    tracing::info!(
                        payload = %String::from_utf8_lossy(&frame.payload),
                        "routing update"
                    );
                }
                Command::Pong => tracing::warn!("unsolicited PONG from the host"),
            }
        }
    }
}
