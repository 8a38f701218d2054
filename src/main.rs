//! # mt-bridge: service entry point
//!
//! Boots the bridge from the environment (see [`mt_bridge::config`]) and
//! logs every event until Ctrl-C.
//!
//! | Variable   | Default         | Description     |
//! |------------|-----------------|-----------------|
//! | `RUST_LOG` | `mt_bridge=debug` | Tracing filter |

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mt_bridge::{Bar, BarMap, BridgeConfig, Candle, EventKind, MarketEvent, MtBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("mt_bridge=debug".parse()?))
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════╗
  ║      MT-BRIDGE · MetaTrader Market Data       ║
  ║   Binary stream · M1 history · Live events    ║
  ╚═══════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = BridgeConfig::from_env().context("Failed to load bridge config")?;

    // ── 4. Bridge ─────────────────────────────────────────────────────────────
    let bridge = MtBridge::<Candle>::start_with_callback(config, log_event)
        .await
        .context("Failed to start bridge")?;

    if bridge.wait().await {
        info!(
            version = bridge.get_mt_bridge_version(),
            symbols = ?bridge.get_symbol_list(),
            "Terminal connected"
        );
    } else {
        warn!("First session failed, still listening for the terminal");
    }

    // ── 5. Run until Ctrl-C ───────────────────────────────────────────────────
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    bridge.shutdown().await;

    Ok(())
}

fn log_event(bars: &BarMap<Candle>, kind: EventKind, timestamp: u64) {
    let valid = bars.values().filter(|bar| bar.is_valid()).count();
    match kind {
        EventKind::HistoricalDataReceived => {
            info!(timestamp, minute_of_day = (timestamp / 60) % 1440, valid, "📊 Bar closed");
        }
        EventKind::NewTick => {
            debug!(timestamp, valid, "Tick");
        }
    }
    debug!("{}", MarketEvent::new(bars, kind, timestamp).to_json());
}
