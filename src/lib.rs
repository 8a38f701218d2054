//! # mt-bridge: MetaTrader market-data bridge
//!
//! Accepts one inbound connection from a MetaTrader expert, decodes its
//! fixed-width binary quote stream, keeps a per-minute OHLCV history for
//! every instrument and exposes it through polling accessors and an optional
//! historical-replay-then-live event callback.
//!
//! ```no_run
//! use mt_bridge::{BridgeConfig, Candle, EventKind, MtBridge};
//!
//! # async fn demo() -> Result<(), mt_bridge::BridgeError> {
//! let bridge = MtBridge::<Candle>::start_with_callback(
//!     BridgeConfig::new(5555, 10),
//!     |bars, kind, ts| {
//!         if kind == EventKind::HistoricalDataReceived {
//!             let eurusd = MtBridge::<Candle>::pick("EURUSD", bars);
//!             println!("{ts}: {}", eurusd.close);
//!         }
//!     },
//! )
//! .await?;
//!
//! if bridge.wait().await {
//!     println!("symbols: {:?}", bridge.get_symbol_list());
//! }
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod state;
pub mod wire;

pub use bridge::{MtBridge, ServerTimestampWatcher};
pub use config::{BridgeConfig, ByteOrder};
pub use error::BridgeError;
pub use events::{BarMap, EventCallback, EventKind, MarketEvent};
pub use models::{Bar, Candle, PriceType, Tick};
