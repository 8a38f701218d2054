//! # bridge
//!
//! [`MtBridge`]: the public surface. Binds the listener, spawns the session
//! loop (and the dispatch loop when a callback is given) and exposes the
//! polling accessors.
//!
//! ```text
//!  ┌──────────────┐  TCP (fixed-width binary)  ┌──────────────┐
//!  │  MetaTrader  │ ─────────────────────────▶ │ Session loop │──┐ writes
//!  │  expert      │                            └──────────────┘  ▼
//!  └──────────────┘                                    ┌──────────────────┐
//!                                                      │ MarketState      │
//!  ┌──────────────┐  get_tick / get_candle_at / ...    │ ├─ symbols       │
//!  │  Consumer    │ ◀───────────────────────────────── │ ├─ ticks         │
//!  │              │ ◀── callback(map, kind, ts) ──┐    │ └─ candles       │
//!  └──────────────┘                               │    └──────────────────┘
//!                                          ┌──────┴───────┐  ▲ reads
//!                                          │ Dispatch loop│──┘
//!                                          └──────────────┘
//! ```
//!
//! Every accessor is a cheap synchronous copy and returns a zero / empty
//! sentinel rather than an error when the bridge is not connected, the index
//! is out of range or the name is unknown. Check `Bar::is_valid`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::engine::dispatcher::Dispatcher;
use crate::engine::session::Session;
use crate::error::BridgeError;
use crate::events::{BarMap, EventCallback, EventKind};
use crate::models::{Bar, Candle, PriceType};
use crate::state::MarketState;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running bridge.
///
/// Dropping it only signals the session and dispatch loops to stop; they
/// finish on their next poll, possibly after the handle is gone. Call
/// [`MtBridge::shutdown`] and await it when the caller must know both loops
/// have exited, e.g. before rebinding the same port or tearing down state the
/// callback captured.
pub struct MtBridge<C: Bar = Candle> {
    state:      Arc<MarketState<C>>,
    cancel:     CancellationToken,
    local_addr: SocketAddr,
    session:    Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<C: Bar> MtBridge<C> {
    /// Starts a bridge without event delivery; use the polling accessors.
    pub async fn start(config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::spawn(config, None).await
    }

    /// Starts a bridge that replays `config.history_bars` closed minutes and
    /// then streams live events into `callback`.
    ///
    /// The callback runs inline on the dispatch task; see [`EventCallback`]
    /// for what it must not do.
    pub async fn start_with_callback<F>(config: BridgeConfig, callback: F) -> Result<Self, BridgeError>
    where
        F: Fn(&BarMap<C>, EventKind, u64) + Send + Sync + 'static,
    {
        Self::spawn(config, Some(Arc::new(callback))).await
    }

    async fn spawn(config: BridgeConfig, callback: Option<EventCallback<C>>) -> Result<Self, BridgeError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(
            %local_addr,
            history_bars = config.history_bars,
            byte_order   = ?config.byte_order,
            callback     = callback.is_some(),
            "🚀 MT bridge listening"
        );

        let state = Arc::new(MarketState::new());
        let cancel = CancellationToken::new();

        let session = Session::new(
            Arc::clone(&state),
            config.byte_order,
            config.reconnect_delay,
            cancel.clone(),
        );
        let session = tokio::spawn(session.run(listener));

        let dispatcher = callback.map(|callback| {
            let dispatcher = Dispatcher::new(
                Arc::clone(&state),
                callback,
                config.history_bars,
                config.poll_interval,
                cancel.clone(),
            );
            tokio::spawn(dispatcher.run())
        });

        Ok(Self {
            state,
            cancel,
            local_addr,
            session: Some(session),
            dispatcher,
        })
    }

    /// Signals both loops to stop and waits until they have exited.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for handle in [self.session.take(), self.dispatcher.take()].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Bridge task ended abnormally");
            }
        }
        info!("MT bridge stopped");
    }

    /// Waits until the first session is live or has failed. `true` if live.
    pub async fn wait(&self) -> bool {
        while !self.state.error() && !self.state.connected() {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
        self.state.connected()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    // ── Connection state ──────────────────────────────────────────────────────

    pub fn connected(&self) -> bool {
        self.state.connected()
    }

    /// `true` after a session failed, until the next one goes live.
    pub fn error(&self) -> bool {
        self.state.error()
    }

    /// Last server timestamp received, in seconds.
    pub fn get_server_timestamp(&self) -> u64 {
        self.state.server_timestamp()
    }

    /// Projected server clock with sub-second precision.
    pub fn server_time(&self) -> f64 {
        self.state.server_time()
    }

    /// Expert protocol version; `0` before any handshake.
    pub fn get_mt_bridge_version(&self) -> u32 {
        self.state.version()
    }

    pub fn history_depth(&self) -> u32 {
        self.state.history_depth()
    }

    pub fn instrument_count(&self) -> usize {
        if !self.connected() {
            return 0;
        }
        self.state.instrument_count()
    }

    pub fn get_symbol_list(&self) -> Vec<String> {
        if !self.connected() {
            return Vec::new();
        }
        self.state.symbol_list()
    }

    // ── Quotes ────────────────────────────────────────────────────────────────

    /// `(bid, ask)`, zeroed when there is no data.
    pub fn get_tick(&self, index: usize) -> (f64, f64) {
        if !self.connected() {
            return (0.0, 0.0);
        }
        self.state
            .tick(index)
            .map(|t| (t.bid, t.ask))
            .unwrap_or((0.0, 0.0))
    }

    pub fn get_bid(&self, index: usize) -> f64 {
        self.get_tick(index).0
    }

    pub fn get_ask(&self, index: usize) -> f64 {
        self.get_tick(index).1
    }

    // ── Bars ──────────────────────────────────────────────────────────────────

    /// Last bar minus `offset` positions back.
    pub fn get_candle(&self, index: usize, offset: usize) -> C {
        if !self.connected() {
            return C::default();
        }
        self.state.candle(index, offset).unwrap_or_default()
    }

    pub fn get_candle_by_name(&self, name: &str, offset: usize) -> C {
        self.resolve(name)
            .map(|i| self.get_candle(i, offset))
            .unwrap_or_default()
    }

    /// Snapshot copy of the whole stored history.
    pub fn get_candles(&self, index: usize) -> Vec<C> {
        if !self.connected() {
            return Vec::new();
        }
        self.state.candles(index).unwrap_or_default()
    }

    pub fn get_candles_by_name(&self, name: &str) -> Vec<C> {
        self.resolve(name)
            .map(|i| self.get_candles(i))
            .unwrap_or_default()
    }

    /// Bar for `timestamp`'s minute. While that minute is still open (the
    /// last stored bar is the minute before) a flat bar at the current
    /// `price_type` quote is returned instead.
    pub fn get_candle_at(&self, index: usize, timestamp: u64, price_type: PriceType) -> C {
        if !self.connected() {
            return C::default();
        }
        self.state
            .candle_at(index, timestamp, price_type)
            .unwrap_or_default()
    }

    pub fn get_candle_at_by_name(&self, name: &str, timestamp: u64, price_type: PriceType) -> C {
        self.resolve(name)
            .map(|i| self.get_candle_at(i, timestamp, price_type))
            .unwrap_or_default()
    }

    /// As-of-`timestamp` bid bar for every instrument.
    pub fn candles_at(&self, timestamp: u64) -> BarMap<C> {
        if !self.connected() {
            return BarMap::new();
        }
        self.state.candles_at(timestamp, PriceType::Bid)
    }

    /// Looks `name` up in an event map; missing or empty entries come back
    /// as the default sentinel.
    pub fn pick(name: &str, bars: &BarMap<C>) -> C {
        bars.get(name)
            .filter(|bar| bar.is_valid())
            .cloned()
            .unwrap_or_default()
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        if !self.connected() {
            return None;
        }
        self.state.index_of(name)
    }
}

impl<C: Bar> Drop for MtBridge<C> {
    fn drop(&mut self) {
        // tasks notice on their next poll; use `shutdown` to wait for them
        self.cancel.cancel();
    }
}

// ─── ServerTimestampWatcher ───────────────────────────────────────────────────

/// Reports whether the server timestamp moved since this watcher last looked.
///
/// Each consumer owns its own watcher, so several of them can poll the same
/// bridge independently.
#[derive(Debug, Default)]
pub struct ServerTimestampWatcher {
    last_seen: u64,
}

impl ServerTimestampWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<C: Bar>(&mut self, bridge: &MtBridge<C>) -> bool {
        if !bridge.connected() {
            return false;
        }
        let current = bridge.get_server_timestamp();
        if current == self.last_seen {
            return false;
        }
        self.last_seen = current;
        true
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::tests::{wait_until, Frames, Record};
    use crate::models::minute_floor;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    fn local_config(history_bars: u32) -> BridgeConfig {
        BridgeConfig::new(0, history_bars)
            .with_bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_reconnect_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn accessors_return_sentinels_before_connect() {
        let bridge = MtBridge::<Candle>::start(local_config(10)).await.unwrap();

        assert!(!bridge.connected());
        assert_eq!(bridge.get_tick(0), (0.0, 0.0));
        assert!(!bridge.get_candle(0, 0).is_valid());
        assert!(bridge.get_candles_by_name("EURUSD").is_empty());
        assert!(bridge.get_symbol_list().is_empty());
        assert_eq!(bridge.get_mt_bridge_version(), 0);

        tokio::time::timeout(Duration::from_secs(5), bridge.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn shutdown_returns_after_the_listener_is_released() {
        let bridge = MtBridge::<Candle>::start_with_callback(local_config(5), |_: &BarMap<Candle>, _, _| {})
            .await
            .unwrap();
        let addr = bridge.local_addr();

        tokio::time::timeout(Duration::from_secs(5), bridge.shutdown())
            .await
            .expect("shutdown hung");

        // the session loop owned the listener, so the port is free again
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn end_to_end_handshake_backlog_and_live_events() {
        let log: Arc<Mutex<Vec<(EventKind, u64, BarMap<Candle>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let bridge = MtBridge::<Candle>::start_with_callback(local_config(3), move |bars: &BarMap<Candle>, kind, ts| {
            sink.lock().push((kind, ts, bars.clone()));
        })
        .await
        .unwrap();

        let now = chrono::Utc::now().timestamp() as u64;
        let m = minute_floor(now);

        let mut producer = TcpStream::connect(bridge.local_addr()).await.unwrap();
        producer
            .write_all(&Frames::handshake(1, &["EURUSD", "AUDCAD"], 1))
            .await
            .unwrap();
        producer
            .write_all(&Frames::batch(&[Record::new(1.10, m - 120), Record::new(0.90, m - 120)], now))
            .await
            .unwrap();
        wait_until(|| bridge.get_server_timestamp() == now).await;
        assert!(!bridge.connected());

        producer
            .write_all(&Frames::batch(&[Record::new(1.20, m - 60), Record::new(0.95, m - 60)], now))
            .await
            .unwrap();
        assert!(bridge.wait().await);

        assert_eq!(bridge.get_symbol_list(), vec!["EURUSD", "AUDCAD"]);
        assert_eq!(bridge.get_mt_bridge_version(), 1);
        assert_eq!(bridge.get_bid(0), 1.20);
        assert_eq!(bridge.get_candles(0).len(), 2);
        assert_eq!(bridge.get_candle_by_name("AUDCAD", 1).close, 0.90);

        // open minute → flat bar from the live quote
        let flat = bridge.get_candle_at(0, m, PriceType::Bid);
        assert_eq!(flat.close, 1.20);
        assert_eq!(flat.timestamp, m);
        assert_eq!(flat.volume, 0.0);

        // backlog: three closed minutes ending one before the server minute
        wait_until(|| log.lock().len() >= 3).await;
        {
            let log = log.lock();
            let stamps: Vec<u64> = log.iter().take(3).map(|(_, ts, _)| *ts).collect();
            assert_eq!(stamps, vec![m - 180, m - 120, m - 60]);
            assert!(log.iter().take(3).all(|(k, _, _)| *k == EventKind::HistoricalDataReceived));
            assert_eq!(MtBridge::<Candle>::pick("EURUSD", &log[2].2).close, 1.20);
            assert!(!MtBridge::<Candle>::pick("EURUSD", &log[0].2).is_valid());
        }

        // live: projected clock ticks over within a couple of seconds
        wait_until(|| log.lock().iter().any(|(k, _, _)| *k == EventKind::NewTick)).await;

        tokio::time::timeout(Duration::from_secs(5), bridge.shutdown())
            .await
            .expect("shutdown hung");
    }

    #[tokio::test]
    async fn reconnect_rebuilds_state() {
        let bridge = MtBridge::<Candle>::start(local_config(0)).await.unwrap();
        let mut watcher = ServerTimestampWatcher::new();

        let mut first = TcpStream::connect(bridge.local_addr()).await.unwrap();
        first.write_all(&Frames::handshake(1, &["EURUSD"], 0)).await.unwrap();
        first.write_all(&Frames::batch(&[Record::new(1.1, 60)], 90)).await.unwrap();
        assert!(bridge.wait().await);
        assert!(watcher.poll(&bridge));
        assert!(!watcher.poll(&bridge));

        drop(first);
        wait_until(|| !bridge.connected() && bridge.error()).await;
        assert!(!watcher.poll(&bridge));

        let mut second = TcpStream::connect(bridge.local_addr()).await.unwrap();
        second.write_all(&Frames::handshake(1, &["USDJPY", "EURUSD"], 0)).await.unwrap();
        second
            .write_all(&Frames::batch(&[Record::new(150.0, 120), Record::new(1.2, 120)], 150))
            .await
            .unwrap();
        wait_until(|| bridge.connected()).await;

        assert!(!bridge.error());
        assert_eq!(bridge.get_symbol_list(), vec!["USDJPY", "EURUSD"]);
        assert_eq!(bridge.get_candles_by_name("EURUSD").len(), 1);
        assert_eq!(bridge.get_candle_by_name("EURUSD", 0).close, 1.2);
        assert!(watcher.poll(&bridge));

        bridge.shutdown().await;
    }
}
