//! # state
//!
//! The bridge's **shared market state**: written by the session loop, read
//! by the dispatch loop and by any consumer thread through `MtBridge`.
//!
//! ## Regions
//!
//! Three independently locked regions, each a `parking_lot::RwLock`:
//!
//! | Region    | Contents                                  |
//! |-----------|-------------------------------------------|
//! | `symbols` | instrument names and the name → index map |
//! | `ticks`   | latest bid / ask per instrument           |
//! | `candles` | ordered bar history per instrument        |
//!
//! No lock is ever held across an `.await` or taken while another region's
//! lock is held. A reader combining two regions (e.g. the synthetic
//! as-of-now bar) may therefore see them at slightly different instants;
//! that staleness is accepted.
//!
//! Connection flags, the server timestamp and the clock offset are plain
//! atomics with a single writer (the session loop).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::engine::candle_builder::{assemble, Assembled};
use crate::engine::clock::local_now;
use crate::engine::history::{self, BarMap, HistorySlot};
use crate::models::{minute_floor, Bar, PriceType, Tick, SECONDS_IN_MINUTE};

// ─── SymbolTable ──────────────────────────────────────────────────────────────

/// Name ↔ index mapping, valid for one connection only.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ─── MarketState ──────────────────────────────────────────────────────────────

pub struct MarketState<C: Bar> {
    symbols: RwLock<SymbolTable>,
    ticks:   RwLock<Vec<Tick>>,
    candles: RwLock<Vec<Vec<C>>>,

    connected:        AtomicBool,
    error:            AtomicBool,
    version:          AtomicU32,
    history_depth:    AtomicU32,
    server_timestamp: AtomicU64,
    /// f64 bits of the mean server − local offset, in seconds.
    offset_bits:      AtomicU64,
}

impl<C: Bar> MarketState<C> {
    pub fn new() -> Self {
        Self {
            symbols:          RwLock::new(SymbolTable::default()),
            ticks:            RwLock::new(Vec::new()),
            candles:          RwLock::new(Vec::new()),
            connected:        AtomicBool::new(false),
            error:            AtomicBool::new(false),
            version:          AtomicU32::new(0),
            history_depth:    AtomicU32::new(0),
            server_timestamp: AtomicU64::new(0),
            offset_bits:      AtomicU64::new(0f64.to_bits()),
        }
    }

    // ── Session-loop writers ──────────────────────────────────────────────────

    /// Wipes every region at the start of a connection attempt.
    pub fn reset(&self) {
        *self.symbols.write() = SymbolTable::default();
        self.candles.write().clear();
        self.ticks.write().clear();
    }

    /// Installs the handshake's instrument list and sizes every region to it.
    pub fn install_instruments(&self, names: Vec<String>) {
        let n = names.len();
        {
            let mut ticks = self.ticks.write();
            ticks.clear();
            ticks.resize(n, Tick::default());
        }
        {
            let mut candles = self.candles.write();
            candles.clear();
            candles.resize_with(n, Vec::new);
        }
        *self.symbols.write() = SymbolTable::new(names);
    }

    /// Stores one instrument's record: quote overwrite, then bar assembly.
    pub fn apply_record(&self, index: usize, tick: Tick, bar: C) -> Option<Assembled> {
        if let Some(slot) = self.ticks.write().get_mut(index) {
            *slot = tick;
        }
        let mut candles = self.candles.write();
        candles.get_mut(index).map(|history| assemble(history, bar))
    }

    pub fn set_version(&self, version: u32) {
        self.version.store(version, Ordering::Release);
    }

    pub fn set_history_depth(&self, depth: u32) {
        self.history_depth.store(depth, Ordering::Release);
    }

    pub fn set_server_timestamp(&self, timestamp: u64) {
        self.server_timestamp.store(timestamp, Ordering::Release);
    }

    pub fn set_offset(&self, offset: f64) {
        self.offset_bits.store(offset.to_bits(), Ordering::Release);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn set_error(&self, error: bool) {
        self.error.store(error, Ordering::Release);
    }

    // ── Scalars ───────────────────────────────────────────────────────────────

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    pub fn history_depth(&self) -> u32 {
        self.history_depth.load(Ordering::Acquire)
    }

    pub fn server_timestamp(&self) -> u64 {
        self.server_timestamp.load(Ordering::Acquire)
    }

    pub fn offset(&self) -> f64 {
        f64::from_bits(self.offset_bits.load(Ordering::Acquire))
    }

    /// Projected server clock: local wall clock plus the mean offset.
    pub fn server_time(&self) -> f64 {
        local_now() + self.offset()
    }

    // ── Region readers ────────────────────────────────────────────────────────

    pub fn instrument_count(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn symbol_list(&self) -> Vec<String> {
        self.symbols.read().names().to_vec()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.symbols.read().index_of(name)
    }

    pub fn tick(&self, index: usize) -> Option<Tick> {
        self.ticks.read().get(index).copied()
    }

    /// Last bar minus `offset` positions back.
    pub fn candle(&self, index: usize, offset: usize) -> Option<C> {
        let candles = self.candles.read();
        let history = candles.get(index)?;
        let pos = history.len().checked_sub(offset.checked_add(1)?)?;
        history.get(pos).cloned()
    }

    pub fn candles(&self, index: usize) -> Option<Vec<C>> {
        self.candles.read().get(index).cloned()
    }

    /// Stored bar for `timestamp`'s minute, or a flat bar from the current
    /// quote when that minute is exactly one past the last stored bar.
    pub fn candle_at(&self, index: usize, timestamp: u64, price_type: PriceType) -> Option<C> {
        let minute = minute_floor(timestamp);
        {
            let candles = self.candles.read();
            let history = candles.get(index)?;
            let last = history.last()?;
            if Some(last.timestamp()) != minute.checked_sub(SECONDS_IN_MINUTE) {
                return history
                    .binary_search_by_key(&minute, |c| c.timestamp())
                    .ok()
                    .map(|pos| history[pos].clone());
            }
        }
        // bar for `minute` has not been produced yet
        let tick = self.tick(index)?;
        Some(C::flat(tick.price(price_type), minute))
    }

    /// As-of-`timestamp` bar for every instrument, keyed by name.
    pub fn candles_at(&self, timestamp: u64, price_type: PriceType) -> BarMap<C> {
        let names = self.symbol_list();
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let bar = self.candle_at(i, timestamp, price_type).unwrap_or_default();
                (name, bar)
            })
            .collect()
    }

    /// Dense window of `bars` minutes ending at `end`.
    pub fn reconstruct(&self, end: u64, bars: u32) -> Vec<HistorySlot<C>> {
        let names = self.symbol_list();
        let candles = self.candles.read();
        history::reconstruct(&names, &candles, end, bars)
    }
}

impl<C: Bar> Default for MarketState<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn bar(close: f64, ts: u64) -> Candle {
        Candle::new(close, close + 0.1, close - 0.1, close, 3.0, ts)
    }

    fn seeded() -> MarketState<Candle> {
        let state = MarketState::new();
        state.install_instruments(vec!["EURUSD".into(), "AUDCAD".into()]);
        state.apply_record(0, Tick::new(1.10, 1.12, 120), bar(1.0, 60));
        state.apply_record(0, Tick::new(1.20, 1.22, 120), bar(1.1, 120));
        state
    }

    #[test]
    fn install_sizes_all_regions() {
        let state = seeded();
        assert_eq!(state.instrument_count(), 2);
        assert_eq!(state.symbol_list(), vec!["EURUSD", "AUDCAD"]);
        assert_eq!(state.index_of("AUDCAD"), Some(1));
        assert_eq!(state.tick(1), Some(Tick::default()));
        assert_eq!(state.candles(1), Some(vec![]));
    }

    #[test]
    fn candle_offset_counts_back_from_last() {
        let state = seeded();
        assert_eq!(state.candle(0, 0).unwrap().close, 1.1);
        assert_eq!(state.candle(0, 1).unwrap().close, 1.0);
        assert!(state.candle(0, 2).is_none());
        assert!(state.candle(5, 0).is_none());
    }

    #[test]
    fn candle_at_matches_stored_minute() {
        let state = seeded();
        let c = state.candle_at(0, 75, PriceType::Bid).unwrap();
        assert_eq!(c.close, 1.0);
        assert_eq!(c.timestamp, 60);
    }

    #[test]
    fn candle_at_one_minute_ahead_is_flat_from_tick() {
        let state = seeded();
        let c = state.candle_at(0, 185, PriceType::Ask).unwrap();
        assert_eq!(c.timestamp, 180);
        assert_eq!(c.close, 1.22);
        assert_eq!(c.open, 1.22);
        assert_eq!(c.volume, 0.0);

        let avg = state.candle_at(0, 180, PriceType::BidAskAvg).unwrap();
        assert!((avg.close - 1.21).abs() < 1e-12);
    }

    #[test]
    fn candle_at_older_than_history_is_absent() {
        let state = seeded();
        assert!(state.candle_at(0, 0, PriceType::Bid).is_none());
        assert!(state.candle_at(0, 30, PriceType::Bid).is_none());
        // two minutes ahead is not synthesised either
        assert!(state.candle_at(0, 240, PriceType::Bid).is_none());
        // no history at all
        assert!(state.candle_at(1, 120, PriceType::Bid).is_none());
    }

    #[test]
    fn candles_at_fills_every_instrument() {
        let state = seeded();
        let map = state.candles_at(120, PriceType::Bid);
        assert_eq!(map.len(), 2);
        assert_eq!(map["EURUSD"].close, 1.1);
        assert!(!map["AUDCAD"].is_valid());
    }

    #[test]
    fn reset_clears_regions_but_keeps_scalars() {
        let state = seeded();
        state.set_server_timestamp(500);
        state.reset();
        assert_eq!(state.instrument_count(), 0);
        assert!(state.tick(0).is_none());
        assert!(state.candles(0).is_none());
        assert_eq!(state.server_timestamp(), 500);
    }

    #[test]
    fn offset_roundtrips_through_atomic_bits() {
        let state = MarketState::<Candle>::new();
        state.set_offset(-12.75);
        assert_eq!(state.offset(), -12.75);
    }
}
