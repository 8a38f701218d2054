//! # models::candle
//!
//! One-minute OHLCV bar plus the [`Bar`] capability that lets the store, the
//! assembler and the reconstruction engine work with any record shape.

use serde::{Deserialize, Serialize};

pub const SECONDS_IN_MINUTE: u64 = 60;

/// Floors a unix timestamp (seconds) to the start of its minute.
#[inline]
pub fn minute_floor(timestamp: u64) -> u64 {
    (timestamp / SECONDS_IN_MINUTE) * SECONDS_IN_MINUTE
}

// ─── Bar ──────────────────────────────────────────────────────────────────────

/// Anything that can be stored as a per-minute bar.
///
/// `Default` must produce the empty sentinel (`close == 0`, `timestamp == 0`).
pub trait Bar: Clone + Default + Send + Sync + 'static {
    fn new(open: f64, high: f64, low: f64, close: f64, volume: f64, timestamp: u64) -> Self;

    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
    fn timestamp(&self) -> u64;

    /// Overwrites the OHLCV fields of a still-open bar, keeping its timestamp.
    fn update(&mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) {
        *self = Self::new(open, high, low, close, volume, self.timestamp());
    }

    /// `false` for the "no data" sentinel. A zero close is never a real price.
    fn is_valid(&self) -> bool {
        self.close() != 0.0 && self.timestamp() != 0
    }

    /// Flat bar at a single price, used while the current minute is unclosed.
    fn flat(price: f64, timestamp: u64) -> Self {
        Self::new(price, price, price, price, 0.0, timestamp)
    }
}

// ─── Candle ───────────────────────────────────────────────────────────────────

/// The default bar type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Seconds, minute-aligned.
    pub timestamp: u64,
}

impl Bar for Candle {
    fn new(open: f64, high: f64, low: f64, close: f64, volume: f64, timestamp: u64) -> Self {
        Self { open, high, low, close, volume, timestamp }
    }

    fn open(&self) -> f64 { self.open }
    fn high(&self) -> f64 { self.high }
    fn low(&self) -> f64 { self.low }
    fn close(&self) -> f64 { self.close }
    fn volume(&self) -> f64 { self.volume }
    fn timestamp(&self) -> u64 { self.timestamp }

    fn update(&mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) {
        self.open = open;
        self.high = high;
        self.low = low;
        self.close = close;
        self.volume = volume;
    }
}

// ─── PriceType ────────────────────────────────────────────────────────────────

/// Which side of the quote a synthesised bar is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    #[default]
    Bid,
    Ask,
    BidAskAvg,
}
