//! # models::tick
//!
//! Latest quote per instrument, overwritten on every record batch.

use serde::{Deserialize, Serialize};

use super::candle::PriceType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    /// Timestamp of the bar this quote arrived with.
    pub timestamp: u64,
}

impl Tick {
    pub fn new(bid: f64, ask: f64, timestamp: u64) -> Self {
        Self { bid, ask, timestamp }
    }

    #[inline]
    pub fn price(&self, price_type: PriceType) -> f64 {
        match price_type {
            PriceType::Bid       => self.bid,
            PriceType::Ask       => self.ask,
            PriceType::BidAskAvg => (self.bid + self.ask) / 2.0,
        }
    }
}
