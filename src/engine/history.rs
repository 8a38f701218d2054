//! # engine::history
//!
//! Rebuilds a dense, minute-spaced table of bars for an arbitrary window.
//!
//! Every slot is pre-filled with an empty bar carrying the slot's timestamp,
//! so callers always get `bars` slots with deterministic 60-second spacing no
//! matter how sparse the stored history is. A window reaching before the
//! epoch is cut at `0` and comes back shorter.

use std::collections::BTreeMap;

use crate::models::{minute_floor, Bar, SECONDS_IN_MINUTE};

/// Instrument name → bar, as delivered to the event callback.
pub type BarMap<C> = BTreeMap<String, C>;

/// One reconstructed minute.
#[derive(Debug, Clone)]
pub struct HistorySlot<C> {
    pub timestamp: u64,
    pub bars: BarMap<C>,
}

/// First slot timestamp of a `bars`-long window ending at `end`.
#[inline]
pub fn window_start(end: u64, bars: u32) -> i64 {
    minute_floor(end) as i64 - (bars.saturating_sub(1) as i64) * SECONDS_IN_MINUTE as i64
}

/// Covers `[end − (bars−1)·60, end]` (with `end` floored to the minute),
/// minus any slots before the epoch.
pub fn reconstruct<C: Bar>(
    symbols: &[String],
    candles: &[Vec<C>],
    end: u64,
    bars: u32,
) -> Vec<HistorySlot<C>> {
    let step = SECONDS_IN_MINUTE as i64;
    let wanted = window_start(end, bars);
    // `wanted` is minute-aligned, so this counts whole pre-epoch slots
    let skipped = (-wanted).max(0) / step;
    let start = wanted.max(0);
    let len = (bars as i64 - skipped).max(0);

    let mut slots: Vec<HistorySlot<C>> = (0..len)
        .map(|i| HistorySlot {
            timestamp: (start + i * step) as u64,
            bars: BarMap::new(),
        })
        .collect();

    for (name, history) in symbols.iter().zip(candles.iter()) {
        for slot in slots.iter_mut() {
            let empty = C::new(0.0, 0.0, 0.0, 0.0, 0.0, slot.timestamp);
            slot.bars.insert(name.clone(), empty);
        }
        for candle in history {
            let offset = candle.timestamp() as i64 - start;
            if offset < 0 {
                continue;
            }
            let index = offset / step;
            if index >= len {
                continue;
            }
            slots[index as usize].bars.insert(name.clone(), candle.clone());
        }
    }

    slots
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn bar(close: f64, ts: u64) -> Candle {
        Candle::new(close, close, close, close, 5.0, ts)
    }

    #[test]
    fn sixty_slots_regardless_of_sparsity() {
        let t = 1_700_000_040; // minute-aligned
        let symbols = vec!["EURUSD".to_string()];
        let candles = vec![vec![bar(1.1, t - 600)]];

        let slots = reconstruct(&symbols, &candles, t, 60);

        assert_eq!(slots.len(), 60);
        assert_eq!(slots[0].timestamp, t - 59 * 60);
        assert_eq!(slots[59].timestamp, t);
        for pair in slots.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, 60);
        }
    }

    #[test]
    fn stored_bars_land_in_their_slot_and_gaps_are_stamped() {
        let t = 6_000;
        let symbols = vec!["EURUSD".to_string(), "AUDCAD".to_string()];
        let candles = vec![
            vec![bar(1.0, t - 180), bar(1.1, t - 60), bar(1.2, t)],
            vec![],
        ];

        let slots = reconstruct(&symbols, &candles, t + 15, 3);

        assert_eq!(slots[1].bars["EURUSD"].close, 1.1);
        assert_eq!(slots[2].bars["EURUSD"].close, 1.2);
        // t-180 falls outside the window
        assert!(!slots[0].bars["EURUSD"].is_valid());
        assert_eq!(slots[0].bars["EURUSD"].timestamp, t - 120);
        assert_eq!(slots[2].bars["AUDCAD"].timestamp, t);
        assert!(!slots[2].bars["AUDCAD"].is_valid());
    }

    #[test]
    fn window_before_epoch_is_cut_short() {
        let symbols = vec!["EURUSD".to_string()];
        let candles = vec![vec![bar(1.0, 0), bar(1.5, 60)]];

        let slots = reconstruct(&symbols, &candles, 90, 5);

        let stamps: Vec<u64> = slots.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0, 60]);
        assert_eq!(slots[0].bars["EURUSD"].close, 1.0);
        assert_eq!(slots[1].bars["EURUSD"].close, 1.5);
    }

    #[test]
    fn zero_bars_yields_nothing() {
        let symbols = vec!["EURUSD".to_string()];
        let candles = vec![vec![bar(1.0, 600)]];
        assert!(reconstruct(&symbols, &candles, 600, 0).is_empty());
    }
}
