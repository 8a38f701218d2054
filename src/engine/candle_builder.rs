//! # engine::candle_builder
//!
//! Append-or-merge policy applied to every incoming bar record.
//!
//! ```text
//! history empty, or incoming.ts >  last.ts  → append
//!                   incoming.ts == last.ts  → overwrite last in place
//!                   incoming.ts <  last.ts  → drop (feed is not strictly ordered)
//! ```

use crate::models::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembled {
    Appended,
    Merged,
    Dropped,
}

/// Applies `incoming` to one instrument's history. Only the last element is
/// ever rewritten, so timestamps stay unique and strictly increasing.
pub fn assemble<C: Bar>(history: &mut Vec<C>, incoming: C) -> Assembled {
    match history.last_mut() {
        Some(last) if incoming.timestamp() == last.timestamp() => {
            last.update(
                incoming.open(),
                incoming.high(),
                incoming.low(),
                incoming.close(),
                incoming.volume(),
            );
            Assembled::Merged
        }
        Some(last) if incoming.timestamp() < last.timestamp() => Assembled::Dropped,
        _ => {
            history.push(incoming);
            Assembled::Appended
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    fn bar(close: f64, ts: u64) -> Candle {
        Candle::new(close, close, close, close, 1.0, ts)
    }

    #[test]
    fn first_record_is_appended() {
        let mut history = Vec::new();
        assert_eq!(assemble(&mut history, bar(1.1, 100)), Assembled::Appended);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn same_timestamp_merges_into_last() {
        let mut history = Vec::new();
        assemble(&mut history, bar(1.1, 100));
        assemble(&mut history, bar(1.2, 160));
        assert_eq!(assemble(&mut history, bar(1.3, 160)), Assembled::Merged);

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].close, 1.3);
        assert_eq!(history[0].close, 1.1);
    }

    #[test]
    fn replaying_a_stored_bar_is_idempotent() {
        let mut history = Vec::new();
        assemble(&mut history, bar(1.1, 100));
        assemble(&mut history, bar(1.1, 100));
        assert_eq!(history, vec![bar(1.1, 100)]);
    }

    #[test]
    fn out_of_order_record_is_dropped() {
        let mut history = Vec::new();
        assemble(&mut history, bar(1.1, 160));
        assert_eq!(assemble(&mut history, bar(9.9, 100)), Assembled::Dropped);
        assert_eq!(history, vec![bar(1.1, 160)]);
    }

    #[test]
    fn history_stays_strictly_increasing() {
        let mut history = Vec::new();
        for ts in [60, 120, 120, 60, 180, 240, 180, 240, 300] {
            assemble(&mut history, bar(1.0, ts));
        }
        let stamps: Vec<u64> = history.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![60, 120, 180, 240, 300]);
    }
}
