//! # engine::dispatcher
//!
//! **Event dispatch loop**: the second long-lived task, started only when a
//! callback was supplied.
//!
//! ## Phases
//! ```text
//! 1. Wait       → poll until the session reports connected (or stop)
//! 2. Backlog    → replay `history_bars` closed minutes ending one minute
//!                 before the server minute; repeat for any minutes that
//!                 closed while replaying, until caught up
//! 3. Live       → every time the projected server clock enters a new second:
//!                   a. if minutes closed since the last pass, emit one
//!                      HISTORICAL_DATA_RECEIVED per closed minute (oldest first)
//!                   b. emit NEW_TICK with every instrument's as-of-now bar
//!                 paused (not exited) while disconnected
//! ```
//!
//! Events are emitted from this task only, so per-instrument timestamps are
//! non-decreasing across the whole stream. Backfill is never skipped, only
//! redundant reconstruction is.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{EventCallback, EventKind};
use crate::models::{minute_floor, Bar, PriceType, SECONDS_IN_MINUTE};
use crate::state::MarketState;

/// Last minute fully closed as of `server_timestamp`.
#[inline]
fn closed_minute_end(server_timestamp: u64) -> u64 {
    minute_floor(server_timestamp).saturating_sub(SECONDS_IN_MINUTE)
}

/// Where the live phase stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveCursor {
    /// Last second a NEW_TICK was emitted for.
    pub last_timestamp: u64,
    /// Minute (`ts / 60`) whose bar is the oldest not yet backfilled.
    pub last_minute: u64,
}

impl LiveCursor {
    /// Cursor resuming right after a replay that ended at `replayed_end`.
    pub fn after_replay(replayed_end: u64, now: u64) -> Self {
        Self {
            last_timestamp: now,
            last_minute: replayed_end / SECONDS_IN_MINUTE + 1,
        }
    }
}

pub struct Dispatcher<C: Bar> {
    state:         Arc<MarketState<C>>,
    callback:      EventCallback<C>,
    history_bars:  u32,
    poll_interval: Duration,
    cancel:        CancellationToken,
}

impl<C: Bar> Dispatcher<C> {
    pub fn new(
        state: Arc<MarketState<C>>,
        callback: EventCallback<C>,
        history_bars: u32,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            callback,
            history_bars,
            poll_interval,
            cancel,
        }
    }

    pub async fn run(self) {
        // ── 1. Wait for the first live session ───────────────────────────────
        while !self.state.connected() {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        // ── 2. Backlog ────────────────────────────────────────────────────────
        let replayed_end = self.replay_backlog();
        info!(replayed_end, "📜 Backlog replay finished, streaming live events");

        // ── 3. Live ───────────────────────────────────────────────────────────
        let mut cursor = LiveCursor::after_replay(replayed_end, self.server_now());
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if !self.state.connected() {
                continue;
            }
            self.advance(&mut cursor, self.server_now());
        }

        debug!("Dispatch loop stopped");
    }

    /// Projected server clock, whole seconds.
    fn server_now(&self) -> u64 {
        self.state.server_time().max(0.0) as u64
    }

    /// Emits the backlog and any minutes that closed meanwhile. Returns the
    /// timestamp of the last replayed slot.
    pub fn replay_backlog(&self) -> u64 {
        let mut bars = self.history_bars;
        let mut end = closed_minute_end(self.state.server_timestamp());

        while !self.cancel.is_cancelled() {
            let slots = self.state.reconstruct(end, bars);
            debug!(end, bars = slots.len(), "Replaying history window");
            for slot in &slots {
                (self.callback)(&slot.bars, EventKind::HistoricalDataReceived, slot.timestamp);
            }

            let latest = closed_minute_end(self.state.server_timestamp());
            if latest <= end {
                break;
            }
            bars = u32::try_from((latest - end) / SECONDS_IN_MINUTE).unwrap_or(u32::MAX);
            end = latest;
        }

        end
    }

    /// One live-phase step at server time `now`. Returns `true` if anything
    /// was emitted.
    pub fn advance(&self, cursor: &mut LiveCursor, now: u64) -> bool {
        if now <= cursor.last_timestamp {
            return false;
        }
        cursor.last_timestamp = now;

        let minute = now / SECONDS_IN_MINUTE;
        if minute > cursor.last_minute {
            let closed = u32::try_from(minute - cursor.last_minute).unwrap_or(u32::MAX);
            cursor.last_minute = minute;

            let end = minute * SECONDS_IN_MINUTE - SECONDS_IN_MINUTE;
            for slot in self.state.reconstruct(end, closed) {
                (self.callback)(&slot.bars, EventKind::HistoricalDataReceived, slot.timestamp);
            }
            debug!(closed, end, "Backfilled closed minutes");
        }

        let snapshot = self.state.candles_at(now, PriceType::Bid);
        (self.callback)(&snapshot, EventKind::NewTick, now);
        true
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
