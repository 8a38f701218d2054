//! # events
//!
//! Defines [`EventKind`] and the callback through which the dispatch loop
//! delivers every event. The callback is only ever invoked from the dispatch
//! task, one event at a time, in causal order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use crate::engine::history::BarMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Projected server clock ticked into a new second; the map holds every
    /// instrument's as-of-now bar.
    NewTick,
    /// A closed minute, either from the backlog replay or a live backfill.
    HistoricalDataReceived,
}

/// `(instrument → bar, kind, timestamp)`.
///
/// Invoked synchronously on a tokio worker thread. It must return quickly and
/// must not block: a slow callback stalls every later event and, during a
/// long backlog replay, ties up that worker for the whole window. Hand heavy
/// work off to a channel or `tokio::task::spawn_blocking`. Calling the
/// bridge's accessors from inside it is fine.
pub type EventCallback<C> = Arc<dyn Fn(&BarMap<C>, EventKind, u64) + Send + Sync>;

/// Borrowed view of one callback invocation, for logging and forwarding.
#[derive(Debug, Serialize)]
pub struct MarketEvent<'a, C: Serialize> {
    pub event: EventKind,
    pub timestamp: u64,
    pub bars: &'a BarMap<C>,
}

impl<'a, C: Serialize> MarketEvent<'a, C> {
    pub fn new(bars: &'a BarMap<C>, event: EventKind, timestamp: u64) -> Self {
        Self { event, timestamp, bars }
    }

    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
