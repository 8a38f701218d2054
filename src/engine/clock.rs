//! # engine::clock
//!
//! Server-clock offset estimator.
//!
//! The terminal only reports its time once per batch, and mostly at minute
//! resolution. Keeping a rolling mean of `server − local` over the last
//! [`OFFSET_WINDOW`] samples lets the dispatch loop project the server clock
//! at sub-second granularity between batches.

use chrono::Utc;

pub const OFFSET_WINDOW: usize = 256;

/// Local wall clock in fractional unix seconds.
pub fn local_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Fixed-capacity ring buffer with an incrementally maintained mean.
///
/// Owned by the session loop; the mean is published through
/// `MarketState::set_offset`.
#[derive(Debug, Clone)]
pub struct OffsetEstimator {
    samples: [f64; OFFSET_WINDOW],
    next: usize,
    count: usize,
    sum: f64,
}

impl OffsetEstimator {
    pub fn new() -> Self {
        Self {
            samples: [0.0; OFFSET_WINDOW],
            next: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Pushes one sample and returns the updated mean.
    pub fn push(&mut self, offset: f64) -> f64 {
        if self.count < OFFSET_WINDOW {
            self.sum += offset;
            self.count += 1;
        } else {
            self.sum += offset - self.samples[self.next];
        }
        self.samples[self.next] = offset;
        self.next = (self.next + 1) % OFFSET_WINDOW;
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for OffsetEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples the offset only when the server timestamp actually moves.
#[derive(Debug, Default)]
pub struct ServerClockTracker {
    last_server_timestamp: u64,
    estimator: OffsetEstimator,
}

impl ServerClockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new mean offset if `server_timestamp` changed.
    pub fn observe(&mut self, server_timestamp: u64, local: f64) -> Option<f64> {
        if server_timestamp == self.last_server_timestamp {
            return None;
        }
        self.last_server_timestamp = server_timestamp;
        Some(self.estimator.push(server_timestamp as f64 - local))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
