//! # engine::session
//!
//! **Session loop**: owns the one producer connection at a time.
//!
//! ```text
//! LISTENING ──accept──▶ HANDSHAKING ──▶ STREAMING ──read error──▶ FAILED
//!     ▲                                                              │
//!     └────────────────────── back-off sleep ◀───────────────────────┘
//! ```
//!
//! 1. Accept exactly one peer; later producers wait in the listen backlog.
//! 2. Handshake: wipe the market state, read version / instrument names /
//!    history depth, size every region.
//! 3. Stream record batches forever. The first `history_depth` batches are
//!    backlog; only after that does the bridge report `connected()`.
//! 4. Any read failure drops the connection, flags `error()`, sleeps, and
//!    goes back to listening. State is left frozen until the next handshake.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ByteOrder;
use crate::engine::candle_builder::Assembled;
use crate::engine::clock::{local_now, ServerClockTracker};
use crate::error::BridgeError;
use crate::models::{Bar, Tick};
use crate::state::MarketState;
use crate::wire::WireReader;

/// Newest protocol version this bridge understands.
pub const MAX_PROTOCOL_VERSION: u32 = 1;

/// Upper bound on the capacity reserved for the instrument list before the
/// names are actually read.
const MAX_PREALLOCATED_INSTRUMENTS: usize = 1024;

pub struct Session<C: Bar> {
    state:           Arc<MarketState<C>>,
    byte_order:      ByteOrder,
    reconnect_delay: Duration,
    cancel:          CancellationToken,
    /// Survives reconnects so the offset estimate keeps its history.
    clock:           ServerClockTracker,
}

impl<C: Bar> Session<C> {
    pub fn new(
        state: Arc<MarketState<C>>,
        byte_order: ByteOrder,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            byte_order,
            reconnect_delay,
            cancel,
            clock: ServerClockTracker::new(),
        }
    }

    /// Accept → handshake → stream → back-off, until cancelled.
    pub async fn run(mut self, listener: TcpListener) {
        let cancel = self.cancel.clone();

        while !cancel.is_cancelled() {
            // ── LISTENING ─────────────────────────────────────────────────────
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let outcome = match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "📡 Terminal connected");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "set_nodelay failed");
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        outcome = self.drive(stream) => outcome,
                    }
                }
                Err(e) => Err(BridgeError::Io(e)),
            };

            // ── FAILED ────────────────────────────────────────────────────────
            if let Err(e) = outcome {
                self.state.set_connected(false);
                self.state.set_error(true);
                warn!(
                    error = %e,
                    retry_in = ?self.reconnect_delay,
                    "❌ Session ended, waiting for the terminal to reconnect"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.reconnect_delay) => {}
                }
            }
        }

        self.state.set_connected(false);
        info!("Session loop stopped");
    }

    /// Runs one connection from handshake until it fails or the loop is
    /// cancelled (`Ok`).
    pub async fn drive<R: AsyncRead + Unpin>(&mut self, stream: R) -> Result<(), BridgeError> {
        let mut wire = WireReader::new(stream, self.byte_order);

        // ── HANDSHAKING ───────────────────────────────────────────────────────
        self.state.reset();

        let version = wire.read_u32().await?;
        self.state.set_version(version);
        if version > MAX_PROTOCOL_VERSION {
            error!(version, max = MAX_PROTOCOL_VERSION, "Unsupported terminal expert version");
            return Err(BridgeError::UnsupportedVersion {
                found: version,
                max: MAX_PROTOCOL_VERSION,
            });
        }

        let count = wire.read_u32().await? as usize;
        let mut names = Vec::with_capacity(count.min(MAX_PREALLOCATED_INSTRUMENTS));
        for _ in 0..count {
            names.push(wire.read_string().await?);
        }
        debug!(?names, "Instrument list received");
        self.state.install_instruments(names);

        let history_depth = wire.read_u32().await?;
        self.state.set_history_depth(history_depth);

        info!(version, instruments = count, history_depth, "🤝 Handshake complete");

        // ── STREAMING ─────────────────────────────────────────────────────────
        let mut batches: u64 = 0;
        while !self.cancel.is_cancelled() {
            for index in 0..count {
                let bid    = wire.read_f64().await?;
                let ask    = wire.read_f64().await?;
                let open   = wire.read_f64().await?;
                let high   = wire.read_f64().await?;
                let low    = wire.read_f64().await?;
                let close  = wire.read_f64().await?;
                let volume = wire.read_u64().await?;
                let timestamp = wire.read_u64().await?;

                let bar = C::new(open, high, low, close, volume as f64, timestamp);
                if let Some(Assembled::Dropped) =
                    self.state.apply_record(index, Tick::new(bid, ask, timestamp), bar)
                {
                    debug!(index, timestamp, "Out-of-order bar dropped");
                }
            }

            let server_timestamp = wire.read_u64().await?;
            self.state.set_server_timestamp(server_timestamp);
            if let Some(offset) = self.clock.observe(server_timestamp, local_now()) {
                self.state.set_offset(offset);
                debug!(server_timestamp, offset, "Server clock offset updated");
            }

            batches += 1;
            if batches > history_depth as u64 && !self.state.connected() {
                self.state.set_error(false);
                self.state.set_connected(true);
                info!(batches, "✅ Backlog consumed, bridge is live");
            }
        }

        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
