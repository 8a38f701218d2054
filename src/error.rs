//! # error
//!
//! Centralised bridge error type.
//!
//! Only construction (bind) and configuration failures ever reach a caller.
//! Transport and protocol errors are consumed by the session loop, which
//! resets the market state and goes back to listening; consumers observe them
//! solely through `connected()` / `error()`.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The producer closed the socket, or a fixed-width field was cut short.
    #[error("Peer disconnected")]
    Disconnected,

    /// Any other socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The producer announced a protocol version newer than we understand.
    #[error("Unsupported bridge protocol version {found} (max supported {max})")]
    UnsupportedVersion { found: u32, max: u32 },

    /// The listener could not be bound.
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// An environment variable held a value we cannot use.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// Folds a raw read error into the taxonomy: a short read is a disconnect.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => BridgeError::Disconnected,
            _ => BridgeError::Io(err),
        }
    }
}
