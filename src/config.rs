//! # config: bridge settings, optionally read from environment variables
//!
//! | Variable                 | Default   | Description                          |
//! |--------------------------|-----------|--------------------------------------|
//! | `MT_BRIDGE_HOST`         | `0.0.0.0` | Interface the listener binds to      |
//! | `MT_BRIDGE_PORT`         | `5555`    | TCP port the terminal connects to    |
//! | `MT_BRIDGE_HISTORY_BARS` | `1440`    | Bars replayed as backlog on connect  |
//! | `MT_BRIDGE_RECONNECT_MS` | `1000`    | Back-off after a failed session      |
//! | `MT_BRIDGE_POLL_MS`      | `1`       | Dispatch loop polling interval       |
//! | `MT_BRIDGE_BYTE_ORDER`   | `le`      | Scalar byte order of the producer    |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_HISTORY_BARS: u32 = 1440;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Byte order of every multi-byte scalar on the wire.
///
/// The terminal writes its native layout with no negotiation, so this has to
/// match the producer platform. MetaTrader runs on x86, hence `Little`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl std::str::FromStr for ByteOrder {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "le" | "little" => Ok(ByteOrder::Little),
            "be" | "big" => Ok(ByteOrder::Big),
            other => Err(BridgeError::Config(format!(
                "unknown byte order '{other}', use 'le' or 'be'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_host: IpAddr,
    /// `0` lets the OS pick a port; see `MtBridge::local_addr`.
    pub port: u16,
    /// Bars delivered as `HISTORICAL_DATA_RECEIVED` before live events start.
    pub history_bars: u32,
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub byte_order: ByteOrder,
}

impl BridgeConfig {
    pub fn new(port: u16, history_bars: u32) -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            history_bars,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            byte_order: ByteOrder::Little,
        }
    }

    pub fn from_env() -> Result<Self, BridgeError> {
        let bind_host = match std::env::var("MT_BRIDGE_HOST") {
            Ok(raw) => raw
                .parse::<IpAddr>()
                .map_err(|_| BridgeError::Config(format!("MT_BRIDGE_HOST '{raw}' is not an IP address")))?,
            Err(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let byte_order = match std::env::var("MT_BRIDGE_BYTE_ORDER") {
            Ok(raw) => raw.parse()?,
            Err(_) => ByteOrder::Little,
        };

        Ok(Self {
            bind_host,
            port:            env_parse("MT_BRIDGE_PORT", DEFAULT_PORT)?,
            history_bars:    env_parse("MT_BRIDGE_HISTORY_BARS", DEFAULT_HISTORY_BARS)?,
            reconnect_delay: env_millis("MT_BRIDGE_RECONNECT_MS", DEFAULT_RECONNECT_DELAY)?,
            poll_interval:   env_millis("MT_BRIDGE_POLL_MS", DEFAULT_POLL_INTERVAL)?,
            byte_order,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_HISTORY_BARS)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, BridgeError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BridgeError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, BridgeError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    env_parse(key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_parses_short_and_long_forms() {
        assert_eq!("le".parse::<ByteOrder>().unwrap(), ByteOrder::Little);
        assert_eq!(" Big ".parse::<ByteOrder>().unwrap(), ByteOrder::Big);
        assert!("middle".parse::<ByteOrder>().is_err());
    }

    #[test]
    fn new_uses_documented_defaults() {
        let cfg = BridgeConfig::new(7000, 10);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:7000".parse().unwrap());
        assert_eq!(cfg.history_bars, 10);
        assert_eq!(cfg.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(cfg.byte_order, ByteOrder::Little);
    }

    #[test]
    fn env_millis_falls_back_to_the_default_durations() {
        let key = "MT_BRIDGE_TEST_UNSET_MS";
        assert_eq!(env_millis(key, DEFAULT_RECONNECT_DELAY).unwrap(), DEFAULT_RECONNECT_DELAY);
        assert_eq!(env_millis(key, DEFAULT_POLL_INTERVAL).unwrap(), DEFAULT_POLL_INTERVAL);
    }
}
