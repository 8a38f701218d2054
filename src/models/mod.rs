//! Domain models shared across the bridge.

pub mod candle;
pub mod tick;

pub use candle::{minute_floor, Bar, Candle, PriceType, SECONDS_IN_MINUTE};
pub use tick::Tick;
