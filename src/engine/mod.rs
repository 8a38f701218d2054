//! Bridge engines: bar assembly, clock estimation, history reconstruction
//! and the two long-lived loops.

pub mod candle_builder;
pub mod clock;
pub mod dispatcher;
pub mod history;
pub mod session;
