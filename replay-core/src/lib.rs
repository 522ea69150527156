//! Replay core engine.
//!
//! Domain types, feed cursors, the minute-tick scheduler, and the portfolio
//! state machine, plus the traits that strategies, allocators, brokers, and
//! data stores implement. All I/O lives outside this crate; the engine only
//! walks pre-materialized candle feeds.

pub mod cancel;
pub mod data;
pub mod domain;
pub mod engine;
