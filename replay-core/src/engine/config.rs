//! Run configuration: instruments, the execution feed, and the portfolio.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Interval};

/// One pre-materialized candle sequence for a (ticker, interval) pair.
///
/// Candles are strictly increasing in timestamp once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeFeed {
    pub interval: Interval,
    pub candles: Vec<Candle>,
}

impl TimeframeFeed {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            candles: Vec::new(),
        }
    }
}

/// One instrument in the run: a primary feed driving strategy dispatch plus
/// zero or more context feeds delivered as bounded history windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub ticker: String,
    pub primary_interval: Interval,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub primary: TimeframeFeed,
    pub context: Vec<TimeframeFeed>,
}

/// Start building an instrument config.
pub fn instrument(
    ticker: impl Into<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    primary_interval: Interval,
) -> InstrumentConfig {
    InstrumentConfig {
        ticker: ticker.into(),
        primary_interval,
        start,
        end,
        primary: TimeframeFeed::new(primary_interval),
        context: Vec::new(),
    }
}

impl InstrumentConfig {
    /// Add a context feed. Context windows are delivered to the strategy in
    /// the order they were added.
    pub fn add_context(mut self, interval: Interval) -> Self {
        self.context.push(TimeframeFeed::new(interval));
        self
    }
}

/// The fine-grained feed the broker prices fills against, independent of any
/// strategy's primary interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub interval: Interval,
    pub bars_before: usize,
    pub bars_after: usize,
    pub candles: BTreeMap<String, Vec<Candle>>,
}

impl ExecutionConfig {
    pub fn new(interval: Interval, bars_before: usize, bars_after: usize) -> Self {
        Self {
            interval,
            bars_before,
            bars_after,
            candles: BTreeMap::new(),
        }
    }
}

/// Initial portfolio state and its risk constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub initial_cash: Decimal,
    pub allow_short_selling: bool,
}

impl PortfolioConfig {
    pub fn new(initial_cash: Decimal, allow_short_selling: bool) -> Self {
        Self {
            initial_cash,
            allow_short_selling,
        }
    }
}
