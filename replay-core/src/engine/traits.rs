//! Collaborator contracts: strategy, allocator, broker, and the read-only
//! capabilities the scheduler hands out.
//!
//! Strategies, allocators, and brokers are user-supplied behaviors modeled as
//! trait objects; each may hold arbitrary state. The simulation loop invokes
//! them synchronously and assumes them total: only portfolio application can
//! fail a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Candle, ExecutionReport, Fill, Interval, Order, PortfolioView, Signal};

/// Signals collected during one tick, keyed by ticker.
///
/// Allocators must treat the map as order-agnostic.
pub type SignalMap = BTreeMap<String, Vec<Signal>>;

/// Bounded history windows per context interval, borrowed from the feeds.
pub type ContextWindows<'a> = BTreeMap<Interval, &'a [Candle]>;

/// Everything the broker sees for one tick: the virtual clock, a fresh
/// portfolio snapshot, and a bounded execution-feed window per ticker.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    pub cur_time: DateTime<Utc>,
    pub portfolio: PortfolioView,
    pub candles: BTreeMap<String, &'a [Candle]>,
}

/// Narrow back-channel from the scheduler: the current virtual time and the
/// last primary close per ticker. The portfolio consumes this when building
/// snapshots; it never mutates scheduler state.
pub trait MarketView {
    fn current_time(&self) -> DateTime<Utc>;

    /// Close of the most recent primary bar for `ticker`; before the first
    /// dispatch this is the close of the first loaded bar, and zero for a
    /// ticker with no feed.
    fn last_close(&self, ticker: &str) -> Decimal;
}

/// Read-only portfolio capability handed to `init` hooks.
pub trait PortfolioApi {
    fn snapshot(&self) -> PortfolioView;
    fn fills_for_ticker(&self, ticker: &str) -> Vec<Fill>;
}

/// A trading strategy. Receives every closed primary bar in chronological
/// order along with the closed prefixes of its instrument's context feeds.
pub trait Strategy {
    fn init(&mut self, api: &dyn PortfolioApi) -> anyhow::Result<()>;

    fn on_candle(&mut self, candle: &Candle, context: &ContextWindows<'_>) -> Vec<Signal>;
}

/// Sizes signals into orders. Returned orders must have positive quantity.
pub trait Allocator {
    fn init(&mut self, api: &dyn PortfolioApi) -> anyhow::Result<()>;

    fn allocate(&mut self, signals: &SignalMap, view: &PortfolioView) -> Vec<Order>;
}

/// Simulated execution venue. Reports' `report_time` must be at or after
/// `ctx.cur_time`; rejected orders come back as fill-less reports rather
/// than errors.
pub trait Broker {
    fn execute(&mut self, orders: &[Order], ctx: &ExecutionContext<'_>) -> Vec<ExecutionReport>;
}
