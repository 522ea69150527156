//! Minute-tick scheduler driving the simulation loop.
//!
//! The virtual clock advances one minute at a time, the smallest supported
//! interval. On each tick the scheduler dispatches every primary bar that
//! closes exactly at the tick, collects signals, sizes them through the
//! allocator, prices the resulting orders through the broker, and applies
//! the execution reports to the portfolio. Coarser intervals dispatch on the
//! minutes that coincide with their close boundaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::domain::Candle;
use crate::engine::config::{ExecutionConfig, InstrumentConfig};
use crate::engine::cursor;
use crate::engine::portfolio::Portfolio;
use crate::engine::traits::{
    Allocator, Broker, ContextWindows, ExecutionContext, MarketView, SignalMap, Strategy,
};
use crate::engine::EngineError;

/// Owns the virtual clock and every feed cursor for one run.
#[derive(Debug)]
pub struct Scheduler {
    cur_time: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    instruments: Vec<InstrumentConfig>,
    execution: ExecutionConfig,
    /// Next undispatched primary bar, per instrument.
    primary_cursors: Vec<usize>,
    /// One-past-the-end of the closed context prefix, per instrument and
    /// context feed.
    context_cursors: Vec<Vec<usize>>,
    /// Last closed execution bar per ticker; `None` until the first close.
    execution_cursors: BTreeMap<String, Option<usize>>,
}

impl Scheduler {
    /// Build a scheduler over fully loaded feeds. The clock spans the union
    /// of the instrument ranges.
    pub fn new(instruments: Vec<InstrumentConfig>, execution: ExecutionConfig) -> Self {
        let (start, end) = global_time_range(&instruments);
        let primary_cursors = vec![0; instruments.len()];
        let context_cursors = instruments
            .iter()
            .map(|inst| vec![0; inst.context.len()])
            .collect();
        let execution_cursors = instruments
            .iter()
            .map(|inst| (inst.ticker.clone(), None))
            .collect();

        Self {
            cur_time: start,
            start,
            end,
            instruments,
            execution,
            primary_cursors,
            context_cursors,
            execution_cursors,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The virtual clock; one minute past `end` once a run completes.
    pub fn current_time(&self) -> DateTime<Utc> {
        self.cur_time
    }

    /// Borrowed market back-channel for snapshots and init hooks.
    pub fn market_view(&self) -> SchedulerMarket<'_> {
        SchedulerMarket {
            instruments: &self.instruments,
            primary_cursors: &self.primary_cursors,
            time: self.cur_time,
        }
    }

    /// Run the loop to completion or first fatal error.
    ///
    /// Observable order within a tick: strategy dispatches in instrument
    /// order, then one allocator call, one broker call, portfolio
    /// application, and finally the daily snapshot when the clock sits on a
    /// midnight minute.
    pub fn run(
        &mut self,
        portfolio: &mut Portfolio,
        strategy: &mut dyn Strategy,
        allocator: &mut dyn Allocator,
        broker: &mut dyn Broker,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        info!(start = %self.start, end = %self.end, instruments = self.instruments.len(), "starting run");

        while self.cur_time <= self.end {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let signals = self.dispatch_closed_bars(strategy);

            let orders = {
                let market = self.market_view();
                let view = portfolio.snapshot(self.cur_time, &market);
                allocator.allocate(&signals, &view)
            };

            let reports = {
                let ctx = self.execution_context(portfolio);
                broker.execute(&orders, &ctx)
            };

            portfolio.apply(reports)?;

            if self.cur_time.hour() == 0 && self.cur_time.minute() == 0 {
                let market = self.market_view();
                portfolio.record_snapshot(self.cur_time, &market);
            }

            self.cur_time = self.cur_time + Duration::minutes(1);
        }

        info!(executions = portfolio.executions().len(), snapshots = portfolio.snapshots().len(), "run complete");
        Ok(())
    }

    /// Step 2 of the tick: dispatch every primary bar closing now, then
    /// advance the execution cursor for each instrument unconditionally.
    fn dispatch_closed_bars(&mut self, strategy: &mut dyn Strategy) -> SignalMap {
        let mut signals: SignalMap = BTreeMap::new();

        for idx in 0..self.instruments.len() {
            let closes_now = {
                let inst = &self.instruments[idx];
                inst.primary
                    .candles
                    .get(self.primary_cursors[idx])
                    .is_some_and(|bar| bar.close_time() == self.cur_time)
            };

            if closes_now {
                let inst = &self.instruments[idx];
                let bar = inst.primary.candles[self.primary_cursors[idx]].clone();

                let mut windows: ContextWindows<'_> = BTreeMap::new();
                let mut window_ends = Vec::with_capacity(inst.context.len());
                for (feed_idx, feed) in inst.context.iter().enumerate() {
                    let end = cursor::context_window_end(
                        &feed.candles,
                        feed.interval,
                        self.cur_time,
                        self.context_cursors[idx][feed_idx],
                    );
                    windows.insert(feed.interval, &feed.candles[..end]);
                    window_ends.push(end);
                }

                debug!(ticker = %bar.ticker, timestamp = %bar.timestamp, "dispatching closed bar");
                let produced = strategy.on_candle(&bar, &windows);
                drop(windows);

                self.context_cursors[idx] = window_ends;
                self.primary_cursors[idx] += 1;

                if !produced.is_empty() {
                    signals
                        .entry(bar.ticker.clone())
                        .or_default()
                        .extend(produced);
                }
            }

            let ticker = &self.instruments[idx].ticker;
            if let Some(candles) = self.execution.candles.get(ticker) {
                let prev = self.execution_cursors.get(ticker).copied().flatten();
                let next =
                    cursor::advance_index(candles, prev, self.cur_time, self.execution.interval);
                self.execution_cursors.insert(ticker.clone(), next);
            }
        }

        signals
    }

    /// Bounded execution-feed window per ticker, plus a fresh snapshot.
    ///
    /// The window spans `[cursor - bars_before, cursor + bars_after)` clamped
    /// to the feed; a ticker with no closed execution bar yet gets an empty
    /// window.
    fn execution_context<'a>(&'a self, portfolio: &Portfolio) -> ExecutionContext<'a> {
        let market = self.market_view();
        let snapshot = portfolio.snapshot(self.cur_time, &market);

        let mut candles: BTreeMap<String, &'a [Candle]> = BTreeMap::new();
        for (ticker, feed) in &self.execution.candles {
            let window: &[Candle] = match self.execution_cursors.get(ticker).copied().flatten() {
                None => &[],
                Some(idx) => {
                    let end = (idx + self.execution.bars_after).min(feed.len());
                    let start = idx.saturating_sub(self.execution.bars_before).min(end);
                    &feed[start..end]
                }
            };
            candles.insert(ticker.clone(), window);
        }

        ExecutionContext {
            cur_time: self.cur_time,
            portfolio: snapshot,
            candles,
        }
    }
}

/// Borrowed implementation of the scheduler's market back-channel.
#[derive(Debug)]
pub struct SchedulerMarket<'a> {
    instruments: &'a [InstrumentConfig],
    primary_cursors: &'a [usize],
    time: DateTime<Utc>,
}

impl MarketView for SchedulerMarket<'_> {
    fn current_time(&self) -> DateTime<Utc> {
        self.time
    }

    fn last_close(&self, ticker: &str) -> Decimal {
        for (inst, &cursor) in self.instruments.iter().zip(self.primary_cursors) {
            if inst.ticker == ticker {
                let candles = &inst.primary.candles;
                if candles.is_empty() {
                    return Decimal::ZERO;
                }
                let idx = cursor.saturating_sub(1).min(candles.len() - 1);
                return candles[idx].close;
            }
        }
        Decimal::ZERO
    }
}

/// Union of the instrument time ranges; the epoch for an empty set.
pub fn global_time_range(instruments: &[InstrumentConfig]) -> (DateTime<Utc>, DateTime<Utc>) {
    let Some(first) = instruments.first() else {
        return (DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH);
    };

    let mut start = first.start;
    let mut end = first.end;
    for inst in &instruments[1..] {
        if inst.start < start {
            start = inst.start;
        }
        if inst.end > end {
            end = inst.end;
        }
    }
    (start, end)
}
