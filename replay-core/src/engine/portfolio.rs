//! Portfolio state machine: cash, positions, execution-report processing.
//!
//! The portfolio is exclusively owned by the simulation; collaborators only
//! ever see [`PortfolioView`] snapshots. Reports are applied fill by fill,
//! and every failure mode is checked before a fill commits, so a failing
//! fill leaves cash and positions exactly as they were.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ExecutionReport, Fill, PortfolioView, PositionSnapshot};
use crate::engine::config::PortfolioConfig;
use crate::engine::traits::{MarketView, PortfolioApi};

/// Typed failures of execution-report application. Any of these aborts the
/// simulation at the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortfolioError {
    #[error("fill quantity is negative")]
    NegativeQuantity,

    #[error("insufficient balance when applying order fill")]
    InsufficientBalance,

    #[error("short sell not allowed: sell exceeds held quantity")]
    ShortSellNotAllowed,
}

/// A holding in a single ticker. Quantity sign encodes direction; zero means
/// flat. Zeroed positions stay in the map once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub last_execution_price: Decimal,
}

impl Position {
    fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            last_execution_price: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Cash-and-positions ledger for one simulation run.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: Decimal,
    positions: BTreeMap<String, Position>,
    executions: Vec<ExecutionReport>,
    snapshots: Vec<PortfolioView>,
    allow_short_selling: bool,
}

impl Portfolio {
    pub fn new(config: &PortfolioConfig) -> Self {
        Self {
            cash: config.initial_cash,
            positions: BTreeMap::new(),
            executions: Vec::new(),
            snapshots: Vec::new(),
            allow_short_selling: config.allow_short_selling,
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    /// Execution reports applied so far, append-only.
    pub fn executions(&self) -> &[ExecutionReport] {
        &self.executions
    }

    /// Daily snapshots recorded so far, append-only and chronological.
    pub fn snapshots(&self) -> &[PortfolioView] {
        &self.snapshots
    }

    /// Fills applied for one ticker, in application order.
    pub fn fills_for_ticker(&self, ticker: &str) -> Vec<Fill> {
        self.executions
            .iter()
            .filter(|report| report.ticker == ticker)
            .flat_map(|report| report.fills.iter().cloned())
            .collect()
    }

    /// Build a read-only view at `time`, marking every position at the last
    /// primary close supplied by the scheduler.
    pub fn snapshot(&self, time: DateTime<Utc>, market: &dyn MarketView) -> PortfolioView {
        let positions = self
            .positions
            .values()
            .map(|pos| {
                (
                    pos.ticker.clone(),
                    PositionSnapshot {
                        ticker: pos.ticker.clone(),
                        quantity: pos.quantity,
                        avg_entry_price: pos.avg_cost,
                        last_market_price: market.last_close(&pos.ticker),
                    },
                )
            })
            .collect();

        PortfolioView {
            cash: self.cash,
            positions,
            time,
        }
    }

    /// Snapshot and append to the snapshot log.
    pub fn record_snapshot(&mut self, time: DateTime<Utc>, market: &dyn MarketView) {
        let view = self.snapshot(time, market);
        self.snapshots.push(view);
    }

    /// Apply a batch of execution reports.
    ///
    /// Reports are applied in `report_time` order, each report's fills in
    /// fill-time order. Per fill: cash moves by `-price * signed_qty - fee`,
    /// the position quantity moves by `signed_qty`, and the average cost
    /// follows the weighted-average rules. Both the cash floor and the
    /// short-selling guard are checked before anything commits.
    pub fn apply(&mut self, mut reports: Vec<ExecutionReport>) -> Result<(), PortfolioError> {
        reports.sort_by_key(|report| report.report_time);

        for report in reports {
            let mut fills = report.fills.clone();
            fills.sort_by_key(|fill| fill.time);

            let position = self
                .positions
                .entry(report.ticker.clone())
                .or_insert_with(|| Position::new(report.ticker.clone()));

            for fill in &fills {
                if fill.quantity.is_sign_negative() && !fill.quantity.is_zero() {
                    return Err(PortfolioError::NegativeQuantity);
                }
                let signed_qty = fill.quantity * report.side.sign();

                let cash_delta = -(fill.price * signed_qty);
                let new_cash = self.cash + cash_delta - fill.fee;
                if new_cash < Decimal::ZERO {
                    return Err(PortfolioError::InsufficientBalance);
                }

                let old_qty = position.quantity;
                let new_qty = old_qty + signed_qty;
                if !self.allow_short_selling && new_qty < Decimal::ZERO {
                    return Err(PortfolioError::ShortSellNotAllowed);
                }

                // All checks passed; commit cash and position together.
                self.cash = new_cash;
                position.avg_cost = next_avg_cost(old_qty, new_qty, position.avg_cost, fill.price);
                position.quantity = new_qty;
                position.last_execution_price = fill.price;
            }

            debug!(
                ticker = %report.ticker,
                side = %report.side,
                fills = fills.len(),
                cash = %self.cash,
                "applied execution report"
            );
            self.executions.push(report);
        }
        Ok(())
    }
}

/// Average-cost transition for one fill.
fn next_avg_cost(
    old_qty: Decimal,
    new_qty: Decimal,
    avg_cost: Decimal,
    fill_price: Decimal,
) -> Decimal {
    if same_side(old_qty, new_qty) {
        let abs_old = old_qty.abs();
        let abs_new = new_qty.abs();
        if abs_new > abs_old {
            // Scaling in: quantity-weighted average of old basis and fill.
            weighted_avg(avg_cost, abs_old, fill_price, abs_new - abs_old)
        } else {
            // Scaling out keeps the basis.
            avg_cost
        }
    } else if old_qty.is_zero() {
        fill_price
    } else if new_qty.is_zero() {
        Decimal::ZERO
    } else {
        // Flipped through flat: the new side's basis is this fill.
        fill_price
    }
}

fn same_side(a: Decimal, b: Decimal) -> bool {
    (a > Decimal::ZERO && b > Decimal::ZERO) || (a < Decimal::ZERO && b < Decimal::ZERO)
}

fn weighted_avg(
    existing_avg: Decimal,
    existing_qty: Decimal,
    new_price: Decimal,
    new_qty: Decimal,
) -> Decimal {
    if existing_qty.is_zero() {
        return new_price;
    }
    (existing_avg * existing_qty + new_price * new_qty) / (existing_qty + new_qty)
}

/// One-shot read-only bundle handed to `init` hooks: the portfolio plus the
/// scheduler's market view at initialization time.
pub struct PortfolioInspector<'a> {
    pub portfolio: &'a Portfolio,
    pub market: &'a dyn MarketView,
}

impl PortfolioApi for PortfolioInspector<'_> {
    fn snapshot(&self) -> PortfolioView {
        self.portfolio
            .snapshot(self.market.current_time(), self.market)
    }

    fn fills_for_ticker(&self, ticker: &str) -> Vec<Fill> {
        self.portfolio.fills_for_ticker(ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderStatus, Side};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn fill(minute: i64, price: Decimal, qty: Decimal, fee: Decimal) -> Fill {
        Fill::new(at(minute), price, qty, fee)
    }

    fn report(ticker: &str, side: Side, fills: Vec<Fill>) -> ExecutionReport {
        let report_time = fills.last().map(|f| f.time).unwrap_or_else(|| at(0));
        ExecutionReport::from_fills(
            ticker,
            side,
            OrderStatus::Filled,
            fills,
            Decimal::ZERO,
            "",
            report_time,
        )
    }

    fn portfolio(cash: Decimal, allow_short: bool) -> Portfolio {
        Portfolio::new(&PortfolioConfig::new(cash, allow_short))
    }

    fn with_position(mut p: Portfolio, ticker: &str, qty: Decimal, avg: Decimal) -> Portfolio {
        p.positions.insert(
            ticker.into(),
            Position {
                ticker: ticker.into(),
                quantity: qty,
                avg_cost: avg,
                last_execution_price: avg,
            },
        );
        p
    }

    #[test]
    fn open_long() {
        let mut p = portfolio(dec!(10000), false);
        p.apply(vec![report(
            "AAPL",
            Side::Buy,
            vec![fill(1, dec!(100), dec!(10), dec!(1.00))],
        )])
        .unwrap();

        assert_eq!(p.cash(), dec!(8999));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.avg_cost, dec!(100));
        assert_eq!(pos.last_execution_price, dec!(100));
    }

    #[test]
    fn scale_in_updates_avg_cost() {
        let p = portfolio(dec!(10000), false);
        let mut p = with_position(p, "AAPL", dec!(10), dec!(100));
        p.apply(vec![report(
            "AAPL",
            Side::Buy,
            vec![fill(1, dec!(110), dec!(5), dec!(0))],
        )])
        .unwrap();

        assert_eq!(p.cash(), dec!(9450));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(15));
        // (100*10 + 110*5) / 15
        assert_eq!(pos.avg_cost.round_dp(6), dec!(103.333333));
        assert_eq!(pos.last_execution_price, dec!(110));
    }

    #[test]
    fn reduce_long_keeps_avg_cost() {
        let p = portfolio(dec!(0), false);
        let mut p = with_position(p, "AAPL", dec!(10), dec!(100));
        p.apply(vec![report(
            "AAPL",
            Side::Sell,
            vec![fill(1, dec!(105), dec!(4), dec!(0.50))],
        )])
        .unwrap();

        assert_eq!(p.cash(), dec!(419.5));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(6));
        assert_eq!(pos.avg_cost, dec!(100));
        assert_eq!(pos.last_execution_price, dec!(105));
    }

    #[test]
    fn close_to_flat_resets_avg_cost() {
        let p = portfolio(dec!(0), false);
        let mut p = with_position(p, "AAPL", dec!(10), dec!(100));
        p.apply(vec![report(
            "AAPL",
            Side::Sell,
            vec![fill(1, dec!(105), dec!(10), dec!(0))],
        )])
        .unwrap();

        let pos = &p.positions()["AAPL"];
        assert!(pos.is_flat());
        assert_eq!(pos.avg_cost, Decimal::ZERO);
        // The zeroed position remains in the map.
        assert!(p.positions().contains_key("AAPL"));
    }

    #[test]
    fn flip_long_to_short_resets_avg_cost() {
        let p = portfolio(dec!(0), true);
        let mut p = with_position(p, "AAPL", dec!(5), dec!(100));
        p.apply(vec![report(
            "AAPL",
            Side::Sell,
            vec![fill(1, dec!(90), dec!(8), dec!(0))],
        )])
        .unwrap();

        assert_eq!(p.cash(), dec!(720));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(-3));
        assert_eq!(pos.avg_cost, dec!(90));
        assert_eq!(pos.last_execution_price, dec!(90));
    }

    #[test]
    fn insufficient_cash_fails() {
        let mut p = portfolio(dec!(100), false);
        let err = p
            .apply(vec![report(
                "AAPL",
                Side::Buy,
                vec![fill(1, dec!(10), dec!(20), dec!(0))],
            )])
            .unwrap_err();
        assert_eq!(err, PortfolioError::InsufficientBalance);
    }

    #[test]
    fn report_without_fills_is_recorded_but_mutates_nothing() {
        let mut p = portfolio(dec!(100), false);
        p.apply(vec![ExecutionReport::rejected(
            "AAPL",
            Side::Buy,
            "not enough cash available for buy",
            "",
            at(0),
        )])
        .unwrap();

        assert_eq!(p.cash(), dec!(100));
        assert_eq!(p.executions().len(), 1);
        // A fill-less report still creates the (empty) position slot lazily.
        assert!(p.positions()["AAPL"].is_flat());
    }

    #[test]
    fn two_tickers_updated_independently() {
        let p = portfolio(dec!(20000), false);
        let p = with_position(p, "AAPL", dec!(10), dec!(100));
        let mut p = with_position(p, "MSFT", dec!(5), dec!(200));

        p.apply(vec![
            report("AAPL", Side::Buy, vec![fill(1, dec!(110), dec!(5), dec!(0.25))]),
            report("MSFT", Side::Sell, vec![fill(2, dec!(195), dec!(2), dec!(0.10))]),
        ])
        .unwrap();

        // 20000 - 550.25 + 389.90
        assert_eq!(p.cash(), dec!(19839.65));
        let aapl = &p.positions()["AAPL"];
        assert_eq!(aapl.quantity, dec!(15));
        assert_eq!(aapl.avg_cost.round_dp(6), dec!(103.333333));
        let msft = &p.positions()["MSFT"];
        assert_eq!(msft.quantity, dec!(3));
        assert_eq!(msft.avg_cost, dec!(200));
        assert_eq!(msft.last_execution_price, dec!(195));
    }

    #[test]
    fn multiple_fills_in_one_report() {
        let mut p = portfolio(dec!(1000), false);
        p.apply(vec![report(
            "AAPL",
            Side::Buy,
            vec![
                fill(1, dec!(10), dec!(5), dec!(0.10)),
                fill(2, dec!(20), dec!(5), dec!(0.20)),
            ],
        )])
        .unwrap();

        // 1000 - 50.10 - 100.20
        assert_eq!(p.cash(), dec!(849.70));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.avg_cost, dec!(15));
        assert_eq!(pos.last_execution_price, dec!(20));
    }

    #[test]
    fn reports_applied_in_report_time_order() {
        let mut p = portfolio(dec!(1000), true);
        // Later report listed first; application must sort by report_time.
        p.apply(vec![
            report("AAPL", Side::Buy, vec![fill(2, dec!(20), dec!(5), dec!(0.20))]),
            report("AAPL", Side::Buy, vec![fill(1, dec!(10), dec!(5), dec!(0.10))]),
        ])
        .unwrap();

        assert_eq!(p.cash(), dec!(849.70));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(10));
        assert_eq!(pos.avg_cost, dec!(15));
        assert_eq!(pos.last_execution_price, dec!(20));
    }

    #[test]
    fn oversell_blocked_and_state_unchanged() {
        let p = portfolio(dec!(0), false);
        let mut p = with_position(p, "AAPL", dec!(5), dec!(100));

        let err = p
            .apply(vec![report(
                "AAPL",
                Side::Sell,
                vec![fill(1, dec!(90), dec!(8), dec!(0))],
            )])
            .unwrap_err();

        assert_eq!(err, PortfolioError::ShortSellNotAllowed);
        // The failing fill committed nothing.
        assert_eq!(p.cash(), dec!(0));
        let pos = &p.positions()["AAPL"];
        assert_eq!(pos.quantity, dec!(5));
        assert_eq!(pos.avg_cost, dec!(100));
        assert!(p.executions().is_empty());
    }

    #[test]
    fn negative_fill_quantity_fails() {
        let mut p = portfolio(dec!(1000), false);
        let err = p
            .apply(vec![report(
                "AAPL",
                Side::Buy,
                vec![fill(1, dec!(10), dec!(-5), dec!(0))],
            )])
            .unwrap_err();
        assert_eq!(err, PortfolioError::NegativeQuantity);
    }

    #[test]
    fn round_trip_cash_delta() {
        let mut p = portfolio(dec!(10000), false);
        p.apply(vec![report(
            "AAPL",
            Side::Buy,
            vec![fill(1, dec!(100), dec!(10), dec!(1))],
        )])
        .unwrap();
        p.apply(vec![report(
            "AAPL",
            Side::Sell,
            vec![fill(2, dec!(110), dec!(10), dec!(2))],
        )])
        .unwrap();

        // Δcash = q * (p' - p) - (f + f') = 10 * 10 - 3
        assert_eq!(p.cash(), dec!(10097));
        assert!(p.positions()["AAPL"].is_flat());
    }

    // ── Weighted average ────────────────────────────────────────────────

    #[test]
    fn weighted_avg_zero_existing_returns_new_price() {
        assert_eq!(
            weighted_avg(dec!(0), dec!(0), dec!(123.45), dec!(10)),
            dec!(123.45)
        );
    }

    #[test]
    fn weighted_avg_zero_added_keeps_existing() {
        assert_eq!(
            weighted_avg(dec!(100), dec!(10), dec!(150), dec!(0)),
            dec!(100)
        );
    }

    #[test]
    fn weighted_avg_simple_mix() {
        let got = weighted_avg(dec!(100), dec!(10), dec!(110), dec!(5));
        assert_eq!(got.round_dp(6), dec!(103.333333));
    }

    #[test]
    fn weighted_avg_identical_prices() {
        assert_eq!(
            weighted_avg(dec!(42.00), dec!(7), dec!(42.00), dec!(3)),
            dec!(42.00)
        );
    }

    #[test]
    fn weighted_avg_large_numbers() {
        let got = weighted_avg(dec!(250000.125), dec!(1000000), dec!(249999.875), dec!(500000));
        let want = (dec!(250000.125) * dec!(1000000) + dec!(249999.875) * dec!(500000))
            / dec!(1500000);
        assert_eq!(got, want);
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    struct FixedMarket {
        time: DateTime<Utc>,
        price: Decimal,
    }

    impl MarketView for FixedMarket {
        fn current_time(&self) -> DateTime<Utc> {
            self.time
        }
        fn last_close(&self, _ticker: &str) -> Decimal {
            self.price
        }
    }

    #[test]
    fn snapshot_marks_positions_at_last_close() {
        let p = portfolio(dec!(1000), false);
        let p = with_position(p, "AAPL", dec!(10), dec!(100));
        let market = FixedMarket {
            time: at(0),
            price: dec!(120),
        };

        let view = p.snapshot(at(0), &market);
        assert_eq!(view.cash, dec!(1000));
        assert_eq!(view.positions["AAPL"].last_market_price, dec!(120));
        assert_eq!(view.positions["AAPL"].avg_entry_price, dec!(100));
        assert_eq!(view.total_value(), dec!(2200));
    }

    #[test]
    fn inspector_exposes_snapshot_and_fills() {
        let mut p = portfolio(dec!(10000), false);
        p.apply(vec![report(
            "AAPL",
            Side::Buy,
            vec![fill(1, dec!(100), dec!(10), dec!(0))],
        )])
        .unwrap();

        let market = FixedMarket {
            time: at(1),
            price: dec!(100),
        };
        let inspector = PortfolioInspector {
            portfolio: &p,
            market: &market,
        };

        assert_eq!(inspector.snapshot().cash, dec!(9000));
        assert_eq!(inspector.fills_for_ticker("AAPL").len(), 1);
        assert!(inspector.fills_for_ticker("MSFT").is_empty());
    }
}
