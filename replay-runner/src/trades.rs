//! Trade reconstruction from the executed order stream.
//!
//! Executions are grouped by ticker, sorted by report time, and paired off
//! two by two; legs are assigned by side. An odd trailing execution becomes
//! a partial trade holding only its populated side. Pairing is intentionally
//! blind to signed quantities, matching the execution stream's shape rather
//! than position accounting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use replay_core::domain::{ExecutionReport, Side};

/// A paired set of buy and sell executions on one ticker. Partial trades
/// have exactly one populated leg.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub buy: Option<ExecutionReport>,
    pub sell: Option<ExecutionReport>,
}

/// Per-trade fold over both legs' fills, shared by the metric functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeBreakdown {
    /// Sell fill value minus buy fill value, fees excluded.
    pub gross: Decimal,
    pub fees: Decimal,
    pub has_buy: bool,
    pub has_sell: bool,
}

impl Trade {
    /// Matched quantity: the lesser filled quantity of the two legs, zero
    /// for partial trades.
    pub fn qty(&self) -> Decimal {
        match (&self.buy, &self.sell) {
            (Some(buy), Some(sell)) => buy.total_filled_qty.min(sell.total_filled_qty),
            _ => Decimal::ZERO,
        }
    }

    /// Walk both legs' fills once, accumulating gross value and fees.
    ///
    /// A leg with no fills contributes nothing, so a trade is realized only
    /// when `has_buy && has_sell` afterwards.
    pub fn breakdown(&self) -> TradeBreakdown {
        let mut acc = TradeBreakdown {
            gross: Decimal::ZERO,
            fees: Decimal::ZERO,
            has_buy: false,
            has_sell: false,
        };

        for leg in [&self.buy, &self.sell].into_iter().flatten() {
            for fill in &leg.fills {
                acc.fees += fill.fee;
                let value = fill.price * fill.quantity;
                match leg.side {
                    Side::Buy => {
                        acc.gross -= value;
                        acc.has_buy = true;
                    }
                    Side::Sell => {
                        acc.gross += value;
                        acc.has_sell = true;
                    }
                }
            }
        }
        acc
    }

    /// Fee-adjusted PnL when both legs filled.
    pub fn net_pnl(&self) -> Option<Decimal> {
        let b = self.breakdown();
        (b.has_buy && b.has_sell).then(|| b.gross - b.fees)
    }

    /// Earliest populated leg time; used to order trades chronologically.
    pub fn open_time(&self) -> DateTime<Utc> {
        match (&self.buy, &self.sell) {
            (Some(buy), Some(sell)) => buy.report_time.min(sell.report_time),
            (Some(buy), None) => buy.report_time,
            (None, Some(sell)) => sell.report_time,
            (None, None) => DateTime::UNIX_EPOCH,
        }
    }

    /// Latest populated leg time; the trade counts as closed here.
    pub fn close_time(&self) -> DateTime<Utc> {
        match (&self.buy, &self.sell) {
            (Some(buy), Some(sell)) => buy.report_time.max(sell.report_time),
            (Some(buy), None) => buy.report_time,
            (None, Some(sell)) => sell.report_time,
            (None, None) => DateTime::UNIX_EPOCH,
        }
    }
}

/// Pair the execution stream into trades.
pub fn pair_executions(executions: &[ExecutionReport]) -> Vec<Trade> {
    let mut by_ticker: BTreeMap<&str, Vec<&ExecutionReport>> = BTreeMap::new();
    for report in executions {
        by_ticker.entry(&report.ticker).or_default().push(report);
    }

    let mut trades = Vec::new();
    for group in by_ticker.into_values() {
        let mut group = group;
        group.sort_by_key(|report| report.report_time);

        for pair in group.chunks(2) {
            let trade = match pair {
                [a, b] => {
                    if a.side == Side::Buy {
                        Trade {
                            buy: Some((*a).clone()),
                            sell: Some((*b).clone()),
                        }
                    } else {
                        Trade {
                            buy: Some((*b).clone()),
                            sell: Some((*a).clone()),
                        }
                    }
                }
                [last] => {
                    if last.side == Side::Buy {
                        Trade {
                            buy: Some((*last).clone()),
                            sell: None,
                        }
                    } else {
                        Trade {
                            buy: None,
                            sell: Some((*last).clone()),
                        }
                    }
                }
                _ => unreachable!("chunks(2) yields one or two items"),
            };
            trades.push(trade);
        }
    }

    trades.sort_by_key(Trade::open_time);
    trades
}
