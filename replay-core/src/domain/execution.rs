//! Broker execution reports and fills.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Accepted,
    PartiallyFilled,
    Filled,
    Rejected,
    Expired,
    Canceled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// A partial or complete execution of an order at a single price and time.
///
/// `quantity` is always non-negative; direction comes from the report's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub time: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
}

impl Fill {
    pub fn new(time: DateTime<Utc>, price: Decimal, quantity: Decimal, fee: Decimal) -> Self {
        Self {
            time,
            price,
            quantity,
            fee,
        }
    }
}

/// The broker's response for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub ticker: String,
    pub side: Side,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
    pub total_filled_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub total_fees: Decimal,
    pub remaining_qty: Decimal,
    pub signal_reason: String,
    pub reject_reason: String,
    pub report_time: DateTime<Utc>,
}

impl ExecutionReport {
    /// Build a report from its fills, deriving the filled quantity, the
    /// quantity-weighted average price, and the fee total.
    pub fn from_fills(
        ticker: impl Into<String>,
        side: Side,
        status: OrderStatus,
        fills: Vec<Fill>,
        remaining_qty: Decimal,
        signal_reason: impl Into<String>,
        report_time: DateTime<Utc>,
    ) -> Self {
        let mut total_qty = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        let mut weighted = Decimal::ZERO;
        for fill in &fills {
            total_qty += fill.quantity;
            total_fees += fill.fee;
            weighted += fill.price * fill.quantity;
        }
        let avg_fill_price = if total_qty.is_zero() {
            Decimal::ZERO
        } else {
            weighted / total_qty
        };

        Self {
            ticker: ticker.into(),
            side,
            status,
            fills,
            total_filled_qty: total_qty,
            avg_fill_price,
            total_fees,
            remaining_qty,
            signal_reason: signal_reason.into(),
            reject_reason: String::new(),
            report_time,
        }
    }

    /// Build a fill-less rejection. Rejections are recorded in the execution
    /// stream but never mutate the portfolio.
    pub fn rejected(
        ticker: impl Into<String>,
        side: Side,
        reject_reason: impl Into<String>,
        signal_reason: impl Into<String>,
        report_time: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            side,
            status: OrderStatus::Rejected,
            fills: Vec::new(),
            total_filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            remaining_qty: Decimal::ZERO,
            signal_reason: signal_reason.into(),
            reject_reason: reject_reason.into(),
            report_time,
        }
    }
}
