//! Orders produced by allocators.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    LimitMaker,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::LimitMaker => "LIMIT_MAKER",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        };
        f.write_str(s)
    }
}

/// A concrete instruction for the broker.
///
/// `quantity` is always positive; direction comes from `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub ticker: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub side: Side,
    pub signal_reason: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        ticker: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
        order_type: OrderType,
        side: Side,
        signal_reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            quantity,
            order_type,
            side,
            signal_reason: signal_reason.into(),
            created_at,
        }
    }
}
