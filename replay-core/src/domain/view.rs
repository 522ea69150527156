//! Read-only portfolio snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A position as seen through a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticker: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub last_market_price: Decimal,
}

/// Read-only view of the portfolio at one instant.
///
/// Positions are keyed by ticker in a `BTreeMap` so iteration (and therefore
/// any derived output) is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioView {
    pub cash: Decimal,
    pub positions: BTreeMap<String, PositionSnapshot>,
    pub time: DateTime<Utc>,
}

impl PortfolioView {
    /// Sum of `quantity * last_market_price` over all positions.
    pub fn positions_value(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| p.quantity * p.last_market_price)
            .sum()
    }

    /// Cash plus the marked value of all positions.
    pub fn total_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn snapshot(cash: Decimal, holdings: &[(&str, Decimal, Decimal)]) -> PortfolioView {
        let positions = holdings
            .iter()
            .map(|(ticker, qty, price)| {
                (
                    ticker.to_string(),
                    PositionSnapshot {
                        ticker: ticker.to_string(),
                        quantity: *qty,
                        avg_entry_price: Decimal::ZERO,
                        last_market_price: *price,
                    },
                )
            })
            .collect();
        PortfolioView {
            cash,
            positions,
            time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn total_value_sums_cash_and_positions() {
        let view = snapshot(dec!(1000), &[("AAPL", dec!(10), dec!(100)), ("MSFT", dec!(2), dec!(200))]);
        assert_eq!(view.positions_value(), dec!(1400));
        assert_eq!(view.total_value(), dec!(2400));
    }

    #[test]
    fn short_positions_subtract_value() {
        let view = snapshot(dec!(1000), &[("AAPL", dec!(-5), dec!(100))]);
        assert_eq!(view.total_value(), dec!(500));
    }
}
