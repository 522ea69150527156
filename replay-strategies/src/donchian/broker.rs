//! Fill-at-next-open broker with IBKR-style commission schedules.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use replay_core::domain::{Candle, ExecutionReport, Fill, Order, OrderStatus, Side};
use replay_core::engine::{Broker, ExecutionContext};

/// Commission schedule applied per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSchedule {
    /// IBKR "Fixed - IB SmartRouting" for USD-denominated Netherlands
    /// stocks: 0.05% of trade value, clamped to [1.70, 39.00] USD per order.
    IbkrNetherlandsFixedUsd,
    /// IBKR forex tier 1: 0.2 basis point of trade value, minimum 2.00 USD.
    IbkrForexTier1Usd,
    /// No commission.
    Free,
}

impl FeeSchedule {
    /// Commission for one order at the given trade value.
    pub fn fee(self, trade_value: Decimal) -> Decimal {
        if trade_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        match self {
            FeeSchedule::IbkrNetherlandsFixedUsd => {
                let fee = trade_value * dec!(0.0005);
                fee.clamp(dec!(1.70), dec!(39))
            }
            FeeSchedule::IbkrForexTier1Usd => {
                let fee = trade_value * dec!(0.00002);
                fee.max(dec!(2.00))
            }
            FeeSchedule::Free => Decimal::ZERO,
        }
    }
}

/// Fills every order in full at the open of the first execution-feed candle
/// strictly after the current tick. No slippage; buys are pre-checked
/// against the cash remaining across the batch, sells always execute.
///
/// The broker never mutates the portfolio; the engine applies its reports.
pub struct NextOpenBroker {
    fees: FeeSchedule,
}

impl NextOpenBroker {
    pub fn new(fees: FeeSchedule) -> Self {
        Self { fees }
    }
}

impl Broker for NextOpenBroker {
    fn execute(&mut self, orders: &[Order], ctx: &ExecutionContext<'_>) -> Vec<ExecutionReport> {
        let mut reports = Vec::with_capacity(orders.len());
        let mut remaining_cash = ctx.portfolio.cash;

        for order in orders {
            let window = ctx
                .candles
                .get(&order.ticker)
                .copied()
                .unwrap_or(&[]);
            if window.is_empty() {
                reports.push(ExecutionReport::rejected(
                    order.ticker.clone(),
                    order.side,
                    "no market data for ticker",
                    order.signal_reason.clone(),
                    ctx.cur_time,
                ));
                continue;
            }

            let Some(next_candle) = next_candle_after(ctx.cur_time, window) else {
                reports.push(ExecutionReport::rejected(
                    order.ticker.clone(),
                    order.side,
                    "no future candle available for execution",
                    order.signal_reason.clone(),
                    ctx.cur_time,
                ));
                continue;
            };

            if order.quantity <= Decimal::ZERO {
                reports.push(ExecutionReport::rejected(
                    order.ticker.clone(),
                    order.side,
                    "non-positive order quantity",
                    order.signal_reason.clone(),
                    ctx.cur_time,
                ));
                continue;
            }

            let fill_price = next_candle.open;
            let fill_time = next_candle.timestamp;
            let trade_value = fill_price * order.quantity;
            let fee = self.fees.fee(trade_value);

            match order.side {
                Side::Buy => {
                    let total_cost = trade_value + fee;
                    if total_cost > remaining_cash {
                        reports.push(ExecutionReport::rejected(
                            order.ticker.clone(),
                            order.side,
                            "not enough cash available for buy",
                            order.signal_reason.clone(),
                            ctx.cur_time,
                        ));
                        continue;
                    }
                    remaining_cash -= total_cost;
                }
                Side::Sell => {
                    remaining_cash += trade_value - fee;
                }
            }

            debug!(
                ticker = %order.ticker,
                side = %order.side,
                price = %fill_price,
                qty = %order.quantity,
                fee = %fee,
                "filled at next open"
            );
            reports.push(ExecutionReport::from_fills(
                order.ticker.clone(),
                order.side,
                OrderStatus::Filled,
                vec![Fill::new(fill_time, fill_price, order.quantity, fee)],
                Decimal::ZERO,
                order.signal_reason.clone(),
                fill_time,
            ));
        }

        reports
    }
}

/// First candle opening strictly after `cur_time`, if any.
fn next_candle_after(
    cur_time: chrono::DateTime<chrono::Utc>,
    candles: &[Candle],
) -> Option<&Candle> {
    candles.iter().find(|c| c.timestamp > cur_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use replay_core::domain::{Interval, OrderType, PortfolioView};
    use std::collections::BTreeMap;

    fn minute(i: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::minutes(i)
    }

    fn candle(ts: DateTime<Utc>, open: Decimal) -> Candle {
        Candle {
            asset_id: 1,
            ticker: "AMD".into(),
            open,
            close: open,
            high: open,
            low: open,
            volume: dec!(1),
            interval: Interval::OneMinute,
            timestamp: ts,
        }
    }

    fn context<'a>(cash: Decimal, candles: &'a [Candle]) -> ExecutionContext<'a> {
        let mut map: BTreeMap<String, &'a [Candle]> = BTreeMap::new();
        map.insert("AMD".into(), candles);
        ExecutionContext {
            cur_time: minute(0),
            portfolio: PortfolioView {
                cash,
                positions: BTreeMap::new(),
                time: minute(0),
            },
            candles: map,
        }
    }

    fn order(side: Side, qty: Decimal) -> Order {
        Order::new("AMD", dec!(100), qty, OrderType::Limit, side, "breakout", minute(0))
    }

    // ── Fee schedules ───────────────────────────────────────────────────

    #[test]
    fn netherlands_fee_clamps_to_minimum() {
        // 0.05% of 1000 = 0.50, below the 1.70 floor.
        assert_eq!(
            FeeSchedule::IbkrNetherlandsFixedUsd.fee(dec!(1000)),
            dec!(1.70)
        );
    }

    #[test]
    fn netherlands_fee_proportional_in_band() {
        // 0.05% of 10000 = 5.00.
        assert_eq!(
            FeeSchedule::IbkrNetherlandsFixedUsd.fee(dec!(10000)),
            dec!(5.0000)
        );
    }

    #[test]
    fn netherlands_fee_clamps_to_maximum() {
        // 0.05% of 100000 = 50, above the 39 cap.
        assert_eq!(
            FeeSchedule::IbkrNetherlandsFixedUsd.fee(dec!(100000)),
            dec!(39)
        );
    }

    #[test]
    fn forex_fee_has_a_floor() {
        assert_eq!(FeeSchedule::IbkrForexTier1Usd.fee(dec!(1000)), dec!(2.00));
        assert_eq!(
            FeeSchedule::IbkrForexTier1Usd.fee(dec!(1000000)),
            dec!(20.00000)
        );
    }

    #[test]
    fn zero_trade_value_is_free() {
        assert_eq!(FeeSchedule::IbkrNetherlandsFixedUsd.fee(dec!(0)), dec!(0));
        assert_eq!(FeeSchedule::Free.fee(dec!(12345)), dec!(0));
    }

    // ── Execution ───────────────────────────────────────────────────────

    #[test]
    fn fills_at_next_open_after_cur_time() {
        let candles = vec![candle(minute(0), dec!(100)), candle(minute(1), dec!(105))];
        let ctx = context(dec!(100000), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(&[order(Side::Buy, dec!(10))], &ctx);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.fills.len(), 1);
        // The candle at minute 0 is not strictly after cur_time.
        assert_eq!(report.fills[0].price, dec!(105));
        assert_eq!(report.fills[0].time, minute(1));
        assert_eq!(report.report_time, minute(1));
        assert_eq!(report.total_filled_qty, dec!(10));
    }

    #[test]
    fn rejects_when_no_future_candle() {
        let candles = vec![candle(minute(0), dec!(100))];
        let ctx = context(dec!(100000), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(&[order(Side::Buy, dec!(10))], &ctx);
        assert_eq!(reports[0].status, OrderStatus::Rejected);
        assert_eq!(
            reports[0].reject_reason,
            "no future candle available for execution"
        );
        assert_eq!(reports[0].report_time, minute(0));
    }

    #[test]
    fn rejects_when_no_window_for_ticker() {
        let ctx = context(dec!(100000), &[]);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(&[order(Side::Buy, dec!(10))], &ctx);
        assert_eq!(reports[0].status, OrderStatus::Rejected);
        assert_eq!(reports[0].reject_reason, "no market data for ticker");
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let candles = vec![candle(minute(1), dec!(100))];
        let ctx = context(dec!(100000), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(&[order(Side::Buy, dec!(0))], &ctx);
        assert_eq!(reports[0].status, OrderStatus::Rejected);
        assert_eq!(reports[0].reject_reason, "non-positive order quantity");
    }

    #[test]
    fn buy_exceeding_cash_is_rejected_not_errored() {
        let candles = vec![candle(minute(1), dec!(100))];
        let ctx = context(dec!(500), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(&[order(Side::Buy, dec!(10))], &ctx);
        assert_eq!(reports[0].status, OrderStatus::Rejected);
        assert_eq!(reports[0].reject_reason, "not enough cash available for buy");
    }

    #[test]
    fn batch_tracks_remaining_cash_across_orders() {
        let candles = vec![candle(minute(1), dec!(100))];
        let ctx = context(dec!(1500), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        // First buy consumes 1000; the second needs another 1000 and fails.
        let reports = broker.execute(
            &[order(Side::Buy, dec!(10)), order(Side::Buy, dec!(10))],
            &ctx,
        );
        assert_eq!(reports[0].status, OrderStatus::Filled);
        assert_eq!(reports[1].status, OrderStatus::Rejected);
    }

    #[test]
    fn sell_proceeds_replenish_batch_cash() {
        let candles = vec![candle(minute(1), dec!(100))];
        let ctx = context(dec!(0), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::Free);

        let reports = broker.execute(
            &[order(Side::Sell, dec!(10)), order(Side::Buy, dec!(10))],
            &ctx,
        );
        assert_eq!(reports[0].status, OrderStatus::Filled);
        assert_eq!(reports[1].status, OrderStatus::Filled);
    }

    #[test]
    fn fees_flow_into_the_report() {
        let candles = vec![candle(minute(1), dec!(1000))];
        let ctx = context(dec!(100000), &candles);
        let mut broker = NextOpenBroker::new(FeeSchedule::IbkrNetherlandsFixedUsd);

        let reports = broker.execute(&[order(Side::Buy, dec!(10))], &ctx);
        // 0.05% of 10000 = 5.00
        assert_eq!(reports[0].total_fees, dec!(5.0000));
        assert_eq!(reports[0].avg_fill_price, dec!(1000));
    }
}
