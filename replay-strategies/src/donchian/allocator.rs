//! Long-only allocator sizing a fixed fraction of cash per signal.

use rust_decimal::Decimal;

use replay_core::domain::{Order, OrderType, PortfolioView, Side};
use replay_core::engine::{Allocator, PortfolioApi, SignalMap};

/// Turns breakout signals into long-only limit orders.
///
/// Per ticker and tick: exactly one signal is acted on (conflicting signals
/// are skipped); a buy when flat opens a position worth `position_percent`
/// of cash, a sell against a long closes it, and a lingering short from a
/// legacy run is closed and optionally flipped long. Shorts are never
/// opened.
pub struct LongOnlyAllocator {
    position_percent: Decimal,
}

impl LongOnlyAllocator {
    pub fn new(position_percent: Decimal) -> Self {
        Self { position_percent }
    }

    fn quantity_for(&self, price: Decimal, cash: Decimal) -> Decimal {
        if price.is_zero() {
            return Decimal::ZERO;
        }
        (cash * self.position_percent / price).floor()
    }
}

impl Allocator for LongOnlyAllocator {
    fn init(&mut self, _api: &dyn PortfolioApi) -> anyhow::Result<()> {
        Ok(())
    }

    fn allocate(&mut self, signals: &SignalMap, view: &PortfolioView) -> Vec<Order> {
        let mut orders = Vec::new();

        for (ticker, ticker_signals) in signals {
            // Skip tickers with no signal or conflicting signals this tick.
            let [signal] = ticker_signals.as_slice() else {
                continue;
            };

            let held = view
                .positions
                .get(ticker)
                .map(|p| p.quantity)
                .unwrap_or(Decimal::ZERO);

            if held.is_zero() {
                if signal.side != Side::Buy {
                    continue;
                }
                let qty = self.quantity_for(signal.price, view.cash);
                if qty.is_zero() {
                    continue;
                }
                orders.push(Order::new(
                    ticker.clone(),
                    signal.price,
                    qty,
                    OrderType::Limit,
                    Side::Buy,
                    format!("no existing position (long-only): {}", signal.reason),
                    signal.created_at,
                ));
            } else if held > Decimal::ZERO {
                if signal.side != Side::Sell {
                    continue;
                }
                orders.push(Order::new(
                    ticker.clone(),
                    signal.price,
                    held,
                    OrderType::Limit,
                    Side::Sell,
                    format!("closing long (long-only): {}", signal.reason),
                    signal.created_at,
                ));
            } else {
                // Legacy short: close it on a buy signal, never add to it.
                if signal.side != Side::Buy {
                    continue;
                }
                orders.push(Order::new(
                    ticker.clone(),
                    signal.price,
                    held.abs(),
                    OrderType::Limit,
                    Side::Buy,
                    format!("closing short (long-only): {}", signal.reason),
                    signal.created_at,
                ));
                let qty = self.quantity_for(signal.price, view.cash);
                if !qty.is_zero() {
                    orders.push(Order::new(
                        ticker.clone(),
                        signal.price,
                        qty,
                        OrderType::Limit,
                        Side::Buy,
                        format!("opening long after closing short: {}", signal.reason),
                        signal.created_at,
                    ));
                }
            }
        }

        orders
    }
}
