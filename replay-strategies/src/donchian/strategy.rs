//! Donchian channel breakout over a weekly history window.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use replay_core::domain::{Candle, Interval, Side, Signal};
use replay_core::engine::{ContextWindows, PortfolioApi, Strategy};

/// Smoothing period for the stop-level ATR, independent of the channel
/// lookback. Until enough bars accumulate the ATR is zero and the stop sits
/// at the breakout bar's close.
const ATR_PERIOD: usize = 20;

/// Buys a break of the highest high of the preceding `lookback` completed
/// weekly bars and sells a break of the lowest low, stop-and-reverse style.
///
/// The channel is computed from the instrument's weekly context window when
/// one is configured; otherwise the strategy accumulates the bars it is
/// dispatched and uses those. An ATR(20) stop level is tracked per ticker
/// for downstream inspection.
pub struct DonchianStrategy {
    lookback: usize,
    history: BTreeMap<String, Vec<Candle>>,
    stop_loss: BTreeMap<String, Decimal>,
}

impl DonchianStrategy {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            history: BTreeMap::new(),
            stop_loss: BTreeMap::new(),
        }
    }

    /// Current ATR stop level for a ticker, if one is armed.
    pub fn stop_level(&self, ticker: &str) -> Option<Decimal> {
        self.stop_loss.get(ticker).copied()
    }

    fn channel_bars<'a>(&'a self, candle: &Candle, context: &ContextWindows<'a>) -> &'a [Candle] {
        match context.get(&Interval::Week).copied() {
            Some(window) => window,
            None => self
                .history
                .get(&candle.ticker)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

impl Strategy for DonchianStrategy {
    fn init(&mut self, _api: &dyn PortfolioApi) -> anyhow::Result<()> {
        self.history.clear();
        self.stop_loss.clear();
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, context: &ContextWindows<'_>) -> Vec<Signal> {
        self.history
            .entry(candle.ticker.clone())
            .or_default()
            .push(candle.clone());

        let bars = self.channel_bars(candle, context);
        // Need the channel over completed bars plus the current one for the
        // possible breakout.
        if bars.len() < self.lookback + 1 {
            return Vec::new();
        }
        let completed = &bars[bars.len() - self.lookback - 1..bars.len() - 1];
        let (highest_high, lowest_low) = channel_high_low(completed);

        let mut signals = Vec::new();

        if candle.high > highest_high {
            debug!(ticker = %candle.ticker, level = %highest_high, "upside breakout");
            signals.push(Signal::new(
                candle.ticker.clone(),
                Side::Buy,
                highest_high,
                format!(
                    "break of highest high of preceding {} bars",
                    self.lookback
                ),
                candle.timestamp,
            ));
            let atr = average_true_range(bars, ATR_PERIOD);
            self.stop_loss
                .insert(candle.ticker.clone(), candle.close - atr * dec!(2));
        }

        if candle.low < lowest_low {
            debug!(ticker = %candle.ticker, level = %lowest_low, "downside breakout");
            signals.push(Signal::new(
                candle.ticker.clone(),
                Side::Sell,
                lowest_low,
                format!("break of lowest low of preceding {} bars", self.lookback),
                candle.timestamp,
            ));
            self.stop_loss.insert(candle.ticker.clone(), Decimal::ZERO);
        }

        signals
    }
}

/// Highest high and lowest low over a window.
fn channel_high_low(candles: &[Candle]) -> (Decimal, Decimal) {
    let Some(first) = candles.first() else {
        return (Decimal::ZERO, Decimal::ZERO);
    };

    let mut highest = first.high;
    let mut lowest = first.low;
    for c in candles {
        if c.high > highest {
            highest = c.high;
        }
        if c.low < lowest {
            lowest = c.low;
        }
    }
    (highest, lowest)
}

/// Wilder-smoothed average true range.
fn average_true_range(candles: &[Candle], period: usize) -> Decimal {
    if candles.len() < period + 1 {
        return Decimal::ZERO;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let range = cur.high - cur.low;
        let vs_prev_high = (cur.high - prev.close).abs();
        let vs_prev_low = (cur.low - prev.close).abs();
        true_ranges.push(range.max(vs_prev_high).max(vs_prev_low));
    }

    let period_dec = Decimal::from(period as u64);
    let mut atr: Decimal = true_ranges[..period].iter().copied().sum::<Decimal>() / period_dec;
    for tr in &true_ranges[period..] {
        atr = (atr * (period_dec - Decimal::ONE) + *tr) / period_dec;
    }
    atr
}
