//! Deterministic synthetic candle source for demos and tests.
//!
//! A seeded random walk per (ticker, interval) pair: the same seed always
//! produces the same feed, so demo runs and golden tests are reproducible
//! without any market data on disk.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use replay_core::cancel::CancelToken;
use replay_core::data::{DataStore, StoreError};
use replay_core::domain::{Asset, AssetKind, Candle, Interval};

/// In-memory [`DataStore`] producing seeded random-walk candles.
#[derive(Debug, Clone)]
pub struct SyntheticDataStore {
    seed: u64,
    initial_price: Decimal,
}

impl SyntheticDataStore {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            initial_price: dec!(100),
        }
    }

    pub fn with_initial_price(seed: u64, initial_price: Decimal) -> Self {
        Self {
            seed,
            initial_price,
        }
    }
}

impl DataStore for SyntheticDataStore {
    fn get_asset_by_ticker(&self, ticker: &str) -> Result<Asset, StoreError> {
        if ticker.is_empty() {
            return Err(StoreError::AssetNotFound {
                ticker: ticker.to_string(),
            });
        }
        Ok(Asset {
            id: stable_id(ticker),
            ticker: ticker.to_string(),
            name: format!("{ticker} (synthetic)"),
            kind: AssetKind::Stock,
        })
    }

    fn get_aggregates(
        &self,
        _asset_id: i64,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>, StoreError> {
        let spacing = bar_spacing(interval);
        let mut rng = feed_rng(self.seed, ticker, interval);

        let mut candles = Vec::new();
        let mut price = self.initial_price.to_f64().unwrap_or(100.0);
        let mut timestamp = start;

        while timestamp < end {
            if candles.len() % 4096 == 0 && cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let open_px = price;
            let drift = 0.0002;
            let noise: f64 = rng.gen_range(-0.02..0.02);
            let close_px = open_px * (1.0 + drift + noise);
            let wick_up: f64 = rng.gen_range(0.0..0.01);
            let wick_down: f64 = rng.gen_range(0.0..0.01);
            let high_px = open_px.max(close_px) * (1.0 + wick_up);
            let low_px = open_px.min(close_px) * (1.0 - wick_down);
            let volume: f64 = rng.gen_range(1_000.0..1_000_000.0);

            // Re-clamp after rounding so the OHLC invariants survive the
            // decimal conversion.
            let open = to_price(open_px);
            let close = to_price(close_px);
            let high = to_price(high_px).max(open).max(close);
            let low = to_price(low_px).min(open).min(close);

            candles.push(Candle {
                asset_id: stable_id(ticker),
                ticker: ticker.to_string(),
                open,
                close,
                high,
                low,
                volume: to_price(volume),
                interval,
                timestamp,
            });

            price = close_px;
            timestamp = timestamp + spacing;
        }

        if candles.is_empty() {
            return Err(StoreError::NoCandles {
                ticker: ticker.to_string(),
                interval,
            });
        }
        Ok(candles)
    }
}

/// Candle spacing for generation; calendar intervals get their nominal
/// length here even though their close time is their open time.
fn bar_spacing(interval: Interval) -> Duration {
    match interval {
        Interval::Week => Duration::weeks(1),
        Interval::Month => Duration::days(30),
        other => other.duration(),
    }
}

fn feed_rng(seed: u64, ticker: &str, interval: Interval) -> ChaCha8Rng {
    let mix = stable_id(ticker) as u64 ^ ((interval as u64) << 32);
    ChaCha8Rng::seed_from_u64(seed ^ mix)
}

/// Stable numeric id per ticker.
fn stable_id(ticker: &str) -> i64 {
    ticker
        .bytes()
        .fold(7i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64))
        .abs()
}

fn to_price(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: i64) -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + Duration::days(i)
    }

    #[test]
    fn same_seed_same_feed() {
        let store = SyntheticDataStore::new(42);
        let cancel = CancelToken::new();
        let a = store
            .get_aggregates(1, "AMD", Interval::Day, day(0), day(30), &cancel)
            .unwrap();
        let b = store
            .get_aggregates(1, "AMD", Interval::Day, day(0), day(30), &cancel)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_tickers_diverge() {
        let store = SyntheticDataStore::new(42);
        let cancel = CancelToken::new();
        let a = store
            .get_aggregates(1, "AMD", Interval::Day, day(0), day(30), &cancel)
            .unwrap();
        let b = store
            .get_aggregates(2, "COST", Interval::Day, day(0), day(30), &cancel)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn feeds_are_strictly_increasing_and_valid() {
        let store = SyntheticDataStore::new(7);
        let cancel = CancelToken::new();
        let candles = store
            .get_aggregates(1, "SPY", Interval::OneHour, day(0), day(10), &cancel)
            .unwrap();

        assert_eq!(candles.len(), 240);
        for pair in candles.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for candle in &candles {
            candle.validate().unwrap();
            assert_eq!(candle.interval, Interval::OneHour);
        }
    }

    #[test]
    fn empty_range_yields_no_candles_error() {
        let store = SyntheticDataStore::new(7);
        let err = store
            .get_aggregates(1, "SPY", Interval::Day, day(10), day(10), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::NoCandles { .. }));
    }

    #[test]
    fn cancelled_token_aborts_generation() {
        let store = SyntheticDataStore::new(7);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = store
            .get_aggregates(1, "SPY", Interval::OneMinute, day(0), day(365), &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }

    #[test]
    fn unknown_ticker_is_rejected() {
        let store = SyntheticDataStore::new(7);
        assert!(matches!(
            store.get_asset_by_ticker(""),
            Err(StoreError::AssetNotFound { .. })
        ));
    }
}
