//! OHLCV candles tagged with asset, interval, and open timestamp.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Interval;

/// Single OHLCV bar.
///
/// `timestamp` is the bar's open time; the bar becomes final at
/// [`Candle::close_time`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub asset_id: i64,
    pub ticker: String,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    pub interval: Interval,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    /// The instant at which this bar becomes final.
    pub fn close_time(&self) -> DateTime<Utc> {
        self.timestamp + self.interval.duration()
    }

    /// Validate bar invariants.
    pub fn validate(&self) -> Result<(), CandleError> {
        if self.high < self.low {
            return Err(CandleError::InvertedRange {
                high: self.high,
                low: self.low,
            });
        }
        if self.open.is_sign_negative()
            || self.close.is_sign_negative()
            || self.high.is_sign_negative()
            || self.low.is_sign_negative()
        {
            return Err(CandleError::NegativePrice);
        }
        if self.volume.is_sign_negative() {
            return Err(CandleError::NegativeVolume);
        }
        if self.open < self.low || self.open > self.high {
            return Err(CandleError::OpenOutOfRange);
        }
        if self.close < self.low || self.close > self.high {
            return Err(CandleError::CloseOutOfRange);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CandleError {
    #[error("inverted bar range: high={high}, low={low}")]
    InvertedRange { high: Decimal, low: Decimal },

    #[error("negative price not allowed")]
    NegativePrice,

    #[error("negative volume not allowed")]
    NegativeVolume,

    #[error("open price outside high/low range")]
    OpenOutOfRange,

    #[error("close price outside high/low range")]
    CloseOutOfRange,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            asset_id: 1,
            ticker: "AAPL".into(),
            open,
            close,
            high,
            low,
            volume: dec!(1000),
            interval: Interval::OneHour,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn close_time_adds_interval_duration() {
        let c = candle(dec!(100), dec!(105), dec!(95), dec!(102));
        assert_eq!(
            c.close_time(),
            Utc.with_ymd_and_hms(2024, 1, 2, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekly_candle_closes_at_open_time() {
        let mut c = candle(dec!(100), dec!(105), dec!(95), dec!(102));
        c.interval = Interval::Week;
        assert_eq!(c.close_time(), c.timestamp);
    }

    #[test]
    fn validate_accepts_well_formed_bar() {
        let c = candle(dec!(100), dec!(105), dec!(95), dec!(102));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let c = candle(dec!(100), dec!(99), dec!(101), dec!(100));
        assert!(matches!(c.validate(), Err(CandleError::InvertedRange { .. })));
    }

    #[test]
    fn validate_rejects_close_outside_range() {
        let c = candle(dec!(100), dec!(105), dec!(95), dec!(110));
        assert!(matches!(c.validate(), Err(CandleError::CloseOutOfRange)));
    }
}
