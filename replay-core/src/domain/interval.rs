//! Bar intervals and their fixed durations.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Candle interval, from one minute up to one month.
///
/// Every interval through one day maps to a fixed elapsed duration. `Week`
/// and `Month` are feed-selection labels: calendar-length bars have no fixed
/// duration, so [`Interval::duration`] reports zero and their close time
/// equals their open time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1M")]
    Month,
}

impl Interval {
    /// Elapsed time covered by one bar of this interval.
    ///
    /// Zero for `Week` and `Month`, which close at their own open timestamp.
    pub fn duration(self) -> Duration {
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::ThreeMinutes => Duration::minutes(3),
            Interval::FiveMinutes => Duration::minutes(5),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::ThirtyMinutes => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
            Interval::TwoHours => Duration::hours(2),
            Interval::FourHours => Duration::hours(4),
            Interval::Day => Duration::hours(24),
            Interval::Week | Interval::Month => Duration::zero(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::Day => "1d",
            Interval::Week => "1w",
            Interval::Month => "1M",
        }
    }

    /// Parse a label such as `"15m"` or `"1d"`.
    pub fn from_label(label: &str) -> Option<Interval> {
        match label {
            "1m" => Some(Interval::OneMinute),
            "3m" => Some(Interval::ThreeMinutes),
            "5m" => Some(Interval::FiveMinutes),
            "15m" => Some(Interval::FifteenMinutes),
            "30m" => Some(Interval::ThirtyMinutes),
            "1h" => Some(Interval::OneHour),
            "2h" => Some(Interval::TwoHours),
            "4h" => Some(Interval::FourHours),
            "1d" => Some(Interval::Day),
            "1w" => Some(Interval::Week),
            "1M" => Some(Interval::Month),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
