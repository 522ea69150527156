//! Data store trait and structured error types.
//!
//! The `DataStore` trait abstracts over candle sources so the engine can be
//! fed from a database, flat files, or generated data, and mocked in tests.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::domain::{Asset, Candle, Interval};

/// Structured errors for data operations.
///
/// Transport failures from a concrete store are propagated verbatim through
/// the `Transport` variant.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("interval not supported: {label}")]
    IntervalNotSupported { label: String },

    #[error("asset not found: {ticker}")]
    AssetNotFound { ticker: String },

    #[error("no candles for {ticker} at {interval}")]
    NoCandles { ticker: String, interval: Interval },

    #[error("load cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Source of assets and pre-aggregated candles.
///
/// `get_aggregates` must return candles strictly increasing in timestamp,
/// all tagged with the requested interval. Long-running fetches should poll
/// the cancel token and bail out with [`StoreError::Cancelled`].
pub trait DataStore {
    fn get_asset_by_ticker(&self, ticker: &str) -> Result<Asset, StoreError>;

    #[allow(clippy::too_many_arguments)]
    fn get_aggregates(
        &self,
        asset_id: i64,
        ticker: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<Candle>, StoreError>;
}
