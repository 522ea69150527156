//! Replay CLI: runs the Donchian demo against synthetic data and prints the
//! trading report. CSV artifacts land in `reports/`.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

use replay_core::domain::Interval;
use replay_core::engine::{instrument, ExecutionConfig, PortfolioConfig};
use replay_runner::{Backtest, ReportingConfig, SyntheticDataStore};
use replay_strategies::donchian::{
    DonchianStrategy, FeeSchedule, LongOnlyAllocator, NextOpenBroker,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

    let instruments = vec![
        instrument("AMD", start, end, Interval::OneHour).add_context(Interval::Week),
        instrument("COST", start, end, Interval::OneHour),
    ];

    let backtest = Backtest::new(
        instruments,
        ExecutionConfig::new(Interval::OneHour, 24, 24),
        ReportingConfig::new(dec!(0.03), true, "donchian", "reports"),
        Box::new(DonchianStrategy::new(4)),
        Box::new(LongOnlyAllocator::new(dec!(0.1))),
        Box::new(NextOpenBroker::new(FeeSchedule::IbkrNetherlandsFixedUsd)),
        PortfolioConfig::new(dec!(2000), false),
        Box::new(SyntheticDataStore::new(1337)),
    );

    let report = backtest.run()?;
    println!("{report}");
    Ok(())
}
