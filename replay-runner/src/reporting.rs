//! CSV report artifacts: the trade tape and the portfolio snapshot log.
//!
//! Writers render into an in-memory buffer; the file wrappers create the
//! target directory and write both artifacts for a run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rust_decimal::Decimal;
use tracing::info;

use replay_core::domain::PortfolioView;

use crate::backtest::ReportingConfig;
use crate::trades::Trade;

/// Render the paired trade list as CSV. Each populated leg becomes one row;
/// partial trades emit only their populated side.
pub fn trades_csv(trades: &[Trade]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer.write_record([
        "trade_id",
        "leg",
        "ticker",
        "side",
        "status",
        "total_filled_qty",
        "avg_fill_price",
        "total_fees",
        "remaining_qty",
        "num_fills",
        "reject_reason",
        "report_time",
    ])?;

    for (trade_id, trade) in trades.iter().enumerate() {
        for (leg, report) in [("buy", &trade.buy), ("sell", &trade.sell)] {
            let Some(report) = report else {
                continue;
            };
            writer.write_record(&[
                trade_id.to_string(),
                leg.to_string(),
                report.ticker.clone(),
                report.side.to_string(),
                report.status.to_string(),
                report.total_filled_qty.to_string(),
                report.avg_fill_price.to_string(),
                report.total_fees.to_string(),
                report.remaining_qty.to_string(),
                report.fills.len().to_string(),
                report.reject_reason.clone(),
                report
                    .report_time
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ])?;
        }
    }

    let data = writer.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Render the snapshot log as CSV with two-fraction-digit, banker-rounded
/// decimal columns.
pub fn portfolio_csv(snapshots: &[PortfolioView]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer.write_record([
        "snapshot_time",
        "cash",
        "positions_value",
        "total_portfolio_value",
        "num_positions",
    ])?;

    for view in snapshots {
        let positions_value = view.positions_value();
        writer.write_record(&[
            view.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            fixed2(view.cash),
            fixed2(positions_value),
            fixed2(view.cash + positions_value),
            view.positions.len().to_string(),
        ])?;
    }

    let data = writer.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `<report_name>_trades.csv` and `<report_name>_portfolio.csv` into
/// the configured directory, creating it if needed.
pub fn write_report_files(
    config: &ReportingConfig,
    trades: &[Trade],
    snapshots: &[PortfolioView],
) -> Result<()> {
    fs::create_dir_all(&config.file_path).with_context(|| {
        format!(
            "failed to create report directory {}",
            config.file_path.display()
        )
    })?;

    let trades_path = config
        .file_path
        .join(format!("{}_trades.csv", config.report_name));
    write_artifact(&trades_path, &trades_csv(trades)?)?;

    let portfolio_path = config
        .file_path
        .join(format!("{}_portfolio.csv", config.report_name));
    write_artifact(&portfolio_path, &portfolio_csv(snapshots)?)?;

    info!(
        trades = %trades_path.display(),
        portfolio = %portfolio_path.display(),
        "wrote report artifacts"
    );
    Ok(())
}

fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Two fractional digits, banker-rounded.
fn fixed2(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
