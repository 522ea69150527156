//! Engine facade: bulk data loading, init hooks, the scheduler run, and
//! report emission.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use replay_core::cancel::CancelToken;
use replay_core::data::{DataStore, StoreError};
use replay_core::engine::{
    Allocator, Broker, ExecutionConfig, InstrumentConfig, Portfolio, PortfolioConfig,
    PortfolioInspector, Scheduler, Strategy,
};

use crate::metrics::Report;
use crate::reporting::write_report_files;
use crate::trades::pair_executions;

/// Report parameters: the Sharpe risk-free rate and the optional CSV
/// artifact emission.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfig {
    pub sharpe_annual_risk_free: Decimal,
    pub write_trades_file: bool,
    pub report_name: String,
    pub file_path: PathBuf,
}

impl ReportingConfig {
    pub fn new(
        sharpe_annual_risk_free: Decimal,
        write_trades_file: bool,
        report_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sharpe_annual_risk_free,
            write_trades_file,
            report_name: report_name.into(),
            file_path: file_path.into(),
        }
    }
}

/// One fully wired backtest run.
///
/// Owns the configs and the collaborator trait objects; `run` consumes the
/// backtest, so a fresh one is built per run.
pub struct Backtest {
    instruments: Vec<InstrumentConfig>,
    execution: ExecutionConfig,
    reporting: ReportingConfig,
    strategy: Box<dyn Strategy>,
    allocator: Box<dyn Allocator>,
    broker: Box<dyn Broker>,
    portfolio_config: PortfolioConfig,
    store: Box<dyn DataStore>,
}

impl Backtest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instruments: Vec<InstrumentConfig>,
        execution: ExecutionConfig,
        reporting: ReportingConfig,
        strategy: Box<dyn Strategy>,
        allocator: Box<dyn Allocator>,
        broker: Box<dyn Broker>,
        portfolio_config: PortfolioConfig,
        store: Box<dyn DataStore>,
    ) -> Self {
        Self {
            instruments,
            execution,
            reporting,
            strategy,
            allocator,
            broker,
            portfolio_config,
            store,
        }
    }

    pub fn run(self) -> Result<Report> {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Load every feed, run the simulation, and produce the report.
    ///
    /// No artifacts are written when the run aborts; the single returned
    /// error carries the failure.
    pub fn run_with_cancel(mut self, cancel: &CancelToken) -> Result<Report> {
        load_feeds(
            self.store.as_ref(),
            &mut self.instruments,
            &mut self.execution,
            cancel,
        )
        .context("data load failed")?;

        let mut scheduler = Scheduler::new(self.instruments, self.execution);
        let mut portfolio = Portfolio::new(&self.portfolio_config);

        {
            let market = scheduler.market_view();
            let inspector = PortfolioInspector {
                portfolio: &portfolio,
                market: &market,
            };
            self.strategy
                .init(&inspector)
                .context("strategy init failed")?;
            self.allocator
                .init(&inspector)
                .context("allocator init failed")?;
        }

        scheduler.run(
            &mut portfolio,
            self.strategy.as_mut(),
            self.allocator.as_mut(),
            self.broker.as_mut(),
            cancel,
        )?;

        let trades = pair_executions(portfolio.executions());
        let report = Report::compute(
            &trades,
            portfolio.snapshots(),
            scheduler.start(),
            scheduler.current_time(),
            self.reporting.sharpe_annual_risk_free,
        );

        if self.reporting.write_trades_file {
            write_report_files(&self.reporting, &trades, portfolio.snapshots())?;
        }

        Ok(report)
    }
}

/// Materialize every instrument's primary and context feeds plus the
/// execution feed, one instrument batch at a time.
fn load_feeds(
    store: &dyn DataStore,
    instruments: &mut [InstrumentConfig],
    execution: &mut ExecutionConfig,
    cancel: &CancelToken,
) -> Result<(), StoreError> {
    for inst in instruments.iter_mut() {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let asset = store.get_asset_by_ticker(&inst.ticker)?;
        inst.primary.candles = store.get_aggregates(
            asset.id,
            &inst.ticker,
            inst.primary_interval,
            inst.start,
            inst.end,
            cancel,
        )?;

        let (start, end) = (inst.start, inst.end);
        let ticker = inst.ticker.clone();
        for feed in &mut inst.context {
            feed.candles =
                store.get_aggregates(asset.id, &ticker, feed.interval, start, end, cancel)?;
        }

        let execution_candles = store.get_aggregates(
            asset.id,
            &inst.ticker,
            execution.interval,
            inst.start,
            inst.end,
            cancel,
        )?;
        execution.candles.insert(inst.ticker.clone(), execution_candles);

        info!(
            ticker = %inst.ticker,
            primary_bars = inst.primary.candles.len(),
            context_feeds = inst.context.len(),
            "loaded instrument feeds"
        );
    }
    Ok(())
}
