//! Replay runner.
//!
//! Orchestrates single backtest runs over the `replay-core` engine: bulk
//! data loading, collaborator init hooks, the scheduler loop, trade
//! reconstruction, the performance report, and CSV artifacts.

pub mod backtest;
pub mod metrics;
pub mod reporting;
pub mod synthetic;
pub mod trades;

pub use backtest::{Backtest, ReportingConfig};
pub use metrics::Report;
pub use synthetic::SyntheticDataStore;
pub use trades::{pair_executions, Trade};
