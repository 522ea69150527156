//! The deterministic simulation loop and its collaborators.

pub mod config;
pub mod cursor;
pub mod portfolio;
pub mod scheduler;
pub mod traits;

use thiserror::Error;

use crate::data::StoreError;
pub use config::{instrument, ExecutionConfig, InstrumentConfig, PortfolioConfig, TimeframeFeed};
pub use portfolio::{Portfolio, PortfolioError, PortfolioInspector, Position};
pub use scheduler::Scheduler;
pub use traits::{
    Allocator, Broker, ContextWindows, ExecutionContext, MarketView, PortfolioApi, SignalMap,
    Strategy,
};

/// Fatal failures of a simulation run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error("run cancelled")]
    Cancelled,
}
