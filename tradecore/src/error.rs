use thiserror::Error;
use tradecore_audit::AuditError;
use tradecore_data::DataError;
use tradecore_execution::ExecutionError;
use tradecore_portfolio::PortfolioError;
use tradecore_predict::PredictError;

use crate::config::ConfigError;

/// Top-level error surface the binary's subcommands return. Each variant
/// maps to one of the exit codes a CLI caller scripts against (§6): `0`
/// success, `1` generic failure, `2` configuration error, `3`
/// data-integrity failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl AppError {
    /// Process exit code per the CLI surface's documented contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Audit(AuditError::BrokenChain { .. } | AuditError::TamperedRecord { .. }) => 3,
            AppError::Portfolio(PortfolioError::Halted(_)) => 3,
            _ => 1,
        }
    }
}
