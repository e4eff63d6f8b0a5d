use thiserror::Error;
use tradecore_audit::AuditError;
use tradecore_instrument::PortfolioId;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio {0} not found")]
    NotFound(PortfolioId),

    #[error("portfolio {0} is halted pending integrity review")]
    Halted(PortfolioId),

    #[error("insufficient cash: need {needed}, have {available}")]
    InsufficientCash { needed: String, available: String },

    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),

    #[error("repository backend error: {0}")]
    Backend(String),
}
