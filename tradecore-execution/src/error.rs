use thiserror::Error;
use tradecore_audit::AuditError;
use tradecore_instrument::OrderId;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {0} is already in a terminal state")]
    Terminal(OrderId),

    #[error("invalid transition on order {order}: {event} from {from}")]
    InvalidTransition { order: OrderId, event: String, from: String },

    #[error("broker error: {0}")]
    Broker(String),

    #[error("broker connectivity error: {0}")]
    Connectivity(String),

    #[error("deadline exceeded waiting on order {0}")]
    DeadlineExceeded(OrderId),

    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),
}

impl tradecore_integration::Unrecoverable for ExecutionError {
    fn is_unrecoverable(&self) -> bool {
        !matches!(self, ExecutionError::Connectivity(_))
    }
}
