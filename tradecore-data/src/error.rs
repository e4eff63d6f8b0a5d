use thiserror::Error;
use tradecore_instrument::timeframe::TimeframeError;
use tradecore_integration::Unrecoverable;

/// Typed error surface for Provider Adapters and the Market-Data Hub (§7).
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("unsupported timeframe: {0}")]
    UnsupportedTimeframe(#[from] TimeframeError),

    #[error("upstream provider error: {0}")]
    Upstream(String),

    #[error("subscription stream closed")]
    Closed,

    #[error("requested range is invalid: start {0} >= end {1}")]
    InvalidRange(String, String),
}

impl Unrecoverable for DataError {
    fn is_unrecoverable(&self) -> bool {
        !matches!(self, DataError::Upstream(_))
    }
}
