use thiserror::Error;
use tradecore_data::DataError;
use tradecore_instrument::PredictorId;
use tradecore_integration::Unrecoverable;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("predictor {0} not found")]
    NotFound(PredictorId),

    #[error("predictor {0} is not trained")]
    NotTrained(PredictorId),

    #[error("market data error: {0}")]
    Data(#[from] DataError),

    #[error("registry i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry manifest corrupt: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("runtime invocation failed: {0}")]
    Runtime(String),

    #[error("insufficient bars for feature window: need {needed}, have {available}")]
    InsufficientBars { needed: usize, available: usize },
}

impl Unrecoverable for PredictError {
    fn is_unrecoverable(&self) -> bool {
        !matches!(self, PredictError::Data(DataError::Upstream(_)))
    }
}
