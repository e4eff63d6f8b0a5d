use crate::artifact::PredictorArtifact;
use crate::error::PredictError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The "opaque model blob" loaded and invoked for a given `kind` (§4.E).
/// A real tensor-runtime loader (ONNX, libtorch, …) slots in behind this
/// same trait without touching the dispatcher.
pub trait PredictorRuntime: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<f64, PredictError>;
}

/// Loads a [`PredictorRuntime`] for an artifact's `model_blob_ref`, keyed by
/// `kind`.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    async fn load(&self, artifact: &PredictorArtifact) -> Result<Arc<dyn PredictorRuntime>, PredictError>;
}

/// A gradient-free linear model: `predict(x) = weights · x + bias`, grounded
/// on the `Model`/`LinearModel` pair used for Jackbot's strategy signal
/// generation. Stands in for every [`PredictorKind`] today; additional
/// kinds gain a real implementation by adding another [`RuntimeLoader`]
/// arm, not by touching the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPredictorRuntime {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl PredictorRuntime for LinearPredictorRuntime {
    fn predict(&self, features: &[f64]) -> Result<f64, PredictError> {
        if features.len() != self.weights.len() {
            return Err(PredictError::Runtime(format!(
                "feature vector length {} does not match model input width {}",
                features.len(),
                self.weights.len()
            )));
        }
        Ok(self.weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + self.bias)
    }
}

/// Loads every `model_blob_ref` as a JSON-encoded [`LinearPredictorRuntime`]
/// from an in-memory content-addressed store, regardless of `kind`.
#[derive(Default)]
pub struct LinearRuntimeLoader {
    blobs: HashMap<String, LinearPredictorRuntime>,
}

impl LinearRuntimeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_blob(&mut self, content_ref: impl Into<String>, model: LinearPredictorRuntime) {
        self.blobs.insert(content_ref.into(), model);
    }
}

#[async_trait]
impl RuntimeLoader for LinearRuntimeLoader {
    async fn load(&self, artifact: &PredictorArtifact) -> Result<Arc<dyn PredictorRuntime>, PredictError> {
        let model_ref = artifact
            .model_blob_ref
            .as_ref()
            .ok_or_else(|| PredictError::Runtime("artifact has no model_blob_ref".into()))?;
        let model = self
            .blobs
            .get(model_ref)
            .cloned()
            .ok_or_else(|| PredictError::Runtime(format!("unknown model blob: {model_ref}")))?;
        Ok(Arc::new(model))
    }
}
