use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tradecore_instrument::PredictorId;

/// Model family, per §3. The runtime loader routes on this field; only
/// [`crate::runtime::LinearPredictorRuntime`] is wired up today, but every
/// kind resolves through the same [`crate::runtime::RuntimeLoader`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictorKind {
    Lstm,
    Cnn,
    Transformer,
    RlPpo,
    RlA2c,
    RlDqn,
    RlSac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorStatus {
    Created,
    Training,
    Trained,
    Error,
}

/// Feature/target standardization parameters fit at training time and
/// applied verbatim at inference time (§4.E: "scale using the artifact's
/// `scaler_params`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    pub feature_mean: Vec<f64>,
    pub feature_std: Vec<f64>,
    pub target_mean: f64,
    pub target_std: f64,
}

impl ScalerParams {
    pub fn scale_features(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.feature_mean.iter())
            .zip(self.feature_std.iter())
            .map(|((x, mean), std)| if *std == 0.0 { 0.0 } else { (x - mean) / std })
            .collect()
    }

    pub fn inverse_scale_target(&self, scaled: f64) -> f64 {
        scaled * self.target_std + self.target_mean
    }
}

/// `{id, kind, feature_list, input_shape, scaler_params, model_blob_ref,
/// metrics, status, created_at, updated_at}` per §3. Mutable only via
/// [`crate::registry::PredictorRegistry`] operations; `model_blob_ref` is
/// content-addressed and immutable once `status == Trained`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorArtifact {
    pub id: PredictorId,
    pub kind: PredictorKind,
    pub feature_list: Vec<String>,
    pub input_shape: Vec<usize>,
    pub scaler_params: Option<ScalerParams>,
    pub model_blob_ref: Option<String>,
    pub metrics: HashMap<String, f64>,
    pub status: PredictorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
