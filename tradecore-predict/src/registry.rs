use crate::artifact::{PredictorArtifact, PredictorKind, PredictorStatus, ScalerParams};
use crate::error::PredictError;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use tradecore_instrument::PredictorId;

/// CRUD over [`PredictorArtifact`] (§4.D). The manifest on disk
/// (`registry.json`) is the durable source of truth; an in-memory
/// [`RwLock`]ed copy serves reads without touching the filesystem on the
/// hot path. Writers are serialized by `write_lock`, and every write goes
/// to a temp file followed by an atomic rename so a reader never observes
/// a torn manifest — the "file-level write lock" and "consistent snapshot"
/// guarantees of §4.D.
pub struct PredictorRegistry {
    path: PathBuf,
    write_lock: AsyncMutex<()>,
    artifacts: RwLock<HashMap<PredictorId, PredictorArtifact>>,
}

impl PredictorRegistry {
    /// Load `path` if it exists, otherwise start with an empty manifest.
    pub async fn open(path: PathBuf) -> Result<Self, PredictError> {
        let artifacts = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            serde_json::from_slice(&bytes)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            write_lock: AsyncMutex::new(()),
            artifacts: RwLock::new(artifacts),
        })
    }

    pub fn get(&self, id: &PredictorId) -> Option<PredictorArtifact> {
        self.artifacts.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<PredictorArtifact> {
        self.artifacts.read().values().cloned().collect()
    }

    pub async fn create(
        &self,
        kind: PredictorKind,
        feature_list: Vec<String>,
        input_shape: Vec<usize>,
    ) -> Result<PredictorArtifact, PredictError> {
        let now = Utc::now();
        let artifact = PredictorArtifact {
            id: PredictorId::random(),
            kind,
            feature_list,
            input_shape,
            scaler_params: None,
            model_blob_ref: None,
            metrics: HashMap::new(),
            status: PredictorStatus::Created,
            created_at: now,
            updated_at: now,
        };
        self.insert_and_persist(artifact.clone()).await?;
        info!(predictor_id = %artifact.id, ?kind, "predictor created");
        Ok(artifact)
    }

    /// `created → training`.
    pub async fn start_training(&self, id: &PredictorId) -> Result<PredictorArtifact, PredictError> {
        self.transition(id, |a| {
            a.status = PredictorStatus::Training;
        })
        .await
    }

    /// `training → trained`, fixing `scaler_params` and `model_blob_ref`
    /// immutably from this point on.
    pub async fn mark_trained(
        &self,
        id: &PredictorId,
        scaler_params: ScalerParams,
        model_blob_ref: String,
        metrics: HashMap<String, f64>,
    ) -> Result<PredictorArtifact, PredictError> {
        self.transition(id, move |a| {
            a.status = PredictorStatus::Trained;
            a.scaler_params = Some(scaler_params.clone());
            a.model_blob_ref = Some(model_blob_ref.clone());
            a.metrics = metrics.clone();
        })
        .await
    }

    /// `training → error`.
    pub async fn mark_error(&self, id: &PredictorId, reason: &str) -> Result<PredictorArtifact, PredictError> {
        warn!(predictor_id = %id, reason, "predictor entered error state");
        self.transition(id, |a| {
            a.status = PredictorStatus::Error;
        })
        .await
    }

    pub async fn delete(&self, id: &PredictorId) -> Result<(), PredictError> {
        let _guard = self.write_lock.lock().await;
        {
            let mut artifacts = self.artifacts.write();
            artifacts.remove(id).ok_or(PredictError::NotFound(*id))?;
        }
        self.persist_locked().await
    }

    async fn transition(
        &self,
        id: &PredictorId,
        mutate: impl FnOnce(&mut PredictorArtifact),
    ) -> Result<PredictorArtifact, PredictError> {
        let _guard = self.write_lock.lock().await;
        let updated = {
            let mut artifacts = self.artifacts.write();
            let artifact = artifacts.get_mut(id).ok_or(PredictError::NotFound(*id))?;
            mutate(artifact);
            artifact.updated_at = Utc::now();
            artifact.clone()
        };
        self.persist_locked().await?;
        Ok(updated)
    }

    async fn insert_and_persist(&self, artifact: PredictorArtifact) -> Result<(), PredictError> {
        let _guard = self.write_lock.lock().await;
        self.artifacts.write().insert(artifact.id, artifact);
        self.persist_locked().await
    }

    /// Must be called while holding `write_lock`. Serializes the current
    /// in-memory map and swaps it into place via `rename`, which is atomic
    /// on the same filesystem.
    async fn persist_locked(&self) -> Result<(), PredictError> {
        let snapshot = self.artifacts.read().clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
