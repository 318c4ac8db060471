use crate::dataset::DatasetId;
use crate::error::{TrainingError, TrainingResult};
use crate::job::{TrainingConfig, TrainingRunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Weights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrainingMetrics {
    pub train_loss: Option<f64>,
    pub val_loss: Option<f64>,
    pub steps: u64,
    pub max_steps: u64,
}

/// Summary of a finished run, written next to the weights.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: TrainingRunId,
    pub created_at: DateTime<Utc>,
    pub config: TrainingConfig,
    pub dataset_id: DatasetId,
    pub classes: Vec<String>,
    pub split: SplitSizes,
    pub skipped_files: usize,
    pub metrics: TrainingMetrics,
    pub artifacts: Vec<TrainingArtifact>,
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.exists() {
        return Err(TrainingError::Artifact(format!("artifact path does not exist: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Move a fully written staging file into place.
pub fn commit_staged(staging: &Path, target: &Path) -> TrainingResult<()> {
    std::fs::rename(staging, target).map_err(|e| {
        TrainingError::Artifact(format!("failed to move {} into {}: {e}", staging.display(), target.display()))
    })
}
