use lumen_training::TrainingError;
use std::path::PathBuf;
use thiserror::Error;

pub type VisionResult<T> = std::result::Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("pretrained weights not found: {0}")]
    PretrainedMissing(PathBuf),

    #[error("pretrained weights {path} have no tensor named {name}")]
    MissingTensor { path: PathBuf, name: String },

    #[error("pretrained tensor {name} does not fit the network: {reason}")]
    TensorMismatch { name: String, reason: String },

    #[error("unsupported device {0:?} (expected auto|cpu|cuda)")]
    Device(String),

    #[error("variable store lock poisoned")]
    Poisoned,
}

impl From<VisionError> for TrainingError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Candle(e) => TrainingError::TrainingStep(e.to_string()),
            VisionError::Image(e) => TrainingError::Dataset(e.to_string()),
            VisionError::Device(_) => TrainingError::ConfigValidation(err.to_string()),
            other => TrainingError::Artifact(other.to_string()),
        }
    }
}
