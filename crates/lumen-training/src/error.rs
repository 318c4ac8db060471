use crate::progress::TrainingStatus;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training config: {0}")]
    ConfigValidation(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("invalid split ratios: train={train}, val={val}")]
    InvalidRatio { train: f64, val: f64 },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training step failed: {0}")]
    TrainingStep(String),

    #[error("illegal progress transition: {from} -> {to}")]
    IllegalTransition { from: TrainingStatus, to: TrainingStatus },

    #[error("step accounting mismatch: expected {expected} steps, completed {actual}")]
    StepAccounting { expected: u64, actual: u64 },

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a progress frame did not reach the transport.
///
/// Never fatal: the reporter logs and drops these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("no observer connected")]
    NoPeers,

    #[error("transport closed")]
    Closed,

    #[error("frame encoding failed: {0}")]
    Encode(String),
}
