use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier for a training run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingRunId(pub String);

impl TrainingRunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Supported pretrained network families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "alexnet")]
    AlexNet,
    #[serde(rename = "resnet")]
    ResNet,
    #[serde(rename = "vgg")]
    Vgg,
}

impl Architecture {
    pub const ALL: [Architecture; 3] = [Architecture::AlexNet, Architecture::ResNet, Architecture::Vgg];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::AlexNet => "alexnet",
            Self::ResNet => "resnet",
            Self::Vgg => "vgg",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Architecture {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.tag() == s)
            .ok_or_else(|| TrainingError::UnsupportedArchitecture(s.to_string()))
    }
}

/// Wire form of the job payload. Only the canonical field names are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTrainingConfig {
    architecture: String,
    epoch_count: serde_json::Value,
    learning_rate: serde_json::Value,
    #[serde(default)]
    fine_tune_backbone: bool,
}

/// Immutable job parameters, validated once at load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub architecture: Architecture,
    pub epoch_count: u32,
    pub learning_rate: f64,
    /// When false only the replaced classification head is trained.
    pub fine_tune_backbone: bool,
}

impl TrainingConfig {
    pub fn new(architecture: Architecture, epoch_count: u32, learning_rate: f64) -> TrainingResult<Self> {
        let config = Self { architecture, epoch_count, learning_rate, fine_tune_backbone: false };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON job payload.
    ///
    /// Malformed, missing or out-of-range fields are `ConfigValidation`; an
    /// unknown architecture tag is `UnsupportedArchitecture`.
    pub fn from_json(payload: &str) -> TrainingResult<Self> {
        let raw: RawTrainingConfig = serde_json::from_str(payload.trim())
            .map_err(|e| TrainingError::ConfigValidation(e.to_string()))?;

        let epoch_count = raw
            .epoch_count
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                TrainingError::ConfigValidation(format!(
                    "epochCount must be a positive integer, got {}",
                    raw.epoch_count
                ))
            })?;
        let learning_rate = raw.learning_rate.as_f64().ok_or_else(|| {
            TrainingError::ConfigValidation(format!("learningRate must be a number, got {}", raw.learning_rate))
        })?;

        let config = Self {
            architecture: raw.architecture.parse()?,
            epoch_count,
            learning_rate,
            fine_tune_backbone: raw.fine_tune_backbone,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.epoch_count == 0 {
            return Err(TrainingError::ConfigValidation("epochCount must be >= 1".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::ConfigValidation("learningRate must be > 0".to_string()));
        }
        Ok(())
    }
}
