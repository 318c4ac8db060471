//! Job progress state machine.
//!
//! `ProgressTracker` owns the single `Progress` record of a job and is its
//! only writer. Every transition and every processed batch pushes a full
//! snapshot through the `ProgressReporter`.
//!
//! Legal walk:
//!
//! ```text
//! not started -> training -> validating -> training -> ... -> validating -> complete
//!                   any non-terminal state -> error
//! ```

use crate::error::{TrainingError, TrainingResult};
use crate::reporter::ProgressReporter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainingStatus {
    #[serde(rename = "not started")]
    NotStarted,
    #[serde(rename = "training")]
    Training,
    #[serde(rename = "validating")]
    Validating,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
}

impl TrainingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Training => "training",
            Self::Validating => "validating",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use TrainingStatus::{Complete, Error, NotStarted, Training, Validating};
        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (NotStarted | Validating, Training) | (Training, Validating) | (Validating, Complete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The loop phase a processed batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Validating,
}

impl Phase {
    #[must_use]
    pub fn status(self) -> TrainingStatus {
        match self {
            Self::Training => TrainingStatus::Training,
            Self::Validating => TrainingStatus::Validating,
        }
    }
}

/// Snapshot of job state, serialized verbatim onto the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub steps_complete: u64,
    pub max_steps: u64,
    pub training_loss: Option<f64>,
    pub validation_loss: Option<f64>,
    pub status: TrainingStatus,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            steps_complete: 0,
            max_steps: 0,
            training_loss: None,
            validation_loss: None,
            status: TrainingStatus::NotStarted,
        }
    }
}

/// `maxSteps` for a job: every train and validation batch of every epoch.
#[must_use]
pub fn max_steps_for(train_batches: usize, val_batches: usize, epochs: u32) -> u64 {
    (train_batches as u64 + val_batches as u64) * u64::from(epochs)
}

pub struct ProgressTracker {
    progress: Progress,
    max_steps_fixed: bool,
    reporter: Arc<ProgressReporter>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<ProgressReporter>) -> Self {
        Self { progress: Progress::default(), max_steps_fixed: false, reporter }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Progress {
        &self.progress
    }

    #[must_use]
    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }

    /// Fix `maxSteps`. Allowed exactly once, before the first step.
    pub fn set_max_steps(&mut self, train_batches: usize, val_batches: usize, epochs: u32) -> TrainingResult<u64> {
        if self.max_steps_fixed || self.progress.steps_complete > 0 {
            return Err(TrainingError::StepAccounting {
                expected: self.progress.max_steps,
                actual: self.progress.steps_complete,
            });
        }
        self.progress.max_steps = max_steps_for(train_batches, val_batches, epochs);
        self.max_steps_fixed = true;
        Ok(self.progress.max_steps)
    }

    pub fn transition_to(&mut self, status: TrainingStatus) -> TrainingResult<()> {
        let from = self.progress.status;
        if !from.can_transition_to(status) {
            return Err(TrainingError::IllegalTransition { from, to: status });
        }
        self.progress.status = status;
        self.push();
        Ok(())
    }

    /// Record one processed batch of `phase` and push the new snapshot.
    pub fn advance_step(&mut self, phase: Phase, loss: f64) -> TrainingResult<()> {
        let status = phase.status();
        if self.progress.status != status {
            return Err(TrainingError::IllegalTransition { from: self.progress.status, to: status });
        }
        self.progress.steps_complete += 1;
        match phase {
            Phase::Training => self.progress.training_loss = Some(loss),
            Phase::Validating => self.progress.validation_loss = Some(loss),
        }
        self.push();
        Ok(())
    }

    /// `stepsComplete` must equal `maxSteps` before `complete` is reached.
    pub fn verify_complete_accounting(&self) -> TrainingResult<()> {
        if self.progress.steps_complete == self.progress.max_steps {
            Ok(())
        } else {
            Err(TrainingError::StepAccounting {
                expected: self.progress.max_steps,
                actual: self.progress.steps_complete,
            })
        }
    }

    /// Best-effort `error` push. No-op once a terminal state was reached.
    pub fn fail(&mut self) {
        if self.progress.status.is_terminal() {
            return;
        }
        self.progress.status = TrainingStatus::Error;
        self.push();
    }

    fn push(&self) {
        debug!(
            steps_complete = self.progress.steps_complete,
            max_steps = self.progress.max_steps,
            status = %self.progress.status,
            "progress"
        );
        self.reporter.publish(&self.progress);
    }
}
