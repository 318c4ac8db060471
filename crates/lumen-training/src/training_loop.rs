//! Epoch / step orchestration.

use crate::artifacts::commit_staged;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::OutputLayout;
use crate::loader::BatchLoader;
use crate::progress::{Phase, Progress, ProgressTracker, TrainingStatus};
use crate::reporter::ProgressReporter;
use crate::trainer::Classifier;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub progress: Progress,
    pub weights_path: PathBuf,
}

/// Runs once the weights are on disk and before `complete` is pushed.
/// An error here fails the job like any other in-loop error.
pub type Finalizer = Box<dyn FnOnce(&LoopOutcome) -> TrainingResult<()> + Send>;

/// Drives one job: owns the progress tracker and the output layout.
pub struct TrainingLoop {
    tracker: ProgressTracker,
    layout: OutputLayout,
    rng: StdRng,
    finalizer: Option<Finalizer>,
}

impl TrainingLoop {
    #[must_use]
    pub fn new(reporter: Arc<ProgressReporter>, layout: OutputLayout, rng: StdRng) -> Self {
        Self { tracker: ProgressTracker::new(reporter), layout, rng, finalizer: None }
    }

    #[must_use]
    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    #[must_use]
    pub fn progress(&self) -> &Progress {
        self.tracker.snapshot()
    }

    /// Run every epoch, persist the weights and reach `complete`.
    ///
    /// A zero epoch count is rejected before anything is pushed. Any later
    /// failure pushes a best-effort `error` snapshot before it is returned.
    pub async fn run(
        &mut self,
        model: &mut dyn Classifier,
        train: &BatchLoader,
        val: &BatchLoader,
        epochs: u32,
        learning_rate: f64,
    ) -> TrainingResult<LoopOutcome> {
        if epochs == 0 {
            return Err(TrainingError::ConfigValidation("epochCount must be >= 1".to_string()));
        }
        match self.drive(model, train, val, epochs, learning_rate).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, steps_complete = self.tracker.snapshot().steps_complete, "training aborted");
                self.tracker.fail();
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        model: &mut dyn Classifier,
        train: &BatchLoader,
        val: &BatchLoader,
        epochs: u32,
        learning_rate: f64,
    ) -> TrainingResult<LoopOutcome> {
        let max_steps = self.tracker.set_max_steps(train.num_batches(), val.num_batches(), epochs)?;
        info!(
            epochs,
            train_batches = train.num_batches(),
            val_batches = val.num_batches(),
            max_steps,
            "starting training"
        );
        model.set_learning_rate(learning_rate);

        for epoch in 1..=epochs {
            self.tracker.transition_to(TrainingStatus::Training)?;
            let mut batches = train.epoch(&mut self.rng);
            while let Some(batch) = batches.next_batch().await {
                let batch = batch?;
                let loss = compute(|| model.train_step(&batch))?;
                self.tracker.advance_step(Phase::Training, loss)?;
                tokio::task::yield_now().await;
            }
            drop(batches);

            self.tracker.transition_to(TrainingStatus::Validating)?;
            let mut batches = val.epoch(&mut self.rng);
            while let Some(batch) = batches.next_batch().await {
                let batch = batch?;
                let loss = compute(|| model.eval_loss(&batch))?;
                self.tracker.advance_step(Phase::Validating, loss)?;
                tokio::task::yield_now().await;
            }

            let snapshot = self.tracker.snapshot();
            info!(
                epoch,
                epochs,
                train_loss = ?snapshot.training_loss,
                val_loss = ?snapshot.validation_loss,
                "epoch complete"
            );
        }

        self.tracker.verify_complete_accounting()?;
        let weights_path = self.persist(model)?;
        if let Some(finalize) = self.finalizer.take() {
            finalize(&LoopOutcome { progress: self.tracker.snapshot().clone(), weights_path: weights_path.clone() })?;
        }
        self.tracker.transition_to(TrainingStatus::Complete)?;
        info!(weights = %weights_path.display(), "training complete");

        Ok(LoopOutcome { progress: self.tracker.snapshot().clone(), weights_path })
    }

    fn persist(&self, model: &dyn Classifier) -> TrainingResult<PathBuf> {
        self.layout.ensure_dirs()?;
        let staging = self.layout.staging_weights_path();
        if let Err(e) = model.save_weights(&staging) {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
        let target = self.layout.weights_path();
        commit_staged(&staging, &target)?;
        Ok(target)
    }
}

/// Run a compute-bound step. On a multi-threaded runtime the worker hands its
/// other tasks off first, so signal handling and the progress socket keep running.
fn compute<T>(step: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(step),
        _ => step(),
    }
}
