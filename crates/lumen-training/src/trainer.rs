use crate::error::TrainingResult;
use crate::job::Architecture;
use crate::loader::Batch;
use std::path::Path;

/// A classifier owned by the training loop.
///
/// Implementations wrap the autodiff/optimizer engine; the loop only sees
/// scalar losses.
pub trait Classifier: Send {
    /// Set the optimizer learning rate used by subsequent `train_step` calls.
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Forward pass, loss, backward pass and weight update for one batch.
    fn train_step(&mut self, batch: &Batch) -> TrainingResult<f64>;

    /// Forward pass and loss only; weights are not touched.
    fn eval_loss(&mut self, batch: &Batch) -> TrainingResult<f64>;

    /// Write the learned weights to `path` in the engine's native format.
    fn save_weights(&self, path: &Path) -> TrainingResult<()>;
}

/// Builds an initialized classifier for an architecture.
pub trait ModelFactory: Send + Sync {
    /// The returned model's final layer has exactly `num_classes` outputs.
    fn build(&self, architecture: Architecture, num_classes: usize) -> TrainingResult<Box<dyn Classifier>>;
}
