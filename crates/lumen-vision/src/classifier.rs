use crate::error::{VisionError, VisionResult};
use crate::networks::Network;
use candle_core::{Device, Tensor, Var};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarMap};
use lumen_training::{Batch, Classifier, TrainingError, TrainingResult};
use std::path::Path;
use tracing::debug;

/// A candle network plus its variable store and Adam optimizer.
///
/// Only the variables handed to `new` are updated; the rest of the varmap
/// stays at its loaded values but is still saved.
pub struct CandleClassifier {
    network: Box<dyn Network>,
    varmap: VarMap,
    optimizer: AdamW,
    device: Device,
}

impl CandleClassifier {
    pub fn new(network: Box<dyn Network>, varmap: VarMap, trainable: Vec<Var>, device: Device) -> VisionResult<Self> {
        debug!(trainable = trainable.len(), "building optimizer");
        let params = ParamsAdamW { weight_decay: 0.0, ..Default::default() };
        let optimizer = AdamW::new(trainable, params)?;
        Ok(Self { network, varmap, optimizer, device })
    }

    #[must_use]
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn to_tensors(&self, batch: &Batch) -> VisionResult<(Tensor, Tensor)> {
        let [c, h, w] = batch.dims;
        let images = Tensor::from_vec(batch.images.clone(), (batch.len(), c, h, w), &Device::Cpu)?;
        let labels = Tensor::from_vec(batch.labels.clone(), batch.len(), &Device::Cpu)?;
        Ok((images.to_device(&self.device)?, labels.to_device(&self.device)?))
    }

    fn batch_loss(&self, batch: &Batch, train: bool) -> VisionResult<Tensor> {
        let (images, labels) = self.to_tensors(batch)?;
        let logits = self.network.forward_t(&images, train)?;
        Ok(loss::cross_entropy(&logits, &labels)?)
    }
}

fn finite_scalar(loss: &Tensor) -> TrainingResult<f64> {
    let value = loss
        .to_scalar::<f32>()
        .map_err(|e| TrainingError::TrainingStep(e.to_string()))?;
    if value.is_finite() {
        Ok(f64::from(value))
    } else {
        Err(TrainingError::TrainingStep(format!("loss is not finite: {value}")))
    }
}

impl Classifier for CandleClassifier {
    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.optimizer.set_learning_rate(learning_rate);
    }

    fn train_step(&mut self, batch: &Batch) -> TrainingResult<f64> {
        let loss = self.batch_loss(batch, true)?;
        let value = finite_scalar(&loss)?;
        self.optimizer.backward_step(&loss).map_err(VisionError::from)?;
        Ok(value)
    }

    fn eval_loss(&mut self, batch: &Batch) -> TrainingResult<f64> {
        let loss = self.batch_loss(batch, false)?;
        finite_scalar(&loss)
    }

    fn save_weights(&self, path: &Path) -> TrainingResult<()> {
        self.varmap
            .save(path)
            .map_err(|e| TrainingError::Artifact(format!("failed to save weights to {}: {e}", path.display())))
    }
}
