//! Pretrained model construction.

use crate::arch::{spec_for, ArchitectureSpec};
use crate::classifier::CandleClassifier;
use crate::error::{VisionError, VisionResult};
use candle_core::{DType, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use lumen_training::{Architecture, Classifier, ModelFactory, TrainingError, TrainingResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve an `auto|cpu|cuda` device name.
pub fn resolve_device(name: &str) -> VisionResult<Device> {
    match name {
        "auto" => Ok(Device::cuda_if_available(0).unwrap_or(Device::Cpu)),
        "cpu" => Ok(Device::Cpu),
        "cuda" => match Device::new_cuda(0) {
            Ok(device) => Ok(device),
            Err(e) => Err(VisionError::Device(format!("cuda ({e})"))),
        },
        other => Err(VisionError::Device(other.to_string())),
    }
}

/// Overwrite every non-head variable in `varmap` with the tensor of the same
/// name from a safetensors file. Returns the number of variables loaded.
pub fn load_pretrained(varmap: &VarMap, path: &Path, is_head: impl Fn(&str) -> bool) -> VisionResult<usize> {
    if !path.is_file() {
        return Err(VisionError::PretrainedMissing(path.to_path_buf()));
    }
    let data = varmap.data().lock().map_err(|_| VisionError::Poisoned)?;
    let first = data.values().next().map(|v| v.device().clone()).unwrap_or(Device::Cpu);
    let tensors = candle_core::safetensors::load(path, &first)?;

    let mut loaded = 0;
    for (name, var) in data.iter().filter(|(name, _)| !is_head(name)) {
        let tensor = tensors
            .get(name)
            .ok_or_else(|| VisionError::MissingTensor { path: path.to_path_buf(), name: name.clone() })?;
        let tensor = tensor.to_dtype(var.dtype())?;
        var.set(&tensor)
            .map_err(|e| VisionError::TensorMismatch { name: name.clone(), reason: e.to_string() })?;
        loaded += 1;
    }
    debug!(path = %path.display(), loaded, ignored = tensors.len() - loaded, "pretrained weights loaded");
    Ok(loaded)
}

/// Builds candle classifiers from torchvision weights on disk.
pub struct VisionModelFactory {
    pretrained_dir: PathBuf,
    device: Device,
    fine_tune_backbone: bool,
}

impl VisionModelFactory {
    #[must_use]
    pub fn new(pretrained_dir: PathBuf, device: Device, fine_tune_backbone: bool) -> Self {
        Self { pretrained_dir, device, fine_tune_backbone }
    }

    #[must_use]
    pub fn pretrained_path(&self, spec: &ArchitectureSpec) -> PathBuf {
        self.pretrained_dir.join(spec.pretrained_file)
    }

    pub fn build_classifier(&self, architecture: Architecture, num_classes: usize) -> VisionResult<CandleClassifier> {
        let spec = spec_for(architecture);
        let path = self.pretrained_path(spec);
        if !path.is_file() {
            return Err(VisionError::PretrainedMissing(path));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);
        let network = spec.build(num_classes, self.fine_tune_backbone, vb)?;
        let loaded = load_pretrained(&varmap, &path, |name| spec.is_head(name))?;

        let trainable: Vec<Var> = {
            let data = varmap.data().lock().map_err(|_| VisionError::Poisoned)?;
            data.iter()
                .filter(|(name, _)| self.fine_tune_backbone || spec.is_head(name))
                .map(|(_, var)| var.clone())
                .collect()
        };
        info!(
            %architecture,
            num_classes,
            loaded,
            trainable = trainable.len(),
            fine_tune_backbone = self.fine_tune_backbone,
            device = ?self.device,
            "model ready"
        );
        CandleClassifier::new(network, varmap, trainable, self.device.clone())
    }
}

impl ModelFactory for VisionModelFactory {
    fn build(&self, architecture: Architecture, num_classes: usize) -> TrainingResult<Box<dyn Classifier>> {
        if num_classes == 0 {
            return Err(TrainingError::Dataset("cannot build a classifier with zero classes".to_string()));
        }
        let classifier = self.build_classifier(architecture, num_classes).map_err(|e| match e {
            VisionError::Candle(e) => TrainingError::Artifact(format!("failed to build {architecture}: {e}")),
            other => other.into(),
        })?;
        Ok(Box::new(classifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Tensor;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn store() -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        candle_nn::linear(3, 2, vb.pp("body")).unwrap();
        candle_nn::linear(2, 4, vb.pp("fc")).unwrap();
        varmap
    }

    fn write_weights(path: &Path, tensors: &[(&str, Tensor)]) {
        let map: HashMap<String, Tensor> = tensors.iter().map(|(n, t)| ((*n).to_string(), t.clone())).collect();
        candle_core::safetensors::save(&map, path).unwrap();
    }

    #[test]
    fn test_load_pretrained_skips_head() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("w.safetensors");
        let ones = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let bias = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        let stale_head = Tensor::ones((1000, 2), DType::F32, &Device::Cpu).unwrap();
        write_weights(&path, &[("body.weight", ones), ("body.bias", bias), ("fc.weight", stale_head)]);

        let varmap = store();
        let loaded = load_pretrained(&varmap, &path, |n| n.starts_with("fc.")).unwrap();
        assert_eq!(loaded, 2);

        let data = varmap.data().lock().unwrap();
        let body = data["body.weight"].as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(body.iter().all(|v| *v == 1.0));
        assert_eq!(data["fc.weight"].as_tensor().dims(), &[4, 2]);
    }

    #[test]
    fn test_load_pretrained_errors() {
        let temp = TempDir::new().unwrap();
        let varmap = store();
        let missing = temp.path().join("absent.safetensors");
        assert!(matches!(
            load_pretrained(&varmap, &missing, |_| false),
            Err(VisionError::PretrainedMissing(_))
        ));

        let path = temp.path().join("partial.safetensors");
        let ones = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        write_weights(&path, &[("body.weight", ones)]);
        assert!(matches!(
            load_pretrained(&varmap, &path, |n| n.starts_with("fc.")),
            Err(VisionError::MissingTensor { name, .. }) if name == "body.bias"
        ));

        let wrong = temp.path().join("wrong.safetensors");
        let bad = Tensor::ones((3, 3), DType::F32, &Device::Cpu).unwrap();
        let bias = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        write_weights(&wrong, &[("body.weight", bad), ("body.bias", bias)]);
        assert!(matches!(
            load_pretrained(&varmap, &wrong, |n| n.starts_with("fc.")),
            Err(VisionError::TensorMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_pretrained_file_is_artifact_error() {
        let temp = TempDir::new().unwrap();
        let factory = VisionModelFactory::new(temp.path().to_path_buf(), Device::Cpu, false);
        let err = factory.build(Architecture::ResNet, 3).err().unwrap();
        assert!(matches!(err, TrainingError::Artifact(msg) if msg.contains("resnet.safetensors")));
    }

    #[test]
    fn test_resolve_device() {
        assert!(matches!(resolve_device("cpu"), Ok(Device::Cpu)));
        assert!(resolve_device("auto").is_ok());
        assert!(matches!(resolve_device("tpu"), Err(VisionError::Device(_))));
    }
}
