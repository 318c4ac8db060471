//! Shared test doubles for Lumen Training integration tests.
//!
//! Provides an in-memory transform, a scripted classifier and helpers for
//! building loaders and corpora without any image codec.

#![allow(dead_code)]

use lumen_training::{
    Architecture, Batch, BatchLoader, Classifier, ImageProbe, LoaderOptions, ModelFactory, Progress, Sample,
    SampleTransform, TrainingError, TrainingResult, TrainingStatus,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every file decodes to a single zero pixel.
pub struct ZeroTransform;

impl SampleTransform for ZeroTransform {
    fn sample_dims(&self) -> [usize; 3] {
        [1, 1, 1]
    }

    fn load(&self, _path: &Path) -> TrainingResult<Vec<f32>> {
        Ok(vec![0.0])
    }
}

/// Files ending in `.png` are decodable, anything else is corrupt.
pub struct ExtensionProbe;

impl ImageProbe for ExtensionProbe {
    fn is_decodable(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "png")
    }
}

/// Records calls and returns a decreasing loss; can be told to fail.
#[derive(Default)]
pub struct ScriptedClassifier {
    pub learning_rate: Option<f64>,
    pub train_steps: usize,
    pub eval_steps: usize,
    pub seen_labels: Vec<u32>,
    pub fail_on_train_step: Option<usize>,
    /// Simulated compute time of every train step.
    pub step_delay: Option<Duration>,
}

impl Classifier for ScriptedClassifier {
    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = Some(learning_rate);
    }

    fn train_step(&mut self, batch: &Batch) -> TrainingResult<f64> {
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        self.train_steps += 1;
        if self.fail_on_train_step == Some(self.train_steps) {
            return Err(TrainingError::TrainingStep("loss is NaN".to_string()));
        }
        self.seen_labels.extend_from_slice(&batch.labels);
        Ok(1.0 / self.train_steps as f64)
    }

    fn eval_loss(&mut self, _batch: &Batch) -> TrainingResult<f64> {
        self.eval_steps += 1;
        Ok(0.5)
    }

    fn save_weights(&self, path: &Path) -> TrainingResult<()> {
        std::fs::write(path, format!("steps={}", self.train_steps))?;
        Ok(())
    }
}

/// Builds scripted classifiers and remembers what it was asked for.
#[derive(Default)]
pub struct ScriptedFactory {
    pub requests: Mutex<Vec<(Architecture, usize)>>,
    pub fail: bool,
}

impl ModelFactory for ScriptedFactory {
    fn build(&self, architecture: Architecture, num_classes: usize) -> TrainingResult<Box<dyn Classifier>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((architecture, num_classes));
        }
        if self.fail {
            return Err(TrainingError::Artifact(format!("no pretrained weights for {architecture}")));
        }
        Ok(Box::new(ScriptedClassifier::default()))
    }
}

pub fn samples(n: usize) -> Vec<Sample> {
    (0..n).map(|i| Sample { path: PathBuf::from(format!("{i}.png")), label: (i % 2) as u32 }).collect()
}

pub fn loader(n: usize, batch_size: usize, shuffle: bool) -> BatchLoader {
    let options = LoaderOptions { batch_size, workers: 2, prefetch: 2, shuffle };
    BatchLoader::new(samples(n), Arc::new(ZeroTransform), options).unwrap()
}

/// Lay out `<root>/<class>/<i>.png` for each `(class, count)`.
pub fn write_corpus(root: &Path, classes: &[(&str, usize)]) {
    for (class, count) in classes {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..*count {
            std::fs::write(dir.join(format!("{i}.png")), b"png").unwrap();
        }
    }
}

pub fn statuses(frames: &[Progress]) -> Vec<TrainingStatus> {
    frames.iter().map(|f| f.status).collect()
}

/// Each consecutive pair is either the same status or a legal transition,
/// and nothing follows a terminal status.
pub fn assert_legal_walk(frames: &[Progress]) {
    let mut previous = TrainingStatus::NotStarted;
    for (i, frame) in frames.iter().enumerate() {
        assert!(!previous.is_terminal(), "frame {i} sent after terminal status {previous}");
        assert!(
            frame.status == previous || previous.can_transition_to(frame.status),
            "illegal walk {previous} -> {} at frame {i}",
            frame.status
        );
        previous = frame.status;
    }
}

pub fn assert_monotonic_steps(frames: &[Progress]) {
    for pair in frames.windows(2) {
        assert!(pair[1].steps_complete >= pair[0].steps_complete);
        assert!(pair[1].steps_complete - pair[0].steps_complete <= 1);
        assert_eq!(pair[1].max_steps, pair[0].max_steps);
    }
}
