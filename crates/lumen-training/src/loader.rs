//! Batch production for one partition.
//!
//! Decoding runs on the blocking pool with at most `workers` batches in
//! flight. Finished batches reach the loop through a bounded queue in
//! traversal order, so the loop only ever waits for "next batch ready".

use crate::dataset::Sample;
use crate::error::{TrainingError, TrainingResult};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

/// Per-architecture decode + resize/crop/normalize pipeline.
pub trait SampleTransform: Send + Sync {
    /// `[channels, height, width]` of every produced sample.
    fn sample_dims(&self) -> [usize; 3];

    /// Decode `path` into a CHW float buffer of `sample_dims` size.
    fn load(&self, path: &Path) -> TrainingResult<Vec<f32>>;
}

/// A group of samples presented to one optimization step.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `len * c * h * w` values, sample-major then CHW.
    pub images: Vec<f32>,
    pub dims: [usize; 3],
    pub labels: Vec<u32>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub workers: usize,
    /// Decoded batches allowed to wait in the queue.
    pub prefetch: usize,
    /// Re-shuffle the traversal order on every epoch.
    pub shuffle: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { batch_size: 32, workers: 8, prefetch: 2, shuffle: false }
    }
}

pub struct BatchLoader {
    samples: Arc<[Sample]>,
    transform: Arc<dyn SampleTransform>,
    options: LoaderOptions,
}

impl BatchLoader {
    pub fn new(samples: Vec<Sample>, transform: Arc<dyn SampleTransform>, options: LoaderOptions) -> TrainingResult<Self> {
        if options.batch_size == 0 {
            return Err(TrainingError::ConfigValidation("batch_size must be >= 1".to_string()));
        }
        if options.workers == 0 {
            return Err(TrainingError::ConfigValidation("workers must be >= 1".to_string()));
        }
        Ok(Self { samples: samples.into(), transform, options })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Batches per epoch; the last partial batch is kept.
    #[must_use]
    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.options.batch_size)
    }

    /// Start producing one epoch of batches. Must be called inside a tokio runtime.
    pub fn epoch<R: Rng + ?Sized>(&self, rng: &mut R) -> BatchStream {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.options.shuffle {
            order.shuffle(rng);
        }
        let chunks: Vec<Vec<usize>> = order.chunks(self.options.batch_size).map(<[usize]>::to_vec).collect();

        let (tx, rx) = mpsc::channel(self.options.prefetch.max(1) * self.options.workers);
        let permits = Arc::new(Semaphore::new(self.options.workers));
        let samples = Arc::clone(&self.samples);
        let transform = Arc::clone(&self.transform);

        let producer = tokio::spawn(async move {
            for chunk in chunks {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    return;
                };
                let samples = Arc::clone(&samples);
                let transform = Arc::clone(&transform);
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    assemble_batch(&samples, &chunk, transform.as_ref())
                });
                if tx.send(job).await.is_err() {
                    return;
                }
            }
        });

        BatchStream { rx, producer }
    }
}

fn assemble_batch(samples: &[Sample], indices: &[usize], transform: &dyn SampleTransform) -> TrainingResult<Batch> {
    let dims = transform.sample_dims();
    let per_sample = dims.iter().product::<usize>();
    let mut images = Vec::with_capacity(per_sample * indices.len());
    let mut labels = Vec::with_capacity(indices.len());

    for &idx in indices {
        let sample = &samples[idx];
        let pixels = transform.load(&sample.path)?;
        if pixels.len() != per_sample {
            return Err(TrainingError::Dataset(format!(
                "{} decoded to {} values, expected {}",
                sample.path.display(),
                pixels.len(),
                per_sample
            )));
        }
        images.extend_from_slice(&pixels);
        labels.push(sample.label);
    }

    Ok(Batch { images, dims, labels })
}

/// Ordered stream of one epoch's batches.
pub struct BatchStream {
    rx: mpsc::Receiver<JoinHandle<TrainingResult<Batch>>>,
    producer: JoinHandle<()>,
}

impl BatchStream {
    pub async fn next_batch(&mut self) -> Option<TrainingResult<Batch>> {
        let job = self.rx.recv().await?;
        Some(job.await.unwrap_or_else(|e| Err(TrainingError::Dataset(format!("batch worker failed: {e}")))))
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
