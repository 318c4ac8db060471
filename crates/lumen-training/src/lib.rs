//! Lumen Training
//!
//! Orchestration core for image-classification fine-tuning jobs:
//! - Validating job configuration (`TrainingConfig`)
//! - Scanning a class-per-directory corpus and splitting it
//! - Producing batches on a bounded worker pool
//! - Driving the epoch/step loop against a `Classifier`
//! - Streaming `Progress` snapshots to a passive observer
//! - Writing the weights and a run manifest

pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod loader;
pub mod pipeline;
pub mod progress;
pub mod reporter;
pub mod settings;
pub mod split;
pub mod trainer;
pub mod training_loop;
pub mod transport;

pub use artifacts::{ArtifactKind, RunManifest, SplitSizes, TrainingArtifact, TrainingMetrics};
pub use dataset::{resolve_corpus_root, Dataset, DatasetId, DatasetScan, ImageProbe, Sample};
pub use error::{DeliveryFailure, TrainingError, TrainingResult};
pub use job::{Architecture, TrainingConfig, TrainingRunId};
pub use layout::OutputLayout;
pub use loader::{Batch, BatchLoader, BatchStream, LoaderOptions, SampleTransform};
pub use pipeline::{JobBackend, JobSummary, TrainingJob};
pub use progress::{max_steps_for, Phase, Progress, ProgressTracker, TrainingStatus};
pub use reporter::{LogSink, ProgressReporter, ProgressSink, RecordingSink, TeeSink};
pub use settings::{RuntimeSettings, SettingsFile};
pub use split::{split, split_indices, Split, TRAIN_RATIO, VAL_RATIO};
pub use trainer::{Classifier, ModelFactory};
pub use training_loop::{Finalizer, LoopOutcome, TrainingLoop};
pub use transport::{ProgressSubscriber, PushSocket, DEFAULT_BIND_ADDR};
