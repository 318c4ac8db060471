//! End-to-end job: corpus scan, split, loaders, model, loop, manifest.

use crate::artifacts::{make_artifact, write_manifest, ArtifactKind, RunManifest, SplitSizes, TrainingMetrics};
use crate::dataset::{compute_dataset_id, Dataset, DatasetId, DatasetScan, ImageProbe};
use crate::error::{TrainingError, TrainingResult};
use crate::job::{TrainingConfig, TrainingRunId};
use crate::layout::OutputLayout;
use crate::loader::{BatchLoader, LoaderOptions, SampleTransform};
use crate::progress::Progress;
use crate::reporter::ProgressReporter;
use crate::settings::RuntimeSettings;
use crate::split::{split_indices, TRAIN_RATIO, VAL_RATIO};
use crate::trainer::ModelFactory;
use crate::training_loop::{Finalizer, LoopOutcome, TrainingLoop};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The external capabilities a job is wired to.
#[derive(Clone)]
pub struct JobBackend {
    pub factory: Arc<dyn ModelFactory>,
    pub probe: Arc<dyn ImageProbe>,
    pub transform: Arc<dyn SampleTransform>,
}

/// What a finished job produced.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub run_id: TrainingRunId,
    pub progress: Progress,
    pub classes: Vec<String>,
    pub split: SplitSizes,
    pub skipped_files: usize,
    pub weights_path: PathBuf,
    pub manifest_path: PathBuf,
}

pub struct TrainingJob {
    config: TrainingConfig,
    settings: RuntimeSettings,
    backend: JobBackend,
    reporter: Arc<ProgressReporter>,
}

impl TrainingJob {
    #[must_use]
    pub fn new(
        config: TrainingConfig,
        settings: RuntimeSettings,
        backend: JobBackend,
        reporter: Arc<ProgressReporter>,
    ) -> Self {
        Self { config, settings, backend, reporter }
    }

    /// Run the job to completion.
    ///
    /// Failures before the epoch loop starts are returned without pushing
    /// anything; failures inside the loop push a best-effort `error` first.
    pub async fn execute(self) -> TrainingResult<JobSummary> {
        self.config.validate()?;
        self.settings.validate()?;

        let run_id = TrainingRunId::new();
        let root = self.settings.corpus_root()?;
        info!(run_id = %run_id, architecture = %self.config.architecture, root = %root.display(), "starting job");

        let probe = Arc::clone(&self.backend.probe);
        let DatasetScan { dataset, skipped } = tokio::task::spawn_blocking(move || Dataset::scan(&root, probe.as_ref()))
            .await
            .map_err(|e| TrainingError::Dataset(format!("corpus scan task failed: {e}")))??;

        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let split = split_indices(dataset.len(), TRAIN_RATIO, VAL_RATIO, &mut rng)?;
        let (train_len, val_len, test_len) = split.sizes();
        info!(train = train_len, val = val_len, test = test_len, skipped, "dataset split");

        let options = LoaderOptions {
            batch_size: self.settings.batch_size,
            workers: self.settings.workers,
            prefetch: self.settings.prefetch,
            shuffle: false,
        };
        let train = BatchLoader::new(
            dataset.subset(&split.train),
            Arc::clone(&self.backend.transform),
            LoaderOptions { shuffle: true, ..options },
        )?;
        let val = BatchLoader::new(dataset.subset(&split.val), Arc::clone(&self.backend.transform), options)?;

        let factory = Arc::clone(&self.backend.factory);
        let architecture = self.config.architecture;
        let num_classes = dataset.classes().len();
        let mut model = tokio::task::spawn_blocking(move || factory.build(architecture, num_classes))
            .await
            .map_err(|e| TrainingError::Artifact(format!("model build task failed: {e}")))??;

        let layout = OutputLayout::new(self.settings.output_dir.clone());
        let manifest_path = layout.manifest_path();
        let split_sizes = SplitSizes { train: train_len, val: val_len, test: test_len };
        let classes = dataset.classes().to_vec();
        let finalizer = manifest_writer(ManifestContext {
            run_id: run_id.clone(),
            config: self.config.clone(),
            dataset_id: compute_dataset_id(&dataset),
            classes: classes.clone(),
            split: split_sizes,
            skipped_files: skipped,
            path: manifest_path.clone(),
        });

        let mut training = TrainingLoop::new(Arc::clone(&self.reporter), layout, rng).with_finalizer(finalizer);
        let outcome = training
            .run(model.as_mut(), &train, &val, self.config.epoch_count, self.config.learning_rate)
            .await?;

        Ok(JobSummary {
            run_id,
            progress: outcome.progress,
            classes,
            split: split_sizes,
            skipped_files: skipped,
            weights_path: outcome.weights_path,
            manifest_path,
        })
    }
}

/// Everything the run manifest records besides the loop's own outcome.
struct ManifestContext {
    run_id: TrainingRunId,
    config: TrainingConfig,
    dataset_id: DatasetId,
    classes: Vec<String>,
    split: SplitSizes,
    skipped_files: usize,
    path: PathBuf,
}

/// Writes the manifest once the weights are saved, before `complete` is pushed.
fn manifest_writer(context: ManifestContext) -> Finalizer {
    Box::new(move |outcome: &LoopOutcome| {
        let manifest = RunManifest {
            run_id: context.run_id,
            created_at: Utc::now(),
            config: context.config,
            dataset_id: context.dataset_id,
            classes: context.classes,
            split: context.split,
            skipped_files: context.skipped_files,
            metrics: TrainingMetrics {
                train_loss: outcome.progress.training_loss,
                val_loss: outcome.progress.validation_loss,
                steps: outcome.progress.steps_complete,
                max_steps: outcome.progress.max_steps,
            },
            artifacts: vec![make_artifact(ArtifactKind::Weights, outcome.weights_path.clone())?],
        };
        write_manifest(&context.path, &manifest).inspect_err(|e| {
            warn!(error = %e, path = %context.path.display(), "weights saved but manifest could not be written");
        })
    })
}
