use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Stable identifier for a dataset (content hash of its entries).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

/// One labeled image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: u32,
}

/// Decides whether a file is a decodable image.
pub trait ImageProbe: Send + Sync {
    fn is_decodable(&self, path: &Path) -> bool;
}

/// Ordered labeled samples plus the label index -> class name mapping.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
    classes: Vec<String>,
}

/// Result of scanning a corpus directory.
#[derive(Debug, Clone)]
pub struct DatasetScan {
    pub dataset: Dataset,
    /// Files excluded because they failed the image-integrity probe.
    pub skipped: usize,
}

impl Dataset {
    pub fn from_samples(samples: Vec<Sample>, classes: Vec<String>) -> TrainingResult<Self> {
        if let Some(bad) = samples.iter().find(|s| s.label as usize >= classes.len()) {
            return Err(TrainingError::Dataset(format!(
                "sample {} has label {} but only {} classes exist",
                bad.path.display(),
                bad.label,
                classes.len()
            )));
        }
        Ok(Self { samples, classes })
    }

    /// Build a dataset from a root with one subdirectory per class.
    ///
    /// Classes are the immediate subdirectories sorted by name; every file
    /// below a class directory is a candidate and is kept only if `probe`
    /// can decode it.
    pub fn scan(root: &Path, probe: &dyn ImageProbe) -> TrainingResult<DatasetScan> {
        if !root.is_dir() {
            return Err(TrainingError::Dataset(format!("corpus root is not a directory: {}", root.display())));
        }

        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                class_dirs.push(path);
            }
        }
        class_dirs.sort();
        if class_dirs.is_empty() {
            return Err(TrainingError::Dataset(format!("no class directories under {}", root.display())));
        }

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for (label, dir) in class_dirs.iter().enumerate() {
            let name = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let before = samples.len();

            let walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        debug!(error = %e, "skipping unreadable corpus entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if probe.is_decodable(entry.path()) {
                    samples.push(Sample { path: entry.path().to_path_buf(), label: label as u32 });
                } else {
                    debug!(path = %entry.path().display(), "skipping undecodable file");
                    skipped += 1;
                }
            }

            if samples.len() == before {
                warn!(class = %name, "class directory has no decodable images");
            }
            classes.push(name);
        }

        if samples.is_empty() {
            return Err(TrainingError::Dataset(format!("no decodable images under {}", root.display())));
        }

        info!(
            root = %root.display(),
            classes = classes.len(),
            samples = samples.len(),
            skipped,
            "dataset scanned"
        );
        Ok(DatasetScan { dataset: Self { samples, classes }, skipped })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Samples at `indices`, in the order given.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Vec<Sample> {
        indices.iter().filter_map(|&i| self.samples.get(i).cloned()).collect()
    }
}

/// Corpus root under an uploads directory: its first entry in name order.
pub fn resolve_corpus_root(uploads_dir: &Path) -> TrainingResult<PathBuf> {
    let mut entries = match std::fs::read_dir(uploads_dir) {
        Ok(dir) => dir.filter_map(Result::ok).map(|e| e.path()).collect::<Vec<_>>(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TrainingError::Dataset(format!("uploads directory not found: {}", uploads_dir.display())));
        }
        Err(e) => return Err(e.into()),
    };
    entries.sort();
    entries
        .into_iter()
        .next()
        .ok_or_else(|| TrainingError::Dataset(format!("uploads directory is empty: {}", uploads_dir.display())))
}

pub fn compute_dataset_id(dataset: &Dataset) -> DatasetId {
    let mut hasher = Sha256::new();

    for class in dataset.classes() {
        hasher.update(class.as_bytes());
        hasher.update(b"\n");
    }
    for sample in dataset.samples() {
        hasher.update(sample.path.to_string_lossy().as_bytes());
        hasher.update(sample.label.to_le_bytes());
        hasher.update(b"\n");
    }

    DatasetId(hex::encode(hasher.finalize()))
}
