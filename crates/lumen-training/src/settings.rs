//! Runtime settings file support.
//!
//! Operational knobs that are not part of the job payload: where the corpus
//! and outputs live, how batches are produced and where progress is pushed.

use crate::error::{TrainingError, TrainingResult};
use crate::transport::DEFAULT_BIND_ADDR;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings as they appear in a TOML file; every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub uploads_dir: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pretrained_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub prefetch: Option<usize>,
    pub device: Option<String>,
    pub seed: Option<u64>,
    pub linger_ms: Option<u64>,
    pub log_level: Option<String>,
}

impl SettingsFile {
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TrainingError::ConfigValidation(format!("{}: {}", path.display(), e)))
    }

    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: &Self) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field.clone_from(&other.$field);
                })*
            };
        }
        take!(
            uploads_dir,
            data_root,
            output_dir,
            pretrained_dir,
            bind_addr,
            batch_size,
            workers,
            prefetch,
            device,
            seed,
            linger_ms,
            log_level
        );
    }

    /// Get default global settings file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".lumen")
            .join("config.toml")
    }

    /// Get default local settings file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("lumen.toml")
    }

    /// Merge global then local settings files. Missing files are skipped,
    /// unreadable or malformed ones are errors.
    pub fn discover_and_load() -> TrainingResult<Self> {
        let mut settings = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            if path.exists() {
                settings.merge(&Self::load_from_file(&path)?);
            }
        }
        Ok(settings)
    }
}

/// Fully resolved, validated runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub uploads_dir: PathBuf,
    pub data_root: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub pretrained_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub batch_size: usize,
    pub workers: usize,
    pub prefetch: usize,
    pub device: String,
    pub seed: Option<u64>,
    pub linger: Duration,
    pub log_level: Option<String>,
}

impl TryFrom<SettingsFile> for RuntimeSettings {
    type Error = TrainingError;

    fn try_from(file: SettingsFile) -> TrainingResult<Self> {
        let bind = file.bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|e| TrainingError::ConfigValidation(format!("bind_addr {bind:?}: {e}")))?;

        let settings = Self {
            uploads_dir: file.uploads_dir.unwrap_or_else(|| PathBuf::from("./uploads")),
            data_root: file.data_root,
            output_dir: file.output_dir.unwrap_or_else(|| PathBuf::from(crate::layout::OutputLayout::DEFAULT_DIR)),
            pretrained_dir: file.pretrained_dir.unwrap_or_else(|| PathBuf::from("./pretrained")),
            bind_addr,
            batch_size: file.batch_size.unwrap_or(32),
            workers: file.workers.unwrap_or(8),
            prefetch: file.prefetch.unwrap_or(2),
            device: file.device.unwrap_or_else(|| "auto".to_string()),
            seed: file.seed,
            linger: Duration::from_millis(file.linger_ms.unwrap_or(500)),
            log_level: file.log_level,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("./uploads"),
            data_root: None,
            output_dir: PathBuf::from(crate::layout::OutputLayout::DEFAULT_DIR),
            pretrained_dir: PathBuf::from("./pretrained"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            batch_size: 32,
            workers: 8,
            prefetch: 2,
            device: "auto".to_string(),
            seed: None,
            linger: Duration::from_millis(500),
            log_level: None,
        }
    }
}

impl RuntimeSettings {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::ConfigValidation("batch_size must be >= 1".to_string()));
        }
        if self.workers == 0 {
            return Err(TrainingError::ConfigValidation("workers must be >= 1".to_string()));
        }
        if !matches!(self.device.as_str(), "auto" | "cpu" | "cuda") {
            return Err(TrainingError::ConfigValidation(format!(
                "device must be auto, cpu or cuda, got {}",
                self.device
            )));
        }
        Ok(())
    }

    /// Corpus root: the explicit `data_root`, else the first entry under `uploads_dir`.
    pub fn corpus_root(&self) -> TrainingResult<PathBuf> {
        match &self.data_root {
            Some(root) => Ok(root.clone()),
            None => crate::dataset::resolve_corpus_root(&self.uploads_dir),
        }
    }
}
