//! Runtime settings loading and merging.

use crate::commands::types::TrainArgs;
use anyhow::{Context, Result};
use lumen_training::{RuntimeSettings, SettingsFile};
use std::path::Path;

/// Load and merge runtime settings.
///
/// Settings precedence:
/// 1. CLI arguments
/// 2. Explicit `--settings` file, or local `./lumen.toml` over global `~/.lumen/config.toml`
/// 3. Defaults
pub fn load_settings(explicit: Option<&Path>, overrides: &SettingsFile) -> Result<RuntimeSettings> {
    let mut file = match explicit {
        Some(path) => SettingsFile::load_from_file(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?,
        None => SettingsFile::discover_and_load().context("Failed to load settings")?,
    };
    file.merge(overrides);
    RuntimeSettings::try_from(file).context("Invalid runtime settings")
}

/// Log level from the discovered settings files, if any sets one.
pub fn configured_log_level() -> Option<String> {
    SettingsFile::discover_and_load().ok().and_then(|s| s.log_level)
}

impl TrainArgs {
    /// Settings given on the command line.
    pub fn overrides(&self) -> SettingsFile {
        SettingsFile {
            uploads_dir: self.uploads_dir.clone(),
            data_root: self.data_root.clone(),
            output_dir: self.output_dir.clone(),
            pretrained_dir: self.pretrained_dir.clone(),
            bind_addr: self.bind.clone(),
            batch_size: self.batch_size,
            workers: self.workers,
            prefetch: self.prefetch,
            device: self.device.clone(),
            seed: self.seed,
            linger_ms: self.linger_ms,
            log_level: None,
        }
    }
}
