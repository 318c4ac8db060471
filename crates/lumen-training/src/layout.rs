use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

/// Filesystem layout for the outputs of a training job.
///
/// Default layout is `./trained_model/{model.safetensors,training_manifest.json}`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub const DEFAULT_DIR: &'static str = "./trained_model";

    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn weights_path(&self) -> PathBuf {
        self.root.join("model.safetensors")
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("training_manifest.json")
    }

    /// Scratch path the weights are written to before the atomic rename.
    #[must_use]
    pub fn staging_weights_path(&self) -> PathBuf {
        self.root.join(".model.safetensors.partial")
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new(PathBuf::from(Self::DEFAULT_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp.path().join("out"));

        assert_eq!(layout.weights_path(), temp.path().join("out").join("model.safetensors"));
        assert_eq!(layout.staging_weights_path().parent(), layout.weights_path().parent());
        assert!(!layout.root().exists());
        layout.ensure_dirs().unwrap();
        assert!(layout.root().is_dir());
    }
}
