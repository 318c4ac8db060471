//! Argument types shared by the command implementations.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// Job configuration: inline JSON, a path to a JSON file, or `-` for stdin (default)
    pub config: Option<String>,

    /// Settings file to use instead of ./lumen.toml and ~/.lumen/config.toml
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Corpus root with one subdirectory per class
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Directory whose first entry is the corpus root when --data-root is absent
    #[arg(long)]
    pub uploads_dir: Option<PathBuf>,

    /// Where the weights and the run manifest are written
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory holding <architecture>.safetensors pretrained weights
    #[arg(long)]
    pub pretrained_dir: Option<PathBuf>,

    /// Progress socket address
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Parallel image decoding workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Decoded batches queued per worker
    #[arg(long)]
    pub prefetch: Option<usize>,

    /// Compute device (auto, cpu, cuda)
    #[arg(long)]
    pub device: Option<String>,

    /// Seed for the split and the per-epoch shuffles
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long to keep flushing progress frames after the job ends
    #[arg(long)]
    pub linger_ms: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Address of the job's progress socket
    #[arg(long, default_value = lumen_training::DEFAULT_BIND_ADDR)]
    pub addr: String,

    /// Seconds to keep retrying the connection while the job starts up
    #[arg(long, default_value_t = 30)]
    pub wait: u64,

    /// Print every snapshot as a JSON line instead of a progress bar
    #[arg(long)]
    pub json: bool,
}
