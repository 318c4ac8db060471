//! Lumen CLI - image-classification fine-tuning with a live progress feed
//!
//! This CLI provides a `lumen` command that runs a training job, watches the
//! progress channel of a running job and lists the supported architectures.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::types::{TrainArgs, WatchArgs};
use commands::{archs, train, watch};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Lumen CLI - fine-tune pretrained image classifiers
#[derive(Parser, Debug)]
#[command(
    name = "lumen",
    author,
    version,
    about = "Lumen - fine-tune pretrained image classifiers",
    long_about = "Lumen fine-tunes AlexNet, ResNet-50 or VGG-16 on a class-per-directory image corpus\nand streams progress snapshots to any observer connected to the job's progress socket."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); falls back to the settings file, then info
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a training job
    ///
    /// Reads the job configuration (JSON) from the first argument or stdin,
    /// binds the progress socket and trains until complete.
    Train(TrainArgs),

    /// Follow the progress of a running job
    Watch(WatchArgs),

    /// List supported architectures
    Archs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_level(name: &str) -> Level {
    match name {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = args.log_level.clone().or_else(config::configured_log_level).unwrap_or_else(|| "info".to_string());
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Train(cmd) => train::execute(cmd).await,
        Command::Watch(cmd) => watch::execute(cmd).await,
        Command::Archs { json } => archs::execute(json),
    }
}
