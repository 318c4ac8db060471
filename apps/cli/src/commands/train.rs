//! Training command implementation.

use crate::commands::types::TrainArgs;
use crate::config;
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use lumen_training::{
    JobBackend, JobSummary, LogSink, ProgressReporter, ProgressSink, PushSocket, TeeSink, TrainingConfig, TrainingJob,
    TrainingResult,
};
use lumen_vision::{resolve_device, spec_for, VisionModelFactory};
use serde_json::json;
use std::future::Future;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

pub async fn execute(args: TrainArgs) -> Result<()> {
    // Everything that can be rejected up front is, before the socket is bound.
    let payload = read_payload(args.config.as_deref())?;
    let config = TrainingConfig::from_json(&payload)?;
    let settings = config::load_settings(args.settings.as_deref(), &args.overrides())?;
    let device = resolve_device(&settings.device)?;

    let socket = Arc::new(
        PushSocket::bind(settings.bind_addr)
            .await
            .with_context(|| format!("Failed to bind progress socket on {}", settings.bind_addr))?,
    );
    let sinks: Vec<Arc<dyn ProgressSink>> = vec![socket.clone(), Arc::new(LogSink)];
    let reporter = Arc::new(ProgressReporter::new(Arc::new(TeeSink::new(sinks))));

    let spec = spec_for(config.architecture);
    let pipeline = Arc::new(spec.pipeline());
    let backend = JobBackend {
        factory: Arc::new(VisionModelFactory::new(settings.pretrained_dir.clone(), device, config.fine_tune_backbone)),
        probe: pipeline.clone(),
        transform: pipeline,
    };
    let linger = settings.linger;
    let job = TrainingJob::new(config, settings, backend, reporter.clone());

    let handle = tokio::spawn(job.execute());
    let result = supervise(handle, termination_signal(), &reporter).await;
    socket.close(linger).await;

    let summary = result?;
    if args.json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Wait for the job, or abort it when `signal` resolves first.
///
/// On abort the observer gets a best-effort `error` snapshot and the job task
/// is cancelled at its next step boundary.
async fn supervise<S>(
    mut handle: JoinHandle<TrainingResult<JobSummary>>,
    signal: S,
    reporter: &ProgressReporter,
) -> Result<JobSummary>
where
    S: Future<Output = &'static str>,
{
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow!("Training task failed: {e}")),
        },
        signal = signal => {
            warn!(signal, "termination requested, aborting job");
            reporter.announce_abort();
            handle.abort();
            Err(anyhow!("Training aborted by {signal}"))
        }
    }
}

/// Resolves with the signal name on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
            Some(()) = terminate.recv() => "SIGTERM",
            else => std::future::pending().await,
        },
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            interrupt().await
        }
    }
}

/// Resolves with the signal name on Ctrl-C.
#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    interrupt().await
}

async fn interrupt() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// Job payload from an inline JSON argument, a file, or stdin.
fn read_payload(arg: Option<&str>) -> Result<String> {
    match arg {
        None | Some("-") => {
            let mut payload = String::new();
            std::io::stdin()
                .read_to_string(&mut payload)
                .context("Failed to read job configuration from stdin")?;
            Ok(payload)
        }
        Some(inline) if inline.trim_start().starts_with('{') => Ok(inline.to_string()),
        Some(path) => std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read job configuration: {path}")),
    }
}

fn print_json(summary: &JobSummary) -> Result<()> {
    let out = json!({
        "runId": summary.run_id.0,
        "progress": summary.progress,
        "classes": summary.classes,
        "split": summary.split,
        "skippedFiles": summary.skipped_files,
        "weights": summary.weights_path,
        "manifest": summary.manifest_path,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_summary(summary: &JobSummary) {
    let loss = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Run: {}", summary.run_id.to_string().cyan());
    println!("  Classes: {}", summary.classes.join(", "));
    println!(
        "  Split: train={} val={} test={} (skipped {} unreadable files)",
        summary.split.train, summary.split.val, summary.split.test, summary.skipped_files
    );
    println!("  Steps: {}/{}", summary.progress.steps_complete, summary.progress.max_steps);
    println!(
        "  Loss: train={} val={}",
        loss(summary.progress.training_loss),
        loss(summary.progress.validation_loss)
    );
    println!("  Weights: {}", summary.weights_path.display().to_string().dimmed());
    println!("  Manifest: {}", summary.manifest_path.display().to_string().dimmed());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_training::{Progress, RecordingSink, SplitSizes, TrainingRunId, TrainingStatus};
    use std::path::PathBuf;
    use std::time::Duration;

    fn reporter() -> (Arc<RecordingSink>, ProgressReporter) {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());
        (sink, reporter)
    }

    fn summary() -> JobSummary {
        JobSummary {
            run_id: TrainingRunId::new(),
            progress: Progress { status: TrainingStatus::Complete, ..Progress::default() },
            classes: vec!["cats".to_string()],
            split: SplitSizes::default(),
            skipped_files: 0,
            weights_path: PathBuf::from("model.safetensors"),
            manifest_path: PathBuf::from("training_manifest.json"),
        }
    }

    #[tokio::test]
    async fn test_termination_announces_error_and_cancels_job() {
        let (sink, reporter) = reporter();
        reporter.publish(&Progress { steps_complete: 3, max_steps: 10, status: TrainingStatus::Training, ..Progress::default() });
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(summary())
        });

        let err = supervise(handle, async { "SIGTERM" }, &reporter).await.unwrap_err();
        assert!(err.to_string().contains("aborted by SIGTERM"));

        let last = sink.frames().last().cloned().unwrap();
        assert_eq!(last.status, TrainingStatus::Error);
        assert_eq!(last.steps_complete, 3);
    }

    #[tokio::test]
    async fn test_finished_job_wins_over_pending_signal() {
        let (sink, reporter) = reporter();
        let handle = tokio::spawn(async { Ok(summary()) });

        let done = supervise(handle, std::future::pending(), &reporter).await.unwrap();
        assert_eq!(done.classes, vec!["cats".to_string()]);
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_job_error_is_returned_without_announcing() {
        let (sink, reporter) = reporter();
        let handle = tokio::spawn(async {
            Err(lumen_training::TrainingError::Dataset("corpus root is not a directory: x".to_string()))
        });

        let err = supervise(handle, std::future::pending(), &reporter).await.unwrap_err();
        assert!(err.to_string().contains("corpus root is not a directory"));
        assert!(sink.frames().is_empty());
    }
}
