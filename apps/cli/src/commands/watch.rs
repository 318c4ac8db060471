//! Progress watching command implementation.

use crate::commands::types::WatchArgs;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lumen_training::{Progress, ProgressSubscriber, TrainingStatus};
use std::time::{Duration, Instant};
use tracing::debug;

pub async fn execute(args: WatchArgs) -> Result<()> {
    let mut subscriber = connect_with_retry(&args.addr, Duration::from_secs(args.wait)).await?;
    let bar = (!args.json).then(|| {
        let bar = ProgressBar::new(0);
        bar.set_style(progress_style());
        bar
    });

    let mut last: Option<Progress> = None;
    while let Some(progress) = subscriber.next_progress().await.context("Malformed progress frame")? {
        match &bar {
            Some(bar) => render(bar, &progress),
            None => println!("{}", serde_json::to_string(&progress)?),
        }
        let terminal = progress.status.is_terminal();
        last = Some(progress);
        if terminal {
            break;
        }
    }

    if let Some(bar) = &bar {
        bar.finish();
    }
    match last.map(|p| p.status) {
        Some(TrainingStatus::Complete) => Ok(()),
        Some(TrainingStatus::Error) => bail!("Job reported an error"),
        _ => bail!("Progress channel closed before the job finished"),
    }
}

async fn connect_with_retry(addr: &str, wait: Duration) -> Result<ProgressSubscriber> {
    let started = Instant::now();
    loop {
        match ProgressSubscriber::connect(addr).await {
            Ok(subscriber) => return Ok(subscriber),
            Err(e) if started.elapsed() < wait => {
                debug!(error = %e, addr, "progress socket not ready, retrying");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to connect to progress socket at {addr}")),
        }
    }
}

fn render(bar: &ProgressBar, progress: &Progress) {
    if bar.length() != Some(progress.max_steps) {
        bar.set_length(progress.max_steps);
    }
    bar.set_position(progress.steps_complete);

    let loss = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    bar.set_message(format!(
        "{} train_loss={} val_loss={}",
        progress.status,
        loss(progress.training_loss),
        loss(progress.validation_loss)
    ));
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}
