//! Fire-and-forget delivery of progress snapshots.

use crate::error::DeliveryFailure;
use crate::progress::{Progress, TrainingStatus};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Destination for progress snapshots.
///
/// `publish` must never block on the observer: a frame that cannot be handed
/// to the transport right away is reported as a `DeliveryFailure`.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, frame: &Progress) -> Result<(), DeliveryFailure>;
}

/// Wraps a sink with the job's delivery policy.
///
/// Delivery failures are swallowed, nothing is sent after a terminal
/// snapshot, and the last snapshot is remembered so the process can announce
/// an abort without access to the tracker.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    last_sent: Mutex<Option<Progress>>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink, last_sent: Mutex::new(None) }
    }

    pub fn publish(&self, frame: &Progress) {
        let Ok(mut last) = self.last_sent.lock() else {
            return;
        };
        if last.as_ref().is_some_and(|p| p.status.is_terminal()) {
            debug!(status = %frame.status, "dropping progress frame after terminal status");
            return;
        }
        match self.sink.publish(frame) {
            Ok(()) => {}
            Err(DeliveryFailure::NoPeers) => {
                debug!(steps_complete = frame.steps_complete, "progress frame dropped, no observer connected");
            }
            Err(e) => warn!(error = %e, steps_complete = frame.steps_complete, "progress frame not delivered"),
        }
        *last = Some(frame.clone());
    }

    /// Last snapshot handed to the sink, if any.
    #[must_use]
    pub fn last_sent(&self) -> Option<Progress> {
        self.last_sent.lock().ok().and_then(|last| last.clone())
    }

    /// Push `status = error` built from the last snapshot, unless the job
    /// already reached a terminal state.
    pub fn announce_abort(&self) {
        let mut frame = self.last_sent().unwrap_or_default();
        if frame.status.is_terminal() {
            return;
        }
        frame.status = TrainingStatus::Error;
        info!(steps_complete = frame.steps_complete, "announcing aborted job");
        self.publish(&frame);
    }
}

/// Logs every frame through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn publish(&self, frame: &Progress) -> Result<(), DeliveryFailure> {
        match frame.status {
            TrainingStatus::Training | TrainingStatus::Validating => debug!(
                "[{}] step {}/{} train_loss={:?} val_loss={:?}",
                frame.status, frame.steps_complete, frame.max_steps, frame.training_loss, frame.validation_loss
            ),
            status => info!("[{status}] step {}/{}", frame.steps_complete, frame.max_steps),
        }
        Ok(())
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<Progress>>,
}

impl RecordingSink {
    #[must_use]
    pub fn frames(&self) -> Vec<Progress> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, frame: &Progress) -> Result<(), DeliveryFailure> {
        self.frames.lock().map_err(|_| DeliveryFailure::Closed)?.push(frame.clone());
        Ok(())
    }
}

/// Publishes to every inner sink and reports the first failure, so a sink
/// that always accepts (such as `LogSink`) cannot hide a transport problem.
pub struct TeeSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl TeeSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for TeeSink {
    fn publish(&self, frame: &Progress) -> Result<(), DeliveryFailure> {
        let mut first_err = None;
        for (idx, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.publish(frame) {
                debug!(sink = idx, error = %e, "inner progress sink refused frame");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefusingSink;

    impl ProgressSink for RefusingSink {
        fn publish(&self, _frame: &Progress) -> Result<(), DeliveryFailure> {
            Err(DeliveryFailure::NoPeers)
        }
    }

    fn frame(status: TrainingStatus, steps: u64) -> Progress {
        Progress { steps_complete: steps, max_steps: 4, status, ..Progress::default() }
    }

    #[test]
    fn test_delivery_failure_is_swallowed() {
        let reporter = ProgressReporter::new(Arc::new(RefusingSink));
        reporter.publish(&frame(TrainingStatus::Training, 1));
        assert_eq!(reporter.last_sent().unwrap().steps_complete, 1);
    }

    #[test]
    fn test_nothing_after_terminal() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());
        reporter.publish(&frame(TrainingStatus::Validating, 4));
        reporter.publish(&frame(TrainingStatus::Complete, 4));
        reporter.publish(&frame(TrainingStatus::Training, 5));
        reporter.announce_abort();

        let statuses: Vec<_> = sink.frames().iter().map(|p| p.status).collect();
        assert_eq!(statuses, vec![TrainingStatus::Validating, TrainingStatus::Complete]);
    }

    #[test]
    fn test_announce_abort_carries_last_counters() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());
        reporter.publish(&frame(TrainingStatus::Training, 3));
        reporter.announce_abort();

        let frames = sink.frames();
        let last = frames.last().unwrap();
        assert_eq!(last.status, TrainingStatus::Error);
        assert_eq!(last.steps_complete, 3);
        assert_eq!(last.max_steps, 4);
    }

    #[test]
    fn test_announce_abort_before_any_push() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new(sink.clone());
        reporter.announce_abort();
        assert_eq!(sink.frames(), vec![Progress { status: TrainingStatus::Error, ..Progress::default() }]);
    }

    #[test]
    fn test_tee_reaches_every_sink_and_reports_failure() {
        let recording = Arc::new(RecordingSink::default());
        let tee = TeeSink::new(vec![Arc::new(RefusingSink), recording.clone()]);
        assert_eq!(tee.publish(&frame(TrainingStatus::Training, 1)), Err(DeliveryFailure::NoPeers));
        assert_eq!(recording.frames().len(), 1);

        let healthy = TeeSink::new(vec![Arc::new(LogSink), recording.clone()]);
        assert!(healthy.publish(&frame(TrainingStatus::Training, 2)).is_ok());
        assert_eq!(recording.frames().len(), 2);
    }

    #[test]
    fn test_log_sink_does_not_mask_transport_failure() {
        let tee = TeeSink::new(vec![Arc::new(RefusingSink), Arc::new(LogSink)]);
        assert_eq!(tee.publish(&frame(TrainingStatus::Validating, 3)), Err(DeliveryFailure::NoPeers));

        // The reporter still swallows it and moves on.
        let reporter = ProgressReporter::new(Arc::new(tee));
        reporter.publish(&frame(TrainingStatus::Validating, 3));
        assert_eq!(reporter.last_sent().unwrap().steps_complete, 3);
    }
}
