//! One-way progress transport.
//!
//! The job binds a `PushSocket`; observers connect over TCP and passively
//! read newline-delimited JSON snapshots. Publishing never waits on an
//! observer: frames go into a bounded broadcast queue, a slow observer loses
//! the oldest frames and a frame published with nobody connected is dropped.

use crate::error::{DeliveryFailure, TrainingResult};
use crate::progress::Progress;
use crate::reporter::ProgressSink;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Frames buffered per observer before the oldest are dropped.
const FRAME_QUEUE: usize = 1024;

pub struct PushSocket {
    local_addr: SocketAddr,
    frames: Mutex<Option<broadcast::Sender<Arc<str>>>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    writers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PushSocket {
    /// Bind the job's progress socket. Must happen before the first push.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> TrainingResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (frames, _) = broadcast::channel(FRAME_QUEUE);
        let writers = Arc::new(Mutex::new(Vec::new()));
        let acceptor = tokio::spawn(accept_loop(listener, frames.clone(), writers.clone()));
        info!(%local_addr, "progress socket bound");

        Ok(Self {
            local_addr,
            frames: Mutex::new(Some(frames)),
            acceptor: Mutex::new(Some(acceptor)),
            writers,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of observers currently attached.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.frames
            .lock()
            .ok()
            .and_then(|frames| frames.as_ref().map(broadcast::Sender::receiver_count))
            .unwrap_or(0)
    }

    /// Stop accepting observers and give queued frames up to `linger` to drain.
    pub async fn close(&self, linger: Duration) {
        let acceptor = self.acceptor.lock().ok().and_then(|mut a| a.take());
        if let Some(acceptor) = acceptor {
            acceptor.abort();
            let _ = acceptor.await;
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.take();
        }

        let writers = self.writers.lock().map(|mut w| std::mem::take(&mut *w)).unwrap_or_default();
        if tokio::time::timeout(linger, futures::future::join_all(writers)).await.is_err() {
            debug!(linger_ms = linger.as_millis() as u64, "progress socket closed with frames undelivered");
        }
    }
}

impl Drop for PushSocket {
    fn drop(&mut self) {
        if let Ok(mut acceptor) = self.acceptor.lock() {
            if let Some(handle) = acceptor.take() {
                handle.abort();
            }
        }
    }
}

impl ProgressSink for PushSocket {
    fn publish(&self, frame: &Progress) -> Result<(), DeliveryFailure> {
        let mut line = serde_json::to_string(frame).map_err(|e| DeliveryFailure::Encode(e.to_string()))?;
        line.push('\n');

        let frames = self.frames.lock().map_err(|_| DeliveryFailure::Closed)?;
        let sender = frames.as_ref().ok_or(DeliveryFailure::Closed)?;
        sender.send(Arc::from(line)).map(|_| ()).map_err(|_| DeliveryFailure::NoPeers)
    }
}

async fn accept_loop(
    listener: TcpListener,
    frames: broadcast::Sender<Arc<str>>,
    writers: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let rx = frames.subscribe();
                debug!(%peer, "progress observer connected");
                let handle = tokio::spawn(write_frames(stream, rx, peer));
                if let Ok(mut writers) = writers.lock() {
                    writers.retain(|h| !h.is_finished());
                    writers.push(handle);
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to accept progress observer");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn write_frames(mut stream: TcpStream, mut rx: broadcast::Receiver<Arc<str>>, peer: SocketAddr) {
    let _ = stream.set_nodelay(true);
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if let Err(e) = stream.write_all(frame.as_bytes()).await {
                    debug!(%peer, error = %e, "progress observer went away");
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(%peer, skipped, "progress observer lagging, frames dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    let _ = stream.shutdown().await;
}

/// Pull side of the progress channel.
pub struct ProgressSubscriber {
    lines: Lines<BufReader<TcpStream>>,
}

impl ProgressSubscriber {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> TrainingResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { lines: BufReader::new(stream).lines() })
    }

    /// Next snapshot, or `None` once the job closed the channel.
    pub async fn next_progress(&mut self) -> TrainingResult<Option<Progress>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::TrainingStatus;
    use crate::reporter::ProgressReporter;

    async fn wait_for_peers(socket: &PushSocket, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while socket.peer_count() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_observer_is_dropped() {
        let socket = PushSocket::bind("127.0.0.1:0").await.unwrap();
        let err = socket.publish(&Progress::default()).unwrap_err();
        assert_eq!(err, DeliveryFailure::NoPeers);
    }

    #[tokio::test]
    async fn test_frames_round_trip_to_observer() {
        let socket = Arc::new(PushSocket::bind("127.0.0.1:0").await.unwrap());
        let mut subscriber = ProgressSubscriber::connect(socket.local_addr()).await.unwrap();
        wait_for_peers(&socket, 1).await;

        let reporter = ProgressReporter::new(socket.clone());
        let sent = vec![
            Progress { max_steps: 2, status: TrainingStatus::Training, ..Progress::default() },
            Progress {
                steps_complete: 1,
                max_steps: 2,
                training_loss: Some(0.75),
                validation_loss: None,
                status: TrainingStatus::Training,
            },
            Progress {
                steps_complete: 2,
                max_steps: 2,
                training_loss: Some(0.75),
                validation_loss: Some(0.5),
                status: TrainingStatus::Complete,
            },
        ];
        for frame in &sent {
            reporter.publish(frame);
        }
        socket.close(Duration::from_secs(2)).await;

        let mut received = Vec::new();
        while let Some(frame) = subscriber.next_progress().await.unwrap() {
            received.push(frame);
        }
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_second_bind_on_same_address_fails() {
        let socket = PushSocket::bind("127.0.0.1:0").await.unwrap();
        assert!(PushSocket::bind(socket.local_addr()).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_after_close_reports_closed() {
        let socket = PushSocket::bind("127.0.0.1:0").await.unwrap();
        socket.close(Duration::from_millis(10)).await;
        assert_eq!(socket.publish(&Progress::default()).unwrap_err(), DeliveryFailure::Closed);
    }
}
