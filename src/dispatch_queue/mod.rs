//! DispatchQueue - Asynchronous Notification Delivery
//!
//! ## Responsibilities
//!
//! - Accept photo/text tasks from the detection loop without blocking
//! - Deliver them in FIFO order from a single background worker
//! - Fan each task out to every recipient, sequentially
//! - Count sent/failed tasks
//!
//! ## Delivery semantics
//!
//! - At most one attempt per task and recipient; failures are dropped
//! - A task counts as sent when at least one recipient accepted it
//! - `Shutdown` ends the worker; anything queued behind it is discarded
//! - The queue is unbounded: enqueue never waits on the network

use crate::telegram_client::Transport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default bound on how long the worker may take to exit after `Shutdown`
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One unit of outbound work
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTask {
    /// Upload the JPEG at `path`
    Photo {
        path: PathBuf,
        caption: String,
        silent: bool,
    },
    /// Plain text
    Message { text: String },
    /// Stop the worker
    Shutdown,
}

impl DispatchTask {
    fn kind(&self) -> &'static str {
        match self {
            DispatchTask::Photo { .. } => "photo",
            DispatchTask::Message { .. } => "message",
            DispatchTask::Shutdown => "shutdown",
        }
    }
}

/// Delivery counters
///
/// Written by the worker, read by the loop for reporting.
#[derive(Debug, Default)]
pub struct DispatchStats {
    sent: AtomicU64,
    failed: AtomicU64,
    enqueued: AtomicU64,
    completed: AtomicU64,
}

impl DispatchStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Tasks enqueued but not yet finished (including the one in flight)
    pub fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.completed.load(Ordering::Relaxed))
    }
}

/// Producer side of the queue
///
/// A disabled handle (transport unavailable) drops every task.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Option<mpsc::UnboundedSender<DispatchTask>>,
    stats: Arc<DispatchStats>,
}

impl DispatchHandle {
    /// Handle that drops everything
    pub fn disabled() -> Self {
        Self {
            tx: None,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Queue a task; returns false when it was dropped
    pub fn enqueue(&self, task: DispatchTask) -> bool {
        let Some(tx) = &self.tx else {
            tracing::debug!(kind = task.kind(), "Transport not available, dropping task");
            return false;
        };

        let counted = task != DispatchTask::Shutdown;
        if counted {
            self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        match tx.send(task) {
            Ok(()) => true,
            Err(e) => {
                if counted {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::warn!(kind = e.0.kind(), "Dispatch worker gone, dropping task");
                false
            }
        }
    }

    /// Queue a photo
    pub fn send_photo(&self, path: PathBuf, caption: String, silent: bool) -> bool {
        self.enqueue(DispatchTask::Photo {
            path,
            caption,
            silent,
        })
    }

    /// Queue a text message
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.enqueue(DispatchTask::Message { text: text.into() })
    }
}

/// Consumer side: the spawned worker task
pub struct DispatchWorker {
    join: JoinHandle<()>,
}

/// Start the worker and return both ends
pub fn spawn(
    transport: Arc<dyn Transport>,
    recipients: Vec<String>,
) -> (DispatchHandle, DispatchWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(DispatchStats::default());

    let join = tokio::spawn(run_worker(rx, transport, recipients, stats.clone()));
    tracing::info!("Dispatch worker started");

    (
        DispatchHandle {
            tx: Some(tx),
            stats,
        },
        DispatchWorker { join },
    )
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<DispatchTask>,
    transport: Arc<dyn Transport>,
    recipients: Vec<String>,
    stats: Arc<DispatchStats>,
) {
    while let Some(task) = rx.recv().await {
        let delivered = match task {
            DispatchTask::Shutdown => break,
            DispatchTask::Photo {
                path,
                caption,
                silent,
            } => deliver_photo(transport.as_ref(), &recipients, &path, &caption, silent).await,
            DispatchTask::Message { text } => {
                deliver_message(transport.as_ref(), &recipients, &text).await
            }
        };

        if delivered {
            stats.sent.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        stats.completed.fetch_add(1, Ordering::Relaxed);
    }

    tracing::info!(
        sent = stats.sent(),
        failed = stats.failed(),
        "Dispatch worker stopped"
    );
}

async fn deliver_photo(
    transport: &dyn Transport,
    recipients: &[String],
    path: &std::path::Path,
    caption: &str,
    silent: bool,
) -> bool {
    let image = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Could not read photo for dispatch");
            return false;
        }
    };

    let mut accepted = 0usize;
    for recipient in recipients {
        match transport
            .send_photo(recipient, image.clone(), caption, silent)
            .await
        {
            Ok(()) => accepted += 1,
            Err(e) => {
                tracing::error!(chat_id = %recipient, error = %e, "Error sending photo");
            }
        }
    }
    accepted > 0
}

async fn deliver_message(transport: &dyn Transport, recipients: &[String], text: &str) -> bool {
    let mut accepted = 0usize;
    for recipient in recipients {
        match transport.send_message(recipient, text).await {
            Ok(()) => accepted += 1,
            Err(e) => {
                tracing::error!(chat_id = %recipient, error = %e, "Error sending message");
            }
        }
    }
    accepted > 0
}

impl DispatchWorker {
    /// Best-effort shutdown
    ///
    /// Waits up to `drain_timeout` for the queue to empty, sends `Shutdown`,
    /// then waits up to `join_timeout` for the worker. Returns true when the
    /// worker exited in time; either way the caller proceeds.
    pub async fn shutdown(
        self,
        handle: &DispatchHandle,
        drain_timeout: Duration,
        join_timeout: Duration,
    ) -> bool {
        let pending = handle.stats.pending();
        if pending > 0 {
            tracing::info!(pending = pending, "Waiting for remaining dispatch tasks");
        }

        let drained = tokio::time::timeout(drain_timeout, async {
            while handle.stats.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                pending = handle.stats.pending(),
                "Dispatch queue not drained in time"
            );
        }

        handle.enqueue(DispatchTask::Shutdown);

        match tokio::time::timeout(join_timeout, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Dispatch worker panicked");
                false
            }
            Err(_) => {
                tracing::warn!("Dispatch worker did not stop in time");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records every call; rejects recipients listed in `reject`
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, String)>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_photo(
            &self,
            recipient: &str,
            _image: Vec<u8>,
            caption: &str,
            _silent: bool,
        ) -> Result<()> {
            self.calls
                .lock()
                .await
                .push((recipient.to_string(), caption.to_string()));
            if self.reject.iter().any(|r| r == recipient) {
                return Err(Error::Transport("rejected".to_string()));
            }
            Ok(())
        }

        async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
            self.calls
                .lock()
                .await
                .push((recipient.to_string(), text.to_string()));
            if self.reject.iter().any(|r| r == recipient) {
                return Err(Error::Transport("rejected".to_string()));
            }
            Ok(())
        }
    }

    fn recipients(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fifo_and_stop_at_sentinel() {
        let transport = Arc::new(RecordingTransport::default());
        let (handle, worker) = spawn(transport.clone(), recipients(&["a"]));

        handle.send_message("first");
        handle.send_message("second");
        handle.enqueue(DispatchTask::Shutdown);
        handle.send_message("after");

        assert!(tokio::time::timeout(Duration::from_secs(5), worker.join)
            .await
            .is_ok());

        let texts: Vec<String> = transport.calls.lock().await.iter().map(|c| c.1.clone()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(handle.stats().sent(), 2);
    }

    #[tokio::test]
    async fn test_partial_fanout_counts_as_sent() {
        let transport = Arc::new(RecordingTransport {
            reject: recipients(&["bad"]),
            ..Default::default()
        });
        let (handle, worker) = spawn(transport.clone(), recipients(&["bad", "good"]));

        handle.send_message("hello");
        assert!(worker.shutdown(&handle, Duration::from_secs(5), WORKER_JOIN_TIMEOUT).await);

        let calls = transport.calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "bad");
        assert_eq!(calls[1].0, "good");
        assert_eq!(handle.stats().sent(), 1);
        assert_eq!(handle.stats().failed(), 0);
    }

    #[tokio::test]
    async fn test_all_recipients_reject_counts_failed() {
        let transport = Arc::new(RecordingTransport {
            reject: recipients(&["x", "y"]),
            ..Default::default()
        });
        let (handle, worker) = spawn(transport, recipients(&["x", "y"]));

        handle.send_message("hello");
        worker.shutdown(&handle, Duration::from_secs(5), WORKER_JOIN_TIMEOUT).await;
        assert_eq!(handle.stats().sent(), 0);
        assert_eq!(handle.stats().failed(), 1);
    }

    #[tokio::test]
    async fn test_photo_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let (handle, worker) = spawn(transport.clone(), recipients(&["a"]));

        handle.send_photo(path, "caption".to_string(), true);
        handle.send_photo(dir.path().join("missing.jpg"), "gone".to_string(), false);
        worker.shutdown(&handle, Duration::from_secs(5), WORKER_JOIN_TIMEOUT).await;

        assert_eq!(handle.stats().sent(), 1);
        assert_eq!(handle.stats().failed(), 1);
        assert_eq!(transport.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_handle_drops_tasks() {
        let handle = DispatchHandle::disabled();
        assert!(!handle.is_enabled());
        assert!(!handle.send_message("nobody listens"));
        assert_eq!(handle.stats().pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_first() {
        let transport = Arc::new(RecordingTransport::default());
        let (handle, worker) = spawn(transport.clone(), recipients(&["a"]));

        for i in 0..20 {
            handle.send_message(format!("msg {}", i));
        }
        assert!(worker.shutdown(&handle, Duration::from_secs(5), WORKER_JOIN_TIMEOUT).await);
        assert_eq!(handle.stats().sent(), 20);
        assert_eq!(handle.stats().pending(), 0);
    }
}
