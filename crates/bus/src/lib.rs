//! In-process plumbing between pipeline stages.
//!
//! Stages hand work to each other over bounded [`Queue`]s; the transcript
//! handoff in particular is an explicit channel rather than a filesystem
//! round-trip, so the watcher can never re-trigger on an artifact the
//! pipeline itself wrote.

mod events;

pub use events::{EmittedEvent, EventBus, EventBusRef, InMemoryEventBus, NullEventBus};

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Default capacity for stage queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Sender half of a stage queue.
#[derive(Clone)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    name: &'static str,
}

impl<T> QueueSender<T> {
    /// Enqueue an item, waiting for space. Returns false if the receiving
    /// stage has shut down.
    pub async fn send(&self, item: T) -> bool {
        match self.tx.send(item).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(queue = self.name, "queue closed, item dropped");
                false
            }
        }
    }

    /// Non-blocking enqueue, used from sync contexts and tests.
    pub fn try_send(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(queue = self.name, "queue full, item dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Receiver half of a stage queue.
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Receive the next item; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Create a named bounded queue connecting two stages.
pub fn queue<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tracing::debug!(queue = name, capacity, "stage queue created");
    (QueueSender { tx, name }, QueueReceiver { rx })
}

/// Process-wide pipeline counters, updated lock-free from every stage.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    files_detected: AtomicU64,
    tasks_started: AtomicU64,
    transcripts_written: AtomicU64,
    orchestrations_completed: AtomicU64,
    responses_delivered: AtomicU64,
    failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_detected(&self) {
        self.files_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transcript_written(&self) {
        self.transcripts_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn orchestration_completed(&self) {
        self.orchestrations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_delivered(&self) {
        self.responses_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_detected: self.files_detected.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            transcripts_written: self.transcripts_written.load(Ordering::Relaxed),
            orchestrations_completed: self.orchestrations_completed.load(Ordering::Relaxed),
            responses_delivered: self.responses_delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pipeline counters for status logging.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub files_detected: u64,
    pub tasks_started: u64,
    pub transcripts_written: u64,
    pub orchestrations_completed: u64,
    pub responses_delivered: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let (tx, mut rx) = queue::<u32>("test", 8);
        for i in 0..5 {
            assert!(tx.send(i).await);
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_queue_closes_when_senders_drop() {
        let (tx, mut rx) = queue::<u32>("test", 2);
        tx.send(1).await;
        drop(tx);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_try_send_reports_full() {
        let (tx, _rx) = queue::<u32>("test", 1);
        assert!(tx.try_send(1));
        assert!(!tx.try_send(2));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = PipelineMetrics::new();
        metrics.file_detected();
        metrics.task_started();
        metrics.task_started();
        metrics.failure();
        let snap = metrics.snapshot();
        assert_eq!(snap.files_detected, 1);
        assert_eq!(snap.tasks_started, 2);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.responses_delivered, 0);
    }
}
