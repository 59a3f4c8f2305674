//! Watch-directory monitor.
//!
//! Subscribes to create/modify events on the (flat) monitor directory,
//! sweeps pre-existing files at startup, runs each candidate through the
//! write-completeness gate exactly once, and emits de-duplicated
//! [`AudioTask`]s into the pipeline queue. A file id enters the processed
//! log the moment its task is emitted, so duplicate events collapse and a
//! restart never re-emits old recordings.

mod gate;

pub use gate::{GateConfig, Readiness};

use kisanvani_bus::{PipelineMetrics, QueueSender};
use kisanvani_task::{is_audio_path, task_id_from_path, AudioTask, ProcessedLog};
use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;

pub struct WatcherHandles {
    pub sink: QueueSender<AudioTask>,
    pub processed: Arc<ProcessedLog>,
    pub metrics: Arc<PipelineMetrics>,
}

/// Directory watcher. Runs until the cancellation token fires.
pub struct DirectoryWatcher {
    dir: PathBuf,
    gate: GateConfig,
    handles: WatcherHandles,
    // Ids currently inside the gate; suppresses duplicate concurrent gating
    // when create and modify events land for the same file.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, gate: GateConfig, handles: WatcherHandles) -> Self {
        Self {
            dir: dir.into(),
            gate,
            handles,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Sweep pre-existing files, then watch for new ones until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(WatchError::MissingDirectory(self.dir.clone()));
        }

        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => tracing::warn!(error = %e, "filesystem watcher event error"),
            }
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %self.dir.display(), "watching for recordings");

        self.sweep_existing(&cancel).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("watcher cancelled");
                    return Ok(());
                }
                event = event_rx.recv() => {
                    let Some(event) = event else { return Ok(()) };
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        continue;
                    }
                    for path in event.paths {
                        self.consider(path, cancel.clone());
                    }
                }
            }
        }
    }

    async fn sweep_existing(&self, cancel: &CancellationToken) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "startup sweep failed");
                return;
            }
        };
        let mut found = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_audio_path(&path) {
                found += 1;
                self.consider(path, cancel.clone());
            }
        }
        tracing::info!(found, "startup sweep complete");
    }

    // Filters a candidate path and, if new, spawns its gate. The gate runs on
    // its own task so one slow file cannot stall event handling.
    fn consider(&self, path: PathBuf, cancel: CancellationToken) {
        if !is_audio_path(&path) {
            return;
        }
        let id = match task_id_from_path(&path) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unusable path");
                return;
            }
        };
        if self.handles.processed.contains(&id) {
            tracing::debug!(task_id = %id, "already processed, suppressing");
            return;
        }
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
            if !in_flight.insert(id.clone()) {
                return;
            }
        }

        self.handles.metrics.file_detected();
        let gate = self.gate.clone();
        let sink = self.handles.sink.clone();
        let processed = Arc::clone(&self.handles.processed);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = gate::wait_until_ready(&path, &gate) => outcome,
                _ = cancel.cancelled() => Readiness::TimedOut,
            };

            match outcome {
                Readiness::Ready => {
                    match emit(&id, &path, &sink, &processed).await {
                        Ok(true) => remove_marker(&path),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!(task_id = %id, error = %e, "could not record task as processed")
                        }
                    }
                }
                Readiness::TimedOut => {
                    tracing::warn!(task_id = %id, path = %path.display(), "file never stabilised, discarding");
                }
                Readiness::Vanished => {
                    tracing::warn!(task_id = %id, path = %path.display(), "file became inaccessible, skipping");
                }
            }
            in_flight.lock().expect("in-flight set poisoned").remove(&id);
        });
    }
}

// The id goes into the processed log before the task is enqueued:
// at-most-once emission even if a duplicate event races the gate.
async fn emit(
    id: &str,
    path: &Path,
    sink: &QueueSender<AudioTask>,
    processed: &ProcessedLog,
) -> kisanvani_task::Result<bool> {
    if !processed.insert(id)? {
        tracing::debug!(task_id = %id, "concurrent duplicate suppressed");
        return Ok(false);
    }
    let task = AudioTask::from_path(path)?;
    tracing::info!(task_id = %id, path = %path.display(), "recording ready, task emitted");
    sink.send(task).await;
    Ok(true)
}

fn remove_marker(path: &Path) {
    let marker = path.with_extension("complete");
    if marker.exists() {
        if let Err(e) = std::fs::remove_file(&marker) {
            tracing::debug!(marker = %marker.display(), error = %e, "could not remove completion marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_gate() -> GateConfig {
        GateConfig {
            poll_interval: Duration::from_millis(20),
            stability_window: Duration::from_millis(60),
            max_wait: Duration::from_millis(600),
            small_file_delay: Duration::from_millis(10),
            small_file_threshold: 16,
        }
    }

    fn handles(
        dir: &Path,
    ) -> (
        WatcherHandles,
        kisanvani_bus::QueueReceiver<AudioTask>,
        Arc<ProcessedLog>,
    ) {
        let (sink, rx) = kisanvani_bus::queue("tasks", 16);
        let processed = Arc::new(ProcessedLog::load(&dir.join("processed_files.json")));
        (
            WatcherHandles {
                sink,
                processed: Arc::clone(&processed),
                metrics: Arc::new(PipelineMetrics::new()),
            },
            rx,
            processed,
        )
    }

    #[tokio::test]
    async fn test_sweep_emits_existing_marked_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a001.wav"), vec![0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("a001.complete"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let (handles, mut rx, processed) = handles(dir.path());
        let watcher = DirectoryWatcher::new(dir.path(), fast_gate(), handles);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(watcher.run(cancel.clone()));

        let task = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("task should be emitted")
            .unwrap();
        assert_eq!(task.id, "a001");
        assert!(processed.contains("a001"));
        // Marker cleanup happens just after emission on the gate task.
        let marker = dir.path().join("a001.complete");
        for _ in 0..50 {
            if !marker.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!marker.exists());

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_processed_ids_are_not_re_emitted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a002.wav"), vec![0u8; 2048]).unwrap();

        let (handles, mut rx, processed) = handles(dir.path());
        processed.insert("a002").unwrap();

        let watcher = DirectoryWatcher::new(dir.path(), fast_gate(), handles);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(watcher.run(cancel.clone()));

        let outcome = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(outcome.is_err(), "no task expected for a processed id");

        cancel.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let (handles, _rx, _) = handles(dir.path());
        let watcher = DirectoryWatcher::new(&missing, fast_gate(), handles);
        let err = watcher.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, WatchError::MissingDirectory(_)));
    }
}
