//! Write-completeness gate.
//!
//! A freshly created recording may still be streaming out of the PBX. The
//! sidecar marker is authoritative when present; otherwise the file must
//! hold a stable size for the configured window before it may be processed.

use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Size check cadence.
    pub poll_interval: Duration,
    /// How long the size must stay unchanged.
    pub stability_window: Duration,
    /// Give up after this long.
    pub max_wait: Duration,
    /// Extra settle time for very small files before polling starts.
    pub small_file_delay: Duration,
    pub small_file_threshold: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stability_window: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
            small_file_delay: Duration::from_secs(2),
            small_file_threshold: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Vanished,
}

fn marker_path(path: &Path) -> std::path::PathBuf {
    path.with_extension("complete")
}

/// Wait for `path` to be safe to process.
pub async fn wait_until_ready(path: &Path, config: &GateConfig) -> Readiness {
    if marker_path(path).exists() {
        tracing::info!(path = %path.display(), "completion marker present");
        return Readiness::Ready;
    }

    let mut last_size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Readiness::Vanished,
    };

    if last_size < config.small_file_threshold {
        tracing::debug!(path = %path.display(), size = last_size, "very small file, waiting before polling");
        tokio::time::sleep(config.small_file_delay).await;
    }

    let deadline = tokio::time::Instant::now() + config.max_wait;
    let mut stable_for = Duration::ZERO;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(config.poll_interval).await;

        // A marker appearing mid-poll releases the file immediately.
        if marker_path(path).exists() {
            tracing::info!(path = %path.display(), "completion marker appeared during polling");
            return Readiness::Ready;
        }

        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                tracing::warn!(path = %path.display(), "file became inaccessible during gating");
                return Readiness::Vanished;
            }
        };

        if size == last_size {
            stable_for += config.poll_interval;
            if stable_for >= config.stability_window {
                tracing::info!(path = %path.display(), size, "file size stable, ready");
                return Readiness::Ready;
            }
        } else {
            tracing::debug!(path = %path.display(), from = last_size, to = size, "file still growing");
            stable_for = Duration::ZERO;
            last_size = size;
        }
    }

    tracing::warn!(path = %path.display(), final_size = last_size, "file did not stabilise in time");
    Readiness::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> GateConfig {
        GateConfig {
            poll_interval: Duration::from_millis(10),
            stability_window: Duration::from_millis(40),
            max_wait: Duration::from_millis(400),
            small_file_delay: Duration::from_millis(5),
            small_file_threshold: 16,
        }
    }

    #[tokio::test]
    async fn test_marker_wins_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, vec![0u8; 4]).unwrap();
        std::fs::write(dir.path().join("a.complete"), b"").unwrap();
        assert_eq!(wait_until_ready(&path, &fast()).await, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_stable_file_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        assert_eq!(wait_until_ready(&path, &fast()).await, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_growing_file_is_not_ready_until_it_settles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            // Grow the file twice, then stop.
            for _ in 0..2 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                let mut contents = std::fs::read(&writer_path).unwrap();
                contents.extend_from_slice(&[1u8; 64]);
                std::fs::write(&writer_path, contents).unwrap();
            }
        });

        let started = std::time::Instant::now();
        let outcome = wait_until_ready(&path, &fast()).await;
        writer.await.unwrap();

        assert_eq!(outcome, Readiness::Ready);
        // Readiness can only be declared after the growth stopped plus the
        // stability window.
        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn test_endless_churn_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let writer_path = path.clone();
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let writer_stop = stop.clone();
        let writer = tokio::spawn(async move {
            let mut n = 0u8;
            while !writer_stop.load(std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(8)).await;
                n = n.wrapping_add(1);
                let _ = std::fs::write(&writer_path, vec![n; 64 + n as usize]);
            }
        });

        let outcome = wait_until_ready(&path, &fast()).await;
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
        writer.await.unwrap();
        assert_eq!(outcome, Readiness::TimedOut);
    }

    #[tokio::test]
    async fn test_vanished_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.wav");
        assert_eq!(wait_until_ready(&path, &fast()).await, Readiness::Vanished);
    }
}
