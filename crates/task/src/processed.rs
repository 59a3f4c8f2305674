//! Persistent set of already-emitted task ids.
//!
//! Shared between the watcher and the pipeline workers; every mutation is
//! written back to the on-disk JSON so a restart does not re-emit old files.

use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
struct LogFile {
    processed_files: Vec<String>,
    last_updated: String,
    #[serde(default)]
    count: usize,
}

struct Inner {
    ids: BTreeSet<String>,
    path: PathBuf,
}

/// Mutex-guarded processed-id set backed by `processed_files.json`.
pub struct ProcessedLog {
    inner: Mutex<Inner>,
}

impl ProcessedLog {
    /// Load the log from disk; a missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let ids = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<LogFile>(&contents) {
                Ok(log) => log.processed_files.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "processed log unreadable, starting empty");
                    BTreeSet::new()
                }
            },
            Err(_) => BTreeSet::new(),
        };
        tracing::info!(path = %path.display(), count = ids.len(), "processed log loaded");
        Self {
            inner: Mutex::new(Inner {
                ids,
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().expect("processed log mutex poisoned").ids.contains(id)
    }

    /// Record `id` as processed and persist. Returns false (without writing)
    /// when the id was already present, which is how duplicate events for the
    /// same recording are collapsed.
    pub fn insert(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().expect("processed log mutex poisoned");
        if !inner.ids.insert(id.to_string()) {
            return Ok(false);
        }
        persist(&inner)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("processed log mutex poisoned").ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current set out, used on shutdown.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.lock().expect("processed log mutex poisoned");
        persist(&inner)
    }
}

// Writes go to a temp name first so a crash mid-write can never leave a
// truncated log behind.
fn persist(inner: &Inner) -> Result<()> {
    let log = LogFile {
        processed_files: inner.ids.iter().cloned().collect(),
        last_updated: Utc::now().to_rfc3339(),
        count: inner.ids.len(),
    };
    let json = serde_json::to_string_pretty(&log)?;
    let tmp = inner.path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &inner.path)?;
    Ok(())
}
