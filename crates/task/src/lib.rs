//! Task model for the call-processing pipeline.
//!
//! An [`AudioTask`] tracks one recording from detection to completion. Its
//! state only ever moves forward through the declared stage order; `Failed`
//! is terminal and carries the error kind that ended the task.

mod processed;

pub use processed::ProcessedLog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Audio suffixes accepted by the watcher (PBX output formats).
pub const AUDIO_SUFFIXES: &[&str] = &["wav", "mp3", "gsm", "ulaw", "alaw", "sln", "g722", "au"];

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("invalid task source path: {0}")]
    InvalidPath(PathBuf),
    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: TaskState, to: TaskState },
    #[error("processed log io error: {0}")]
    LogIo(#[from] std::io::Error),
    #[error("processed log is not valid JSON: {0}")]
    LogFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Why a task ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotReady,
    ConversionFailed,
    TranscriptionFailed,
    TranslationFailed,
    AgentFailed,
    AllAgentsFailed,
    SynthesisFailed,
    TtsFailed,
    Timeout,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::NotReady => "not_ready",
            FailureKind::ConversionFailed => "conversion_failed",
            FailureKind::TranscriptionFailed => "transcription_failed",
            FailureKind::TranslationFailed => "translation_failed",
            FailureKind::AgentFailed => "agent_failed",
            FailureKind::AllAgentsFailed => "all_agents_failed",
            FailureKind::SynthesisFailed => "synthesis_failed",
            FailureKind::TtsFailed => "tts_failed",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Stage of a task. Progression is monotone: each stage may only advance to
/// the next one in declaration order, or to `Failed` from any live stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Converting,
    Transcribing,
    Translating,
    TranscriptReady,
    Orchestrating,
    Responding,
    Done,
    Failed(FailureKind),
}

impl TaskState {
    fn rank(&self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Converting => 1,
            TaskState::Transcribing => 2,
            TaskState::Translating => 3,
            TaskState::TranscriptReady => 4,
            TaskState::Orchestrating => 5,
            TaskState::Responding => 6,
            TaskState::Done => 7,
            TaskState::Failed(_) => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed(_))
    }

    /// Whether advancing from `self` to `next` respects the one-way ordering.
    pub fn can_advance_to(&self, next: &TaskState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskState::Failed(_) => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Converting => write!(f, "converting"),
            TaskState::Transcribing => write!(f, "transcribing"),
            TaskState::Translating => write!(f, "translating"),
            TaskState::TranscriptReady => write!(f, "transcript_ready"),
            TaskState::Orchestrating => write!(f, "orchestrating"),
            TaskState::Responding => write!(f, "responding"),
            TaskState::Done => write!(f, "done"),
            TaskState::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// One recording travelling through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTask {
    pub id: String,
    pub source_path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub state: TaskState,
}

impl AudioTask {
    /// Build a task from a source file. Fails if the path has no usable stem.
    pub fn from_path(path: &Path) -> Result<Self> {
        let id = task_id_from_path(path)?;
        Ok(Self {
            id,
            source_path: path.to_path_buf(),
            detected_at: Utc::now(),
            state: TaskState::Pending,
        })
    }

    /// Advance the state machine, rejecting out-of-order transitions.
    pub fn advance(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_advance_to(&next) {
            return Err(TaskError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(task_id = %self.id, from = %self.state, to = %next, "task state change");
        self.state = next;
        Ok(())
    }

    pub fn fail(&mut self, kind: FailureKind) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!(task_id = %self.id, from = %self.state, kind = %kind, "task failed");
        self.state = TaskState::Failed(kind);
    }
}

/// Derive the stable task id from a source filename: the file stem with the
/// directory stripped. Directory separators never appear in an id.
pub fn task_id_from_path(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| TaskError::InvalidPath(path.to_path_buf()))?;
    if stem.is_empty() || stem.contains('/') || stem.contains('\\') {
        return Err(TaskError::InvalidPath(path.to_path_buf()));
    }
    Ok(stem.to_string())
}

/// Whether a path carries one of the accepted audio suffixes.
pub fn is_audio_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_SUFFIXES.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
