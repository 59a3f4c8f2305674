//! Audio conversion and speech-to-text.
//!
//! Conversion shells out to ffmpeg/ffprobe with hard deadlines; recognition
//! goes through the [`SpeechToText`] seam. [`Transcriber`] picks the
//! recognition path by duration: synchronous for short audio, long-running
//! for the rest, and a chunked re-slice of the file when long-running fails.

mod convert;
mod lang;
mod stt;

pub use convert::{convert_to_wav, cut_wav_window, probe_duration, CONVERSION_TIMEOUT};
pub use lang::normalize_language_code;
pub use stt::{
    RecognitionConfig, RecognizedAlternative, SpeakerSegment, SpeechToText, SttHttpClient,
    Transcriber, Transcription, CHUNK_OVERLAP_SECS, CHUNK_WINDOW_SECS, SYNC_RECOGNIZE_LIMIT_SECS,
};

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("codec tool {tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: i32,
        stderr: String,
    },
    #[error("codec tool {tool} timed out after {timeout:?}")]
    ToolTimeout {
        tool: &'static str,
        timeout: Duration,
    },
    #[error("codec tool not found: {0}")]
    ToolMissing(String),
    #[error("audio io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("speech api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("speech api returned status {0}")]
    BadStatus(u16),
    #[error("long-running recognition did not finish within {0:?}")]
    OperationTimeout(Duration),
    #[error("recognition returned no results")]
    NoResults,
}

pub type Result<T> = std::result::Result<T, SpeechError>;
