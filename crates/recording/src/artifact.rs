//! Transcript artifact schema and atomic JSON writes.

use chrono::{DateTime, Utc};
use kisanvani_speech::Transcription;
use kisanvani_translate::TranslationOutcome;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The persisted transcript record, one per recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    pub transcription: Transcription,
    pub translation: TranslationOutcome,
    pub success: bool,
}

/// Serialize `value` to `path` via a temp name and rename, so the watcher and
/// other readers can never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_transcript.json");
        write_json_atomic(&path, &serde_json::json!({"success": true})).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("x_transcript.json.tmp").exists());
    }

    #[test]
    fn test_artifact_schema_field_names() {
        let artifact = TranscriptArtifact {
            file_path: "/monitor/a001.wav".to_string(),
            timestamp: Utc::now(),
            transcription: Transcription {
                transcript: "text".to_string(),
                language: "hi".to_string(),
                confidence: 0.9,
                duration: 12.5,
                speakers: None,
                error: None,
            },
            translation: TranslationOutcome {
                translated_text: "text".to_string(),
                source_language: "hi".to_string(),
                target_language: "en".to_string(),
                service: "google_cloud".to_string(),
                success: true,
                error: None,
            },
            success: true,
        };
        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["file_path"], "/monitor/a001.wav");
        assert_eq!(value["transcription"]["confidence"], 0.9);
        assert_eq!(value["translation"]["service"], "google_cloud");
        // Optional fields stay absent rather than null.
        assert!(value["transcription"].get("speakers").is_none());
        assert!(value["transcription"].get("error").is_none());
    }
}
