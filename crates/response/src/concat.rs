//! MP3 segment concatenation through the external codec tool.

use crate::tts::TtsError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const CONCAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Join synthesised segments into one MP3 via the ffmpeg concat demuxer.
/// If the tool fails, the first segment is written alone so the caller still
/// has something to play.
pub async fn concatenate_mp3_segments(segments: &[Vec<u8>], output: &Path) -> Result<(), TtsError> {
    let first = segments
        .first()
        .ok_or_else(|| TtsError::Concat("no segments to concatenate".to_string()))?;

    let scratch = tempfile::tempdir()?;
    let mut list = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let path = scratch.path().join(format!("segment_{i:03}.mp3"));
        std::fs::write(&path, segment)?;
        list.push_str(&format!("file '{}'\n", path.display()));
    }
    let list_path = scratch.path().join("concat.txt");
    std::fs::write(&list_path, list)?;

    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        &list_path.display().to_string(),
        "-c",
        "copy",
        "-y",
        &output.display().to_string(),
    ])
    .stdout(Stdio::null())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let result = match cmd.spawn() {
        Ok(child) => tokio::time::timeout(CONCAT_TIMEOUT, child.wait_with_output()).await,
        Err(e) => {
            tracing::warn!(error = %e, "ffmpeg unavailable, keeping first audio segment only");
            std::fs::write(output, first)?;
            return Ok(());
        }
    };

    match result {
        Ok(Ok(out)) if out.status.success() => {
            tracing::info!(segments = segments.len(), path = %output.display(), "audio segments concatenated");
            Ok(())
        }
        Ok(Ok(out)) => {
            tracing::warn!(
                status = out.status.code().unwrap_or(-1),
                "ffmpeg concatenation failed, keeping first segment only"
            );
            std::fs::write(output, first)?;
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "ffmpeg io failure, keeping first segment only");
            std::fs::write(output, first)?;
            Ok(())
        }
        Err(_) => {
            tracing::warn!("ffmpeg concatenation timed out, keeping first segment only");
            std::fs::write(output, first)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_segments_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = concatenate_mp3_segments(&[], &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::Concat(_)));
    }

    #[tokio::test]
    async fn test_falls_back_to_first_segment_without_ffmpeg() {
        // Whether or not ffmpeg exists, the call must leave a playable file:
        // real concat output, or the first segment as fallback.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp3");
        let segments = vec![vec![1u8, 2, 3], vec![4u8, 5, 6]];
        concatenate_mp3_segments(&segments, &out).await.unwrap();
        assert!(out.exists());
        assert!(!std::fs::read(&out).unwrap().is_empty());
    }
}
