//! ffmpeg/ffprobe invocations with hard deadlines.

use crate::{Result, SpeechError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Deadline for a single format conversion; PBX calls can run long.
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(300);

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const CUT_TIMEOUT: Duration = Duration::from_secs(60);

/// Convert any supported recording into 16-bit mono PCM WAV at `sample_rate`.
///
/// Headerless PBX formats need their layout spelled out on the input side;
/// everything else lets ffmpeg sniff the container.
pub async fn convert_to_wav(input: &Path, out_dir: &Path, sample_rate: u32) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");
    let output = out_dir.join(format!("{stem}.wav"));

    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let mut args: Vec<String> = vec!["-y".into()];
    match ext.as_str() {
        "ulaw" | "alaw" => {
            let fmt = if ext == "ulaw" { "mulaw" } else { "alaw" };
            args.extend(["-f".into(), fmt.into(), "-ar".into(), "8000".into(), "-ac".into(), "1".into()]);
        }
        "gsm" => {
            args.extend(["-f".into(), "gsm".into(), "-ar".into(), "8000".into()]);
        }
        "sln" => {
            // Asterisk signed linear: raw 16-bit little-endian at 8 kHz.
            args.extend(["-f".into(), "s16le".into(), "-ar".into(), "8000".into(), "-ac".into(), "1".into()]);
        }
        _ => {}
    }
    args.extend([
        "-i".into(),
        input.display().to_string(),
        "-ar".into(),
        sample_rate.to_string(),
        "-ac".into(),
        "1".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        output.display().to_string(),
    ]);

    run_tool("ffmpeg", &args, CONVERSION_TIMEOUT).await?;
    tracing::info!(input = %input.display(), output = %output.display(), "converted to wav");
    Ok(output)
}

/// Audio duration in seconds via ffprobe; falls back to 60 s when the probe
/// fails so recognition still picks a path.
pub async fn probe_duration(path: &Path) -> f64 {
    let args = [
        "-v".to_string(),
        "quiet".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "csv=p=0".to_string(),
        path.display().to_string(),
    ];
    match run_tool("ffprobe", &args, PROBE_TIMEOUT).await {
        Ok(stdout) => stdout.trim().parse::<f64>().unwrap_or_else(|_| {
            tracing::warn!(path = %path.display(), "unparseable ffprobe output, assuming 60s");
            60.0
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "duration probe failed, assuming 60s");
            60.0
        }
    }
}

/// Slice `[start, start+len)` seconds out of a WAV file for chunked recognition.
pub async fn cut_wav_window(
    input: &Path,
    output: &Path,
    start_secs: f64,
    len_secs: f64,
) -> Result<()> {
    let args = [
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-ss".to_string(),
        format!("{start_secs:.2}"),
        "-t".to_string(),
        format!("{len_secs:.2}"),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        output.display().to_string(),
    ];
    run_tool("ffmpeg", &args, CUT_TIMEOUT).await?;
    Ok(())
}

// Spawns the tool with piped output and kills the whole invocation if the
// deadline passes; a wedged codec must not wedge a pipeline worker.
async fn run_tool(tool: &'static str, args: &[String], deadline: Duration) -> Result<String> {
    let mut cmd = Command::new(tool);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SpeechError::ToolMissing(tool.to_string())
        } else {
            SpeechError::Io {
                path: PathBuf::from(tool),
                source: e,
            }
        }
    })?;

    match timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                Err(SpeechError::ToolFailed {
                    tool,
                    status: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
        Ok(Err(e)) => Err(SpeechError::Io {
            path: PathBuf::from(tool),
            source: e,
        }),
        Err(_) => {
            tracing::error!(tool, ?deadline, "codec tool deadline exhausted");
            Err(SpeechError::ToolTimeout {
                tool,
                timeout: deadline,
            })
        }
    }
}
