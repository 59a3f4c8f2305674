//! Speech-to-text client and the duration-based recognition strategy.

use crate::convert::{cut_wav_window, probe_duration};
use crate::lang::normalize_language_code;
use crate::{Result, SpeechError};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Audio at or under this duration uses synchronous recognition.
pub const SYNC_RECOGNIZE_LIMIT_SECS: f64 = 60.0;
/// Window length for the chunked fallback.
pub const CHUNK_WINDOW_SECS: f64 = 50.0;
/// Overlap between consecutive chunk windows.
pub const CHUNK_OVERLAP_SECS: f64 = 5.0;

const LONG_RUNNING_DEADLINE: Duration = Duration::from_secs(600);
const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Domain phrase hints biasing recognition toward agricultural vocabulary.
pub const PHRASE_HINTS: &[&str] = &[
    "fasal", "kheti", "beej", "khad", "sinchai", "fertilizer", "irrigation",
    "pesticide", "crop insurance", "kisan credit card", "mandi", "soil",
    "wheat", "rice", "cotton", "sugarcane",
];

/// Recognition settings, built once from configuration.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub language_code: String,
    pub alternative_language_codes: Vec<String>,
    pub model: Option<String>,
    pub use_enhanced: bool,
    pub sample_rate_hertz: u32,
    pub diarization: bool,
    pub phrase_hints: Vec<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language_code: "hi-IN".to_string(),
            alternative_language_codes: Vec::new(),
            model: None,
            use_enhanced: true,
            sample_rate_hertz: 16_000,
            diarization: true,
            phrase_hints: PHRASE_HINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One alternative returned by the recognizer.
#[derive(Debug, Clone)]
pub struct RecognizedAlternative {
    pub transcript: String,
    pub confidence: Option<f32>,
    pub language_code: Option<String>,
    pub speaker_tag: Option<i32>,
}

/// Per-speaker segment carried into the transcript artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeakerSegment {
    pub speaker: String,
    pub text: String,
    pub confidence: f32,
}

/// Final transcription result. Failures are absorbed into `error` so the
/// pipeline can still write a partial artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub transcript: String,
    pub language: String,
    pub confidence: f32,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speakers: Option<Vec<SpeakerSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Transcription {
    fn failed(duration: f64, error: String) -> Self {
        Self {
            transcript: String::new(),
            language: "unknown".to_string(),
            confidence: 0.0,
            duration,
            speakers: None,
            error: Some(error),
        }
    }
}

/// Seam over the recognition provider.
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Synchronous recognition; suitable for audio up to about a minute.
    async fn recognize(
        &self,
        wav: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognizedAlternative>>;

    /// Long-running recognition for longer audio.
    async fn recognize_long_running(
        &self,
        wav: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognizedAlternative>>;
}

/// REST client for a Google-style speech endpoint.
pub struct SttHttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SttHttpClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request_body(&self, wav: &[u8], config: &RecognitionConfig) -> serde_json::Value {
        let mut recognition = serde_json::json!({
            "encoding": "LINEAR16",
            "sampleRateHertz": config.sample_rate_hertz,
            "languageCode": &config.language_code,
            "enableAutomaticPunctuation": true,
        });
        if !config.alternative_language_codes.is_empty() {
            recognition["alternativeLanguageCodes"] =
                serde_json::json!(&config.alternative_language_codes);
        }
        if let Some(model) = &config.model {
            recognition["model"] = serde_json::json!(model);
            recognition["useEnhanced"] = serde_json::json!(config.use_enhanced);
        }
        if config.diarization {
            recognition["diarizationConfig"] = serde_json::json!({
                "enableSpeakerDiarization": true,
                "minSpeakerCount": 1,
                "maxSpeakerCount": 2,
            });
        }
        if !config.phrase_hints.is_empty() {
            recognition["speechContexts"] =
                serde_json::json!([{ "phrases": &config.phrase_hints }]);
        }
        serde_json::json!({
            "config": recognition,
            "audio": { "content": base64::engine::general_purpose::STANDARD.encode(wav) },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternatives: Vec<ApiAlternative>,
    #[serde(rename = "languageCode")]
    language_code: Option<String>,
    #[serde(rename = "speakerTag")]
    speaker_tag: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ApiAlternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    response: Option<RecognizeResponse>,
    error: Option<serde_json::Value>,
}

fn flatten_results(response: RecognizeResponse) -> Vec<RecognizedAlternative> {
    response
        .results
        .into_iter()
        .filter_map(|result| {
            let language = result.language_code.clone();
            let speaker = result.speaker_tag;
            result.alternatives.into_iter().next().map(|alt| RecognizedAlternative {
                transcript: alt.transcript,
                confidence: alt.confidence,
                language_code: language,
                speaker_tag: speaker,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl SpeechToText for SttHttpClient {
    async fn recognize(
        &self,
        wav: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognizedAlternative>> {
        let url = format!("{}/v1/speech:recognize", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(wav, config))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::BadStatus(status.as_u16()));
        }
        Ok(flatten_results(response.json().await?))
    }

    async fn recognize_long_running(
        &self,
        wav: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RecognizedAlternative>> {
        let url = format!(
            "{}/v1/speech:longrunningrecognize",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(wav, config))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::BadStatus(status.as_u16()));
        }
        let operation: OperationResponse = response.json().await?;
        if operation.done {
            if operation.error.is_some() {
                return Err(SpeechError::NoResults);
            }
            return Ok(flatten_results(operation.response.unwrap_or_default()));
        }
        let Some(name) = operation.name else {
            return Err(SpeechError::NoResults);
        };

        let deadline = tokio::time::Instant::now() + LONG_RUNNING_DEADLINE;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(SpeechError::OperationTimeout(LONG_RUNNING_DEADLINE));
            }
            tokio::time::sleep(OPERATION_POLL_INTERVAL).await;

            let poll_url = format!("{}/v1/operations/{}", self.base_url.trim_end_matches('/'), name);
            let poll = self
                .http
                .get(&poll_url)
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await?;
            if !poll.status().is_success() {
                return Err(SpeechError::BadStatus(poll.status().as_u16()));
            }
            let operation: OperationResponse = poll.json().await?;
            if operation.done {
                if operation.error.is_some() {
                    return Err(SpeechError::NoResults);
                }
                return Ok(flatten_results(operation.response.unwrap_or_default()));
            }
        }
    }
}

/// Duration-aware transcriber over any [`SpeechToText`] implementation.
pub struct Transcriber {
    stt: Arc<dyn SpeechToText>,
    config: RecognitionConfig,
    chunk_dir: PathBuf,
}

impl Transcriber {
    pub fn new(stt: Arc<dyn SpeechToText>, config: RecognitionConfig, chunk_dir: PathBuf) -> Self {
        Self {
            stt,
            config,
            chunk_dir,
        }
    }

    /// Transcribe a WAV file. Never fails hard: total recognition failure is
    /// reported inside the returned [`Transcription`] so the pipeline can
    /// still persist a partial artifact.
    pub async fn transcribe(&self, wav_path: &Path) -> Transcription {
        let duration = probe_duration(wav_path).await;
        let wav = match tokio::fs::read(wav_path).await {
            Ok(bytes) => bytes,
            Err(e) => return Transcription::failed(duration, format!("read {}: {e}", wav_path.display())),
        };

        let alternatives = if duration <= SYNC_RECOGNIZE_LIMIT_SECS {
            tracing::info!(path = %wav_path.display(), duration, "synchronous recognition");
            self.stt.recognize(&wav, &self.config).await
        } else {
            tracing::info!(path = %wav_path.display(), duration, "long-running recognition");
            match self.stt.recognize_long_running(&wav, &self.config).await {
                Ok(alts) => Ok(alts),
                Err(e) => {
                    tracing::warn!(error = %e, "long-running recognition failed, falling back to chunked");
                    self.transcribe_chunked(wav_path, duration).await
                }
            }
        };

        match alternatives {
            Ok(alts) if !alts.is_empty() => self.assemble(alts, duration),
            Ok(_) => Transcription::failed(duration, "no transcription results".to_string()),
            Err(e) => Transcription::failed(duration, e.to_string()),
        }
    }

    // Re-slices the file into overlapping windows and recognizes each window
    // synchronously, keeping the best alternative per chunk in order.
    async fn transcribe_chunked(
        &self,
        wav_path: &Path,
        duration: f64,
    ) -> Result<Vec<RecognizedAlternative>> {
        let stem = wav_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let step = CHUNK_WINDOW_SECS - CHUNK_OVERLAP_SECS;
        let mut alternatives = Vec::new();
        let mut start = 0.0;
        let mut index = 0usize;

        while start < duration {
            let len = CHUNK_WINDOW_SECS.min(duration - start);
            let chunk_path = self.chunk_dir.join(format!("{stem}_chunk_{index:03}.wav"));

            if let Err(e) = cut_wav_window(wav_path, &chunk_path, start, len).await {
                tracing::warn!(index, error = %e, "failed to cut chunk window");
                start += step;
                index += 1;
                continue;
            }

            match tokio::fs::read(&chunk_path).await {
                Ok(bytes) => match self.stt.recognize(&bytes, &self.config).await {
                    Ok(chunk_alts) => {
                        // Highest-confidence alternative for this window.
                        if let Some(best) = chunk_alts.into_iter().max_by(|a, b| {
                            a.confidence
                                .unwrap_or(0.0)
                                .total_cmp(&b.confidence.unwrap_or(0.0))
                        }) {
                            alternatives.push(best);
                        }
                    }
                    Err(e) => tracing::warn!(index, error = %e, "chunk recognition failed"),
                },
                Err(e) => tracing::warn!(index, error = %e, "chunk unreadable"),
            }

            let _ = tokio::fs::remove_file(&chunk_path).await;
            start += step;
            index += 1;
        }

        if alternatives.is_empty() {
            Err(SpeechError::NoResults)
        } else {
            tracing::info!(chunks = index, kept = alternatives.len(), "chunked recognition complete");
            Ok(alternatives)
        }
    }

    fn assemble(&self, alternatives: Vec<RecognizedAlternative>, duration: f64) -> Transcription {
        let mut parts = Vec::new();
        let mut confidence_sum = 0.0f32;
        let mut confidence_count = 0usize;
        let mut detected = self.config.language_code.clone();
        let mut speakers = Vec::new();

        for (i, alt) in alternatives.iter().enumerate() {
            parts.push(alt.transcript.trim().to_string());
            if let Some(c) = alt.confidence {
                confidence_sum += c;
                confidence_count += 1;
            }
            if i == 0 {
                if let Some(code) = &alt.language_code {
                    detected = code.clone();
                }
            }
            if let Some(tag) = alt.speaker_tag {
                speakers.push(SpeakerSegment {
                    speaker: format!("Speaker {tag}"),
                    text: alt.transcript.trim().to_string(),
                    confidence: alt.confidence.unwrap_or(0.8),
                });
            }
        }

        let transcript = parts.join(" ").trim().to_string();
        let confidence = if confidence_count > 0 {
            confidence_sum / confidence_count as f32
        } else {
            0.8
        };

        Transcription {
            transcript,
            language: normalize_language_code(&detected),
            confidence,
            duration,
            speakers: if speakers.is_empty() { None } else { Some(speakers) },
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStt {
        sync_calls: AtomicUsize,
        long_calls: AtomicUsize,
        long_fails: bool,
    }

    impl FakeStt {
        fn new(long_fails: bool) -> Self {
            Self {
                sync_calls: AtomicUsize::new(0),
                long_calls: AtomicUsize::new(0),
                long_fails,
            }
        }
    }

    #[async_trait::async_trait]
    impl SpeechToText for FakeStt {
        async fn recognize(
            &self,
            _wav: &[u8],
            _config: &RecognitionConfig,
        ) -> Result<Vec<RecognizedAlternative>> {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![RecognizedAlternative {
                transcript: "namaste".to_string(),
                confidence: Some(0.9),
                language_code: Some("hi-IN".to_string()),
                speaker_tag: None,
            }])
        }

        async fn recognize_long_running(
            &self,
            _wav: &[u8],
            _config: &RecognitionConfig,
        ) -> Result<Vec<RecognizedAlternative>> {
            self.long_calls.fetch_add(1, Ordering::SeqCst);
            if self.long_fails {
                Err(SpeechError::NoResults)
            } else {
                Ok(vec![
                    RecognizedAlternative {
                        transcript: "part one".to_string(),
                        confidence: Some(0.8),
                        language_code: Some("hi-IN".to_string()),
                        speaker_tag: Some(1),
                    },
                    RecognizedAlternative {
                        transcript: "part two".to_string(),
                        confidence: Some(0.6),
                        language_code: None,
                        speaker_tag: Some(2),
                    },
                ])
            }
        }
    }

    fn write_fake_wav(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"RIFFfakewav").unwrap();
        path
    }

    #[tokio::test]
    async fn test_short_audio_uses_sync_path() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_fake_wav(dir.path(), "short.wav");
        let stt = Arc::new(FakeStt::new(false));
        // ffprobe is absent in tests so duration falls back to 60s, which is
        // exactly the synchronous limit.
        let transcriber = Transcriber::new(
            stt.clone(),
            RecognitionConfig::default(),
            dir.path().to_path_buf(),
        );
        let result = transcriber.transcribe(&wav).await;
        assert_eq!(result.transcript, "namaste");
        assert_eq!(result.language, "hi");
        assert!(result.error.is_none());
        assert_eq!(stt.sync_calls.load(Ordering::SeqCst), 1);
        assert_eq!(stt.long_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_assemble_averages_confidence_and_collects_speakers() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Transcriber::new(
            Arc::new(FakeStt::new(false)),
            RecognitionConfig::default(),
            dir.path().to_path_buf(),
        );
        let result = transcriber.assemble(
            vec![
                RecognizedAlternative {
                    transcript: "part one".to_string(),
                    confidence: Some(0.8),
                    language_code: Some("hi-IN".to_string()),
                    speaker_tag: Some(1),
                },
                RecognizedAlternative {
                    transcript: "part two".to_string(),
                    confidence: Some(0.6),
                    language_code: None,
                    speaker_tag: Some(2),
                },
            ],
            480.0,
        );
        assert_eq!(result.transcript, "part one part two");
        assert!((result.confidence - 0.7).abs() < 1e-6);
        assert_eq!(result.language, "hi");
        assert_eq!(result.speakers.as_ref().unwrap().len(), 2);
        assert_eq!(result.duration, 480.0);
    }

    #[test]
    fn test_assemble_defaults_confidence_when_unreported() {
        let dir = tempfile::tempdir().unwrap();
        let transcriber = Transcriber::new(
            Arc::new(FakeStt::new(false)),
            RecognitionConfig::default(),
            dir.path().to_path_buf(),
        );
        let result = transcriber.assemble(
            vec![RecognizedAlternative {
                transcript: "text".to_string(),
                confidence: None,
                language_code: None,
                speaker_tag: None,
            }],
            10.0,
        );
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert!(result.speakers.is_none());
    }
}
