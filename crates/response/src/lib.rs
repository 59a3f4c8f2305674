//! Response delivery.
//!
//! Takes the orchestrator's pivot-language answer, translates it to the
//! farmer's language through the same provider chain the inbound leg used,
//! synthesises speech in provider-sized chunks, and places the playback and
//! JSON artifacts. The response JSON is written even when speech synthesis
//! fails; a missing voice must never lose the answer itself.

mod concat;
mod tts;

pub use concat::concatenate_mp3_segments;
pub use tts::{voice_for, GoogleTtsClient, TextToSpeech, TtsError, TtsVoice, TTS_BYTE_LIMIT};

use chrono::Utc;
use kisanvani_translate::{split_into_chunks, TranslationOutcome, Translator};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ResponseError>;

/// Everything delivery needs about one answered call.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub task_id: String,
    /// The farmer-facing answer in the pivot language.
    pub response_text: String,
    /// Full orchestrator payload for the response JSON (includes the generic
    /// artifacts when the comprehensive pipeline ran).
    pub orchestrator_response: serde_json::Value,
    pub pivot_language: String,
    /// Detected language of the caller; `None` falls back to the configured
    /// default.
    pub target_language: Option<String>,
    pub farmer_input: String,
    pub farmer_phone: Option<String>,
    pub original_transcript_file: String,
}

/// Terminal artifact of a delivered call.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseArtifact {
    pub target_language: String,
    pub translated_text: String,
    pub response_json_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file_path: Option<PathBuf>,
    pub metadata: serde_json::Value,
}

/// Replies that look like upstream error text are not worth speaking aloud.
pub fn looks_like_error(response: &str) -> bool {
    let trimmed = response.trim();
    if trimmed.len() < 20 {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    ["error:", "exception", "unauthorized", "not found", "timeout"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

pub struct ResponseDelivery {
    translator: Arc<Translator>,
    tts: Arc<dyn TextToSpeech>,
    responses_dir: PathBuf,
    audio_dir: PathBuf,
    playback_dir: PathBuf,
    default_language: String,
    voice_quality: String,
}

impl ResponseDelivery {
    pub fn new(
        translator: Arc<Translator>,
        tts: Arc<dyn TextToSpeech>,
        responses_dir: PathBuf,
        audio_dir: PathBuf,
        playback_dir: PathBuf,
        default_language: String,
        voice_quality: String,
    ) -> Self {
        Self {
            translator,
            tts,
            responses_dir,
            audio_dir,
            playback_dir,
            default_language,
            voice_quality,
        }
    }

    /// Deliver one response: translate, persist the JSON record, then try to
    /// produce the spoken artifact.
    pub async fn deliver(&self, request: &DeliveryRequest) -> Result<ResponseArtifact> {
        let target = request
            .target_language
            .clone()
            .filter(|lang| !lang.is_empty() && lang != "unknown")
            .unwrap_or_else(|| self.default_language.clone());

        let translation = self
            .translator
            .translate(&request.response_text, &request.pivot_language, &target)
            .await;
        if !translation.success {
            tracing::warn!(task_id = %request.task_id, "response translation failed, speaking pivot text");
        }

        let mut metadata = serde_json::json!({
            "translation_service": &translation.service,
            "translation_success": translation.success,
            "source_language": &request.pivot_language,
            "target_language": &target,
            "tts_voice_quality": &self.voice_quality,
        });

        // The JSON record goes first; audio trouble must not lose it.
        let response_json_path = self.write_response_json(request, &translation, &metadata)?;

        let audio_file_path = if looks_like_error(&request.response_text) {
            tracing::warn!(task_id = %request.task_id, "response looks like an error, skipping audio");
            None
        } else {
            match self
                .synthesize_audio(&request.task_id, &translation.translated_text, &target)
                .await
            {
                Ok((playback_path, chunk_count)) => {
                    metadata["tts_chunks"] = serde_json::json!(chunk_count);
                    self.write_audio_metadata(request, &translation, &playback_path, chunk_count)?;
                    Some(playback_path)
                }
                Err(e) => {
                    tracing::error!(task_id = %request.task_id, error = %e, "speech synthesis failed");
                    metadata["tts_error"] = serde_json::json!(e.to_string());
                    None
                }
            }
        };

        Ok(ResponseArtifact {
            target_language: target,
            translated_text: translation.translated_text,
            response_json_path,
            audio_file_path,
            metadata,
        })
    }

    fn write_response_json(
        &self,
        request: &DeliveryRequest,
        translation: &TranslationOutcome,
        metadata: &serde_json::Value,
    ) -> Result<PathBuf> {
        let record = serde_json::json!({
            "timestamp": Utc::now(),
            "original_transcript_file": &request.original_transcript_file,
            "farmer_input": &request.farmer_input,
            "farmer_phone": &request.farmer_phone,
            "orchestrator_response": &request.orchestrator_response,
            "translated_response": &translation.translated_text,
            "metadata": metadata,
        });
        let path = self
            .responses_dir
            .join(format!("{}_response.json", request.task_id));
        write_json_atomic(&path, &record)?;
        tracing::info!(task_id = %request.task_id, path = %path.display(), "response record written");
        Ok(path)
    }

    async fn synthesize_audio(
        &self,
        task_id: &str,
        text: &str,
        language: &str,
    ) -> std::result::Result<(PathBuf, usize), tts::TtsError> {
        let voice = voice_for(language, &self.voice_quality);
        let chunks = split_into_chunks(text, TTS_BYTE_LIMIT);
        tracing::info!(task_id, chunks = chunks.len(), language, "synthesising speech");

        let mut segments = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            debug_assert!(chunk.len() <= TTS_BYTE_LIMIT);
            segments.push(self.tts.synthesize(chunk, &voice).await?);
        }

        let stamped = self.audio_dir.join(format!(
            "tts_{language}_{}.mp3",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        if segments.len() == 1 {
            std::fs::write(&stamped, &segments[0]).map_err(tts::TtsError::Io)?;
        } else {
            concatenate_mp3_segments(&segments, &stamped).await?;
        }

        let playback = self.playback_dir.join(format!("{task_id}_response.mp3"));
        std::fs::copy(&stamped, &playback).map_err(tts::TtsError::Io)?;
        tracing::info!(task_id, path = %playback.display(), "playback audio ready");
        Ok((playback, chunks.len()))
    }

    fn write_audio_metadata(
        &self,
        request: &DeliveryRequest,
        translation: &TranslationOutcome,
        playback_path: &Path,
        chunk_count: usize,
    ) -> Result<()> {
        let metadata = serde_json::json!({
            "timestamp": Utc::now(),
            "original_transcript_file": &request.original_transcript_file,
            "audio_file": playback_path.display().to_string(),
            "target_language": &translation.target_language,
            "translation_service": &translation.service,
            "text_chunks": chunk_count,
            "text_bytes": translation.translated_text.len(),
            "voice_quality": &self.voice_quality,
        });
        let path = self
            .audio_dir
            .join(format!("{}_audio_metadata.json", request.task_id));
        write_json_atomic(&path, &metadata)?;
        Ok(())
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
