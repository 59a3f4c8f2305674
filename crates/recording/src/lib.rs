//! Per-recording pipeline: convert → transcribe → translate → persist.
//!
//! Stages run strictly in order for one task while many tasks run in
//! parallel across workers. Provider trouble in transcription or translation
//! is absorbed into the artifact (`success = false` plus an error string);
//! only conversion failure aborts a task outright.

mod artifact;

pub use artifact::{write_json_atomic, TranscriptArtifact};

use kisanvani_bus::{EventBusRef, PipelineMetrics};
use kisanvani_speech::{convert_to_wav, Transcriber};
use kisanvani_task::{AudioTask, FailureKind, TaskState};
use kisanvani_translate::{TranslationOutcome, Translator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] kisanvani_speech::SpeechError),
    #[error("task error: {0}")]
    Task(#[from] kisanvani_task::TaskError),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecordingError>;

/// A transcript ready for orchestration, handed over in-process.
#[derive(Debug, Clone)]
pub struct TranscriptReady {
    pub task: AudioTask,
    pub artifact: TranscriptArtifact,
    pub artifact_path: PathBuf,
}

impl TranscriptReady {
    /// Text the orchestrator should reason over: the pivot-language
    /// translation when it succeeded, else the raw transcript.
    pub fn orchestration_text(&self) -> &str {
        if self.artifact.translation.success && !self.artifact.translation.translated_text.is_empty()
        {
            &self.artifact.translation.translated_text
        } else {
            &self.artifact.transcription.transcript
        }
    }
}

/// Outcome of processing one task.
pub enum ProcessOutcome {
    /// Artifact written; transcript usable for orchestration.
    Ready(Box<TranscriptReady>),
    /// Artifact written, but there is nothing to orchestrate over.
    Unusable,
}

pub struct RecordingPipeline {
    transcriber: Transcriber,
    translator: Arc<Translator>,
    converted_dir: PathBuf,
    transcripts_dir: PathBuf,
    pivot_language: String,
    sample_rate: u32,
    events: EventBusRef,
    metrics: Arc<PipelineMetrics>,
}

impl RecordingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transcriber: Transcriber,
        translator: Arc<Translator>,
        converted_dir: PathBuf,
        transcripts_dir: PathBuf,
        pivot_language: String,
        sample_rate: u32,
        events: EventBusRef,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            transcriber,
            translator,
            converted_dir,
            transcripts_dir,
            pivot_language,
            sample_rate,
            events,
            metrics,
        }
    }

    fn set_state(&self, task: &mut AudioTask, state: TaskState) -> Result<()> {
        task.advance(state)?;
        self.events.emit(
            "task:state",
            serde_json::json!({ "task_id": &task.id, "state": state.to_string() }),
        );
        Ok(())
    }

    /// Run one task through the pipeline. The id has already passed the
    /// completeness gate and the dedup log; the deterministic artifact name
    /// makes a re-run of the same id overwrite its own output.
    pub async fn process(&self, mut task: AudioTask) -> Result<ProcessOutcome> {
        self.metrics.task_started();
        tracing::info!(task_id = %task.id, path = %task.source_path.display(), "processing recording");

        // Conversion. WAV input is already in the recognizer's container and
        // is used as-is.
        self.set_state(&mut task, TaskState::Converting)?;
        let is_wav = task
            .source_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        let wav_path = if is_wav {
            task.source_path.clone()
        } else {
            match convert_to_wav(&task.source_path, &self.converted_dir, self.sample_rate).await {
                Ok(path) => path,
                Err(e) => {
                    task.fail(FailureKind::ConversionFailed);
                    self.metrics.failure();
                    self.events.emit(
                        "task:state",
                        serde_json::json!({ "task_id": &task.id, "state": task.state.to_string() }),
                    );
                    return Err(e.into());
                }
            }
        };

        // Transcription. Failures are carried inside the result.
        self.set_state(&mut task, TaskState::Transcribing)?;
        let transcription = self.transcriber.transcribe(&wav_path).await;
        let has_transcript = !transcription.transcript.trim().is_empty();
        if let Some(error) = &transcription.error {
            tracing::warn!(task_id = %task.id, error = %error, "transcription degraded");
        }

        // Translation to the pivot language.
        self.set_state(&mut task, TaskState::Translating)?;
        let translation = if !has_transcript {
            TranslationOutcome {
                translated_text: String::new(),
                source_language: transcription.language.clone(),
                target_language: self.pivot_language.clone(),
                service: "none".to_string(),
                success: false,
                error: Some("no transcript to translate".to_string()),
            }
        } else {
            self.translator
                .translate(
                    &transcription.transcript,
                    &transcription.language,
                    &self.pivot_language,
                )
                .await
        };

        // Persist the artifact whatever happened above; partial results are
        // part of the record.
        let artifact = TranscriptArtifact {
            file_path: task.source_path.display().to_string(),
            timestamp: chrono::Utc::now(),
            transcription,
            translation,
            success: has_transcript,
        };
        let artifact_path = self
            .transcripts_dir
            .join(format!("{}_transcript.json", task.id));
        write_json_atomic(&artifact_path, &artifact)?;
        self.metrics.transcript_written();
        tracing::info!(task_id = %task.id, path = %artifact_path.display(), "transcript artifact written");

        if !has_transcript {
            task.fail(FailureKind::TranscriptionFailed);
            self.metrics.failure();
            self.events.emit(
                "task:state",
                serde_json::json!({ "task_id": &task.id, "state": task.state.to_string() }),
            );
            return Ok(ProcessOutcome::Unusable);
        }

        self.set_state(&mut task, TaskState::TranscriptReady)?;
        self.events.emit(
            "transcript:ready",
            serde_json::json!({ "task_id": &task.id, "artifact": artifact_path.display().to_string() }),
        );

        Ok(ProcessOutcome::Ready(Box::new(TranscriptReady {
            task,
            artifact,
            artifact_path,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisanvani_bus::InMemoryEventBus;
    use kisanvani_speech::{
        RecognitionConfig, RecognizedAlternative, SpeechToText, Transcriber,
    };
    use kisanvani_translate::{TranslateError, TranslationProvider};
    use std::path::Path;

    struct FakeStt {
        transcript: &'static str,
        language: &'static str,
    }

    #[async_trait::async_trait]
    impl SpeechToText for FakeStt {
        async fn recognize(
            &self,
            _wav: &[u8],
            _config: &RecognitionConfig,
        ) -> kisanvani_speech::Result<Vec<RecognizedAlternative>> {
            if self.transcript.is_empty() {
                return Err(kisanvani_speech::SpeechError::NoResults);
            }
            Ok(vec![RecognizedAlternative {
                transcript: self.transcript.to_string(),
                confidence: Some(0.92),
                language_code: Some(self.language.to_string()),
                speaker_tag: None,
            }])
        }

        async fn recognize_long_running(
            &self,
            wav: &[u8],
            config: &RecognitionConfig,
        ) -> kisanvani_speech::Result<Vec<RecognizedAlternative>> {
            self.recognize(wav, config).await
        }
    }

    struct EchoTranslator;

    #[async_trait::async_trait]
    impl TranslationProvider for EchoTranslator {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
        ) -> kisanvani_translate::Result<String> {
            Ok(format!("EN:{text}"))
        }
    }

    struct DeadTranslator;

    #[async_trait::async_trait]
    impl TranslationProvider for DeadTranslator {
        fn name(&self) -> &'static str {
            "dead"
        }

        async fn translate(
            &self,
            _text: &str,
            _source: &str,
            _target: &str,
        ) -> kisanvani_translate::Result<String> {
            Err(TranslateError::BadStatus {
                provider: "dead",
                status: 500,
            })
        }
    }

    fn pipeline(
        dir: &Path,
        stt: FakeStt,
        provider: Arc<dyn TranslationProvider>,
        events: Arc<InMemoryEventBus>,
    ) -> RecordingPipeline {
        RecordingPipeline::new(
            Transcriber::new(
                Arc::new(stt),
                RecognitionConfig::default(),
                dir.to_path_buf(),
            ),
            Arc::new(Translator::new(vec![provider])),
            dir.join("converted"),
            dir.to_path_buf(),
            "en".to_string(),
            16_000,
            events,
            Arc::new(PipelineMetrics::new()),
        )
    }

    fn wav_task(dir: &Path, name: &str) -> AudioTask {
        let path = dir.join(name);
        std::fs::write(&path, b"RIFFfake").unwrap();
        AudioTask::from_path(&path).unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_writes_artifact_and_hands_over() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(InMemoryEventBus::new());
        let pipeline = pipeline(
            dir.path(),
            FakeStt {
                transcript: "मुझे फसल बीमा चाहिए",
                language: "hi-IN",
            },
            Arc::new(EchoTranslator),
            events.clone(),
        );

        let task = wav_task(dir.path(), "a001.wav");
        let outcome = pipeline.process(task).await.unwrap();
        let ready = match outcome {
            ProcessOutcome::Ready(ready) => ready,
            ProcessOutcome::Unusable => panic!("expected usable transcript"),
        };

        assert_eq!(ready.task.state, TaskState::TranscriptReady);
        assert!(ready.artifact.success);
        assert_eq!(ready.artifact.transcription.language, "hi");
        assert_eq!(ready.orchestration_text(), "EN:मुझे फसल बीमा चाहिए");
        assert!(ready.artifact_path.ends_with("a001_transcript.json"));

        // Artifact JSON follows the published schema.
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&ready.artifact_path).unwrap()).unwrap();
        assert_eq!(raw["success"], true);
        assert_eq!(raw["transcription"]["language"], "hi");
        assert_eq!(raw["translation"]["target_language"], "en");
        assert_eq!(raw["translation"]["service"], "echo");
    }

    #[tokio::test]
    async fn test_states_progress_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(InMemoryEventBus::new());
        let pipeline = pipeline(
            dir.path(),
            FakeStt {
                transcript: "text",
                language: "hi-IN",
            },
            Arc::new(EchoTranslator),
            events.clone(),
        );

        pipeline.process(wav_task(dir.path(), "a002.wav")).await.unwrap();

        let observed: Vec<String> = events
            .events_for("task:state")
            .into_iter()
            .map(|e| e.payload["state"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            observed,
            vec!["converting", "transcribing", "translating", "transcript_ready"]
        );
    }

    #[tokio::test]
    async fn test_translation_failure_preserves_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(InMemoryEventBus::new());
        let pipeline = pipeline(
            dir.path(),
            FakeStt {
                transcript: "बिल्कुल अनोखा वाक्य",
                language: "hi-IN",
            },
            Arc::new(DeadTranslator),
            events,
        );

        let outcome = pipeline.process(wav_task(dir.path(), "a003.wav")).await.unwrap();
        let ready = match outcome {
            ProcessOutcome::Ready(ready) => ready,
            ProcessOutcome::Unusable => panic!("transcript text exists, should stay usable"),
        };

        // Transcript text is preserved verbatim regardless of translation.
        assert_eq!(ready.artifact.transcription.transcript, "बिल्कुल अनोखा वाक्य");
        assert!(!ready.artifact.translation.success);
        // Orchestration falls back to the source text.
        assert_eq!(ready.orchestration_text(), "बिल्कुल अनोखा वाक्य");
    }

    #[tokio::test]
    async fn test_empty_transcription_is_unusable_but_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(InMemoryEventBus::new());
        let pipeline = pipeline(
            dir.path(),
            FakeStt {
                transcript: "",
                language: "hi-IN",
            },
            Arc::new(EchoTranslator),
            events,
        );

        let outcome = pipeline.process(wav_task(dir.path(), "a004.wav")).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Unusable));

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("a004_transcript.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["success"], false);
        assert_eq!(raw["transcription"]["transcript"], "");
    }
}
