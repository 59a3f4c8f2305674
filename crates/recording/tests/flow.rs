//! Watch-directory to transcript-queue flow, with recognition and
//! translation stubbed out.

use kisanvani_bus::{queue, InMemoryEventBus, PipelineMetrics};
use kisanvani_recording::{ProcessOutcome, RecordingPipeline};
use kisanvani_speech::{RecognitionConfig, RecognizedAlternative, SpeechToText, Transcriber};
use kisanvani_task::ProcessedLog;
use kisanvani_translate::{TranslationProvider, Translator};
use kisanvani_watch::{DirectoryWatcher, GateConfig, WatcherHandles};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct CannedStt;

#[async_trait::async_trait]
impl SpeechToText for CannedStt {
    async fn recognize(
        &self,
        _wav: &[u8],
        _config: &RecognitionConfig,
    ) -> kisanvani_speech::Result<Vec<RecognizedAlternative>> {
        Ok(vec![RecognizedAlternative {
            transcript: "मुझे अपनी फसल के बीमा के बारे में जानना है".to_string(),
            confidence: Some(0.91),
            language_code: Some("hi-IN".to_string()),
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

struct CannedTranslator;

#[async_trait::async_trait]
impl TranslationProvider for CannedTranslator {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> kisanvani_translate::Result<String> {
        Ok("I want to know about insurance for my crop".to_string())
    }
}

fn build_pipeline(dir: &Path, metrics: Arc<PipelineMetrics>) -> RecordingPipeline {
    RecordingPipeline::new(
        Transcriber::new(
            Arc::new(CannedStt),
            RecognitionConfig::default(),
            dir.join("converted"),
        ),
        Arc::new(Translator::new(vec![Arc::new(CannedTranslator)])),
        dir.join("converted"),
        dir.join("transcripts"),
        "en".to_string(),
        16_000,
        Arc::new(InMemoryEventBus::new()),
        metrics,
    )
}

#[tokio::test]
async fn test_marked_recording_travels_to_transcript_handoff() {
    let root = tempfile::tempdir().unwrap();
    let monitor = root.path().join("monitor");
    std::fs::create_dir_all(&monitor).unwrap();
    std::fs::create_dir_all(root.path().join("converted")).unwrap();
    std::fs::create_dir_all(root.path().join("transcripts")).unwrap();

    std::fs::write(monitor.join("a001.wav"), vec![0u8; 2048]).unwrap();
    std::fs::write(monitor.join("a001.complete"), b"").unwrap();

    let processed = Arc::new(ProcessedLog::load(
        &root.path().join("processed_files.json"),
    ));
    let metrics = Arc::new(PipelineMetrics::new());
    let (task_tx, mut task_rx) = queue("audio-tasks", 8);

    let watcher = DirectoryWatcher::new(
        &monitor,
        GateConfig {
            poll_interval: Duration::from_millis(20),
            stability_window: Duration::from_millis(60),
            max_wait: Duration::from_millis(500),
            small_file_delay: Duration::from_millis(10),
            small_file_threshold: 16,
        },
        WatcherHandles {
            sink: task_tx,
            processed: Arc::clone(&processed),
            metrics: Arc::clone(&metrics),
        },
    );
    let cancel = CancellationToken::new();
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    // The watcher sweeps the pre-existing marked file and emits its task.
    let task = tokio::time::timeout(Duration::from_secs(2), task_rx.recv())
        .await
        .expect("watcher should emit the task")
        .unwrap();
    assert_eq!(task.id, "a001");

    // Run it through the recording pipeline.
    let pipeline = build_pipeline(root.path(), Arc::clone(&metrics));
    let outcome = pipeline.process(task).await.unwrap();
    let ready = match outcome {
        ProcessOutcome::Ready(ready) => ready,
        ProcessOutcome::Unusable => panic!("expected a usable transcript"),
    };

    assert_eq!(
        ready.orchestration_text(),
        "I want to know about insurance for my crop"
    );
    assert_eq!(ready.artifact.transcription.language, "hi");
    assert!(root
        .path()
        .join("transcripts")
        .join("a001_transcript.json")
        .exists());

    // At-most-once: the id is burned into the log before any handoff.
    assert!(processed.contains("a001"));
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.files_detected, 1);
    assert_eq!(snapshot.transcripts_written, 1);

    cancel.cancel();
    watcher_task.await.unwrap().unwrap();
}
