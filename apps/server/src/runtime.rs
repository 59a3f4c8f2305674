//! Component wiring and the long-running worker loops.

use crate::config::{Config, AUTO_DETECT_LANGUAGES};
use anyhow::Context;
use kisanvani_agents::{
    pest::PestSpecialist,
    scheme::SchemeSpecialist,
    soil::SoilSpecialist,
    weather::{NominatimClient, OpenMeteoClient, WeatherSpecialist},
    SpecialistRegistry,
};
use kisanvani_bus::{queue, EventBus, PipelineMetrics, QueueReceiver};
use kisanvani_llm::{ChatModel, LlmClient, LlmConfig};
use kisanvani_orchestrator::{OrchestrationRequest, Orchestrator, OrchestratorError};
use kisanvani_recording::{ProcessOutcome, RecordingPipeline, TranscriptReady};
use kisanvani_response::{DeliveryRequest, GoogleTtsClient, ResponseDelivery};
use kisanvani_speech::{RecognitionConfig, SttHttpClient, Transcriber};
use kisanvani_stores::Database;
use kisanvani_task::{AudioTask, FailureKind, ProcessedLog, TaskState};
use kisanvani_translate::Translator;
use kisanvani_watch::{DirectoryWatcher, GateConfig, WatcherHandles};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Event sink that surfaces pipeline events in the logs.
struct TracingEventBus;

impl EventBus for TracingEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        tracing::debug!(topic, %payload, "pipeline event");
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    // Credentials first: without them nothing downstream can work.
    let llm_api_key = config
        .llm_api_key
        .clone()
        .context("OPENROUTER_API_KEY is not set")?;
    let google_api_key = config
        .google_api_key
        .clone()
        .context("GOOGLE_API_KEY is not set")?;

    for dir in [
        config.monitor_dir(),
        config.converted_dir(),
        config.transcripts_dir(),
        config.responses_dir(),
        config.generated_audio_dir(),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    std::fs::read_dir(config.monitor_dir())
        .with_context(|| format!("watch directory unreadable: {}", config.monitor_dir().display()))?;

    tracing::info!(root = %config.root.display(), workers = config.pipeline_workers, "kisanvani starting");

    // Shared infrastructure.
    let processed = Arc::new(ProcessedLog::load(&config.processed_log_path()));
    let metrics = Arc::new(PipelineMetrics::new());
    let events: Arc<dyn EventBus> = Arc::new(TracingEventBus);
    let cancel = CancellationToken::new();

    let database = Arc::new(
        Database::open(&config.database_path())
            .with_context(|| format!("cannot open {}", config.database_path().display()))?,
    );

    // Model client shared by the orchestrator and every specialist.
    let mut llm_config = LlmConfig::new(
        config.llm_base_url.as_str(),
        llm_api_key.as_str(),
        config.llm_model.as_str(),
    );
    llm_config.timeout = config.llm_timeout;
    let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::new(llm_config));

    // Inbound leg: recognition and translation to the pivot.
    let recognition = RecognitionConfig {
        language_code: config.primary_language.clone(),
        alternative_language_codes: if config.language_auto_detect {
            AUTO_DETECT_LANGUAGES.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        },
        model: config.stt_model.clone(),
        sample_rate_hertz: config.sample_rate,
        ..RecognitionConfig::default()
    };
    let transcriber = Transcriber::new(
        Arc::new(SttHttpClient::new(
            config.speech_api_url.as_str(),
            google_api_key.as_str(),
        )),
        recognition,
        config.converted_dir(),
    );
    let translator = Arc::new(Translator::from_services(
        &config.translation_services,
        Some(google_api_key.as_str()),
    ));

    let pipeline = Arc::new(RecordingPipeline::new(
        transcriber,
        Arc::clone(&translator),
        config.converted_dir(),
        config.transcripts_dir(),
        config.pivot_language().to_string(),
        config.sample_rate,
        Arc::clone(&events),
        Arc::clone(&metrics),
    ));

    // Specialists and the orchestrator.
    let mut registry = SpecialistRegistry::new();
    registry.register(Arc::new(WeatherSpecialist::new(
        Arc::clone(&llm),
        Arc::new(OpenMeteoClient::new()),
        Arc::new(NominatimClient::new()),
    )));
    registry.register(Arc::new(SoilSpecialist::new(
        Arc::clone(&llm),
        database.clone(),
    )));
    registry.register(Arc::new(PestSpecialist::new(
        Arc::clone(&llm),
        database.clone(),
    )));
    registry.register(Arc::new(SchemeSpecialist::new(
        Arc::clone(&llm),
        database.clone(),
    )));
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::clone(&llm), registry, database.clone())
            .with_specialist_deadline(config.specialist_deadline),
    );

    // Outbound leg.
    let delivery = Arc::new(ResponseDelivery::new(
        Arc::clone(&translator),
        Arc::new(GoogleTtsClient::new(
            config.tts_api_url.as_str(),
            google_api_key.as_str(),
        )),
        config.responses_dir(),
        config.generated_audio_dir(),
        config.generated_audio_dir(),
        config.default_reply_language(),
        config.tts_voice_quality.clone(),
    ));

    // Stage queues.
    let (task_tx, task_rx) = queue::<AudioTask>("audio-tasks", 64);
    let (transcript_tx, transcript_rx) = queue::<TranscriptReady>("transcripts", 64);

    // Watcher.
    let watcher = DirectoryWatcher::new(
        config.monitor_dir(),
        GateConfig::default(),
        WatcherHandles {
            sink: task_tx,
            processed: Arc::clone(&processed),
            metrics: Arc::clone(&metrics),
        },
    );
    let watcher_cancel = cancel.clone();
    let watcher_handle = tokio::spawn(async move { watcher.run(watcher_cancel).await });

    // Recording workers share one receiver.
    let task_rx = Arc::new(Mutex::new(task_rx));
    let mut worker_handles = Vec::new();
    for worker_id in 0..config.pipeline_workers {
        worker_handles.push(tokio::spawn(recording_worker(
            worker_id,
            Arc::clone(&task_rx),
            Arc::clone(&pipeline),
            transcript_tx.clone(),
            cancel.clone(),
        )));
    }
    drop(transcript_tx);

    // One orchestration loop consumes the transcript queue.
    let orchestration_handle = tokio::spawn(orchestration_loop(
        transcript_rx,
        Arc::clone(&orchestrator),
        Arc::clone(&delivery),
        Arc::clone(&metrics),
        config.pivot_language().to_string(),
        cancel.clone(),
    ));

    // Periodic status line.
    let status_metrics = Arc::clone(&metrics);
    let status_cancel = cancel.clone();
    let status_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = status_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = status_metrics.snapshot();
                    tracing::info!(?snapshot, "pipeline status");
                }
            }
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling outstanding work");
    cancel.cancel();

    match watcher_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("watcher failed"),
        Err(e) => tracing::error!(error = %e, "watcher task aborted"),
    }
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = orchestration_handle.await;
    let _ = status_handle.await;

    if let Err(e) = processed.flush() {
        tracing::warn!(error = %e, "could not flush processed log");
    }
    tracing::info!(snapshot = ?metrics.snapshot(), "final pipeline counters");
    Ok(())
}

async fn recording_worker(
    worker_id: usize,
    task_rx: Arc<Mutex<QueueReceiver<AudioTask>>>,
    pipeline: Arc<RecordingPipeline>,
    transcript_tx: kisanvani_bus::QueueSender<TranscriptReady>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = async { task_rx.lock().await.recv().await } => task,
        };
        let Some(task) = task else { break };
        let task_id = task.id.clone();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(worker_id, task_id = %task_id, "cancelled mid-pipeline, task abandoned as failed");
                break;
            }
            outcome = pipeline.process(task) => outcome,
        };

        match outcome {
            Ok(ProcessOutcome::Ready(ready)) => {
                if !transcript_tx.send(*ready).await {
                    tracing::warn!(worker_id, task_id = %task_id, "orchestrator queue closed");
                    break;
                }
            }
            Ok(ProcessOutcome::Unusable) => {
                tracing::warn!(worker_id, task_id = %task_id, "transcript unusable, orchestration skipped");
            }
            Err(e) => {
                tracing::error!(worker_id, task_id = %task_id, error = %e, "recording pipeline failed");
            }
        }
    }
    tracing::debug!(worker_id, "recording worker stopped");
}

async fn orchestration_loop(
    mut transcript_rx: QueueReceiver<TranscriptReady>,
    orchestrator: Arc<Orchestrator>,
    delivery: Arc<ResponseDelivery>,
    metrics: Arc<PipelineMetrics>,
    pivot_language: String,
    cancel: CancellationToken,
) {
    loop {
        let ready = tokio::select! {
            _ = cancel.cancelled() => break,
            ready = transcript_rx.recv() => ready,
        };
        let Some(ready) = ready else { break };

        let mut task = ready.task.clone();
        if let Err(e) = task.advance(TaskState::Orchestrating) {
            tracing::error!(task_id = %task.id, error = %e, "task arrived in unexpected state");
            continue;
        }

        let request = OrchestrationRequest {
            task_id: task.id.clone(),
            text: ready.orchestration_text().to_string(),
            source_language: ready.artifact.transcription.language.clone(),
        };

        let result = match orchestrator.handle(&request).await {
            Ok(result) => result,
            Err(OrchestratorError::AllAgentsFailed) => {
                task.fail(FailureKind::AllAgentsFailed);
                metrics.failure();
                tracing::error!(
                    task_id = %task.id,
                    "no specialist could answer; the caller will hear an apology on their next attempt"
                );
                continue;
            }
            Err(e) => {
                task.fail(FailureKind::AgentFailed);
                metrics.failure();
                tracing::error!(task_id = %task.id, error = %e, "orchestration failed");
                continue;
            }
        };
        metrics.orchestration_completed();

        if task.advance(TaskState::Responding).is_err() {
            continue;
        }

        let mut orchestrator_response = serde_json::json!({
            "pipeline_kind": result.pipeline_kind,
            "agents_used": &result.agents_used,
            "synthesis": &result.synthesis_text,
            "metadata": &result.metadata,
        });
        if let Some(generic) = &result.generic {
            orchestrator_response["comprehensive_strategy"] =
                serde_json::json!(generic.comprehensive_strategy);
            orchestrator_response["actionable_roadmap"] = generic.actionable_roadmap.clone();
            orchestrator_response["hyperlocal_guidance"] = generic.hyperlocal_guidance.clone();
        }

        let detected = &ready.artifact.transcription.language;
        let delivery_request = DeliveryRequest {
            task_id: task.id.clone(),
            response_text: result.synthesis_text.clone(),
            orchestrator_response,
            pivot_language: pivot_language.clone(),
            target_language: if detected == "unknown" || detected.is_empty() {
                None
            } else {
                Some(detected.clone())
            },
            farmer_input: request.text.clone(),
            farmer_phone: result.farmer_phone.clone(),
            original_transcript_file: ready
                .artifact_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        match delivery.deliver(&delivery_request).await {
            Ok(artifact) => {
                metrics.response_delivered();
                if artifact.audio_file_path.is_none() {
                    task.fail(FailureKind::TtsFailed);
                } else {
                    let _ = task.advance(TaskState::Done);
                    tracing::info!(task_id = %task.id, "call fully processed");
                }
            }
            Err(e) => {
                task.fail(FailureKind::TtsFailed);
                metrics.failure();
                tracing::error!(task_id = %task.id, error = %e, "response delivery failed");
            }
        }
    }
    tracing::debug!("orchestration loop stopped");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
