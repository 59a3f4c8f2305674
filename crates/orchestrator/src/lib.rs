//! The orchestrator: coordination heart of the pipeline.
//!
//! One call's transcript comes in; a profile is resolved, the query is
//! distilled, the pipeline is classified, the selected specialists run
//! concurrently under a joint deadline, and their findings are merged into a
//! single farmer-facing answer. A specialist failing or timing out is
//! recorded and worked around; only all of them failing aborts the call.

mod classify;
mod profile;
mod synth;

pub use classify::{classify_fallback, infer_required_agents, Classification, PipelineKind};
pub use profile::{extract_phone, ProfileResolver};
pub use synth::GenericArtifacts;

use chrono::Utc;
use kisanvani_agents::{AgentFinding, AgentMode, AgentTag, FindingStatus, SpecialistRegistry};
use kisanvani_llm::{ChatModel, CompletionOptions};
use kisanvani_stores::{FarmerProfile, FarmerProfileStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Per-specialist processing deadline.
pub const DEFAULT_SPECIALIST_DEADLINE: Duration = Duration::from_secs(30);

/// Fallback query: leading slice of the raw text.
const QUERY_FALLBACK_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no specialist returned a usable finding")]
    AllAgentsFailed,
    #[error("store error: {0}")]
    Store(#[from] kisanvani_stores::StoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Input to one orchestration, distilled from a transcript artifact.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    pub task_id: String,
    /// Pivot-language text to reason over.
    pub text: String,
    /// Detected language of the original utterance.
    pub source_language: String,
}

/// Metadata carried on the final result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationMetadata {
    pub confidence: f64,
    pub duration_ms: u64,
    pub timestamp: chrono::DateTime<Utc>,
}

/// The orchestrator's final in-memory record for one call.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub pipeline_kind: PipelineKind,
    pub agents_used: Vec<AgentTag>,
    pub findings: Vec<AgentFinding>,
    /// Farmer-facing answer in the pivot language.
    pub synthesis_text: String,
    /// Comprehensive artifacts, present for the generic pipeline only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic: Option<GenericArtifacts>,
    pub metadata: OrchestrationMetadata,
    /// Phone the profile was resolved to, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farmer_phone: Option<String>,
}

pub struct Orchestrator {
    llm: Arc<dyn ChatModel>,
    registry: SpecialistRegistry,
    profiles: ProfileResolver,
    specialist_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        registry: SpecialistRegistry,
        profile_store: Arc<dyn FarmerProfileStore>,
    ) -> Self {
        Self {
            profiles: ProfileResolver::new(Arc::clone(&llm), profile_store),
            llm,
            registry,
            specialist_deadline: DEFAULT_SPECIALIST_DEADLINE,
        }
    }

    pub fn with_specialist_deadline(mut self, deadline: Duration) -> Self {
        self.specialist_deadline = deadline;
        self
    }

    /// Process one transcript end to end.
    pub async fn handle(&self, request: &OrchestrationRequest) -> Result<OrchestrationResult> {
        let started = std::time::Instant::now();
        tracing::info!(task_id = %request.task_id, "orchestration started");

        // Step 1: who is calling.
        let farmer = self.profiles.resolve(&request.text, &request.task_id).await;

        // Step 2: what are they asking.
        let query = self.extract_query(&request.text, &farmer).await;

        // Step 3: which pipeline answers it.
        let classification = self.classify(&query, &farmer).await;
        tracing::info!(
            task_id = %request.task_id,
            kind = ?classification.pipeline_kind,
            agents = ?classification.required_agents,
            confidence = classification.confidence,
            "pipeline classified"
        );

        // Step 4: fan out and gather.
        let (tags, mode) = match classification.pipeline_kind {
            PipelineKind::Specific => (classification.required_agents.clone(), AgentMode::Specific),
            PipelineKind::Generic => (AgentTag::ALL.to_vec(), AgentMode::Generic),
        };
        let findings = self.dispatch(&tags, &query, &farmer, mode).await;

        let ok_count = findings
            .iter()
            .filter(|f| f.status == FindingStatus::Ok)
            .count();
        if ok_count == 0 {
            tracing::error!(task_id = %request.task_id, "every specialist failed or returned nothing");
            return Err(OrchestratorError::AllAgentsFailed);
        }

        // Step 5: merge.
        let (synthesis, generic) = match classification.pipeline_kind {
            PipelineKind::Specific => (
                synth::synthesize_specific(self.llm.as_ref(), &query, &farmer, &findings).await,
                None,
            ),
            PipelineKind::Generic => {
                let artifacts =
                    synth::synthesize_generic(self.llm.as_ref(), &query, &farmer, &findings).await;
                (artifacts.comprehensive_strategy.clone(), Some(artifacts))
            }
        };

        // Step 6: rewrite for the farmer.
        let synthesis_text = self.final_rewrite(&synthesis, &farmer).await;

        let result = OrchestrationResult {
            pipeline_kind: classification.pipeline_kind,
            agents_used: tags,
            findings,
            synthesis_text,
            generic,
            metadata: OrchestrationMetadata {
                confidence: classification.confidence,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            },
            farmer_phone: if farmer.phone.starts_with("anon-") {
                None
            } else {
                Some(farmer.phone.clone())
            },
        };
        tracing::info!(
            task_id = %request.task_id,
            agents_ok = ok_count,
            duration_ms = result.metadata.duration_ms,
            "orchestration complete"
        );
        Ok(result)
    }

    async fn extract_query(&self, raw: &str, farmer: &FarmerProfile) -> String {
        let prompt = format!(
            r#"A farmer said this over the phone:

"{raw}"

Extract the single main question or concern. If several are mentioned, keep
the most urgent one. Reply with only the extracted question.

Examples:
- "What fertilizer should I use for my wheat crop?"
- "My cotton plants have white insects, what should I do?"
- "I want complete farming guidance for this season""#,
        );
        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(reply) => {
                let query = reply.trim().trim_matches('"').trim_matches('\'').to_string();
                if query.is_empty() {
                    truncate_chars(raw, QUERY_FALLBACK_CHARS)
                } else {
                    tracing::debug!(farmer = %farmer.phone, query = %query, "query extracted");
                    query
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "query extraction failed, using raw text");
                truncate_chars(raw, QUERY_FALLBACK_CHARS)
            }
        }
    }

    async fn classify(&self, query: &str, farmer: &FarmerProfile) -> Classification {
        match classify::classify_with_llm(self.llm.as_ref(), query, farmer).await {
            Some(classification) => classification,
            None => {
                tracing::warn!("classification fell back to keyword rules");
                classify_fallback(query)
            }
        }
    }

    async fn dispatch(
        &self,
        tags: &[AgentTag],
        query: &str,
        farmer: &FarmerProfile,
        mode: AgentMode,
    ) -> Vec<AgentFinding> {
        let mut handles = Vec::with_capacity(tags.len());
        for &tag in tags {
            let specialist = self.registry.get(tag);
            let query = query.to_string();
            let farmer = farmer.clone();
            let deadline = self.specialist_deadline;
            handles.push(tokio::spawn(async move {
                let Some(specialist) = specialist else {
                    return AgentFinding::failed(tag, "specialist not registered");
                };
                match tokio::time::timeout(deadline, specialist.process(&query, &farmer, mode)).await
                {
                    Ok(finding) => finding,
                    Err(_) => {
                        tracing::warn!(agent = %tag, ?deadline, "specialist deadline exceeded");
                        AgentFinding::failed(tag, format!("timed out after {deadline:?}"))
                    }
                }
            }));
        }

        // All dispatched specialists are awaited; nothing is left running
        // when this returns.
        let mut findings = Vec::with_capacity(handles.len());
        for (i, handle) in futures::future::join_all(handles).await.into_iter().enumerate() {
            findings.push(handle.unwrap_or_else(|join_err| {
                tracing::error!(agent = %tags[i], error = %join_err, "specialist task panicked");
                AgentFinding::failed(tags[i], "specialist task aborted")
            }));
        }
        findings
    }

    async fn final_rewrite(&self, synthesis: &str, farmer: &FarmerProfile) -> String {
        let salutation = farmer.name.as_deref().unwrap_or("farmer");
        let prompt = format!(
            r#"Rewrite the following agricultural advice as one coherent plain-language
message addressed to {salutation}. Keep every concrete recommendation, drop
any formatting artifacts, be friendly and direct.

ADVICE:
{synthesis}"#,
        );
        match self
            .llm
            .complete(
                &prompt,
                CompletionOptions {
                    temperature: 0.5,
                    max_tokens: Some(2000),
                },
            )
            .await
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
            Ok(_) => synthesis.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "final rewrite failed, passing synthesis through");
                synthesis.to_string()
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisanvani_llm::testing::ScriptedModel;
    use kisanvani_stores::MemoryStores;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSpecialist {
        tag: AgentTag,
        outcome: FindingStatus,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl MockSpecialist {
        fn new(tag: AgentTag, outcome: FindingStatus) -> Self {
            Self {
                tag,
                outcome,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl kisanvani_agents::Specialist for MockSpecialist {
        fn tag(&self) -> AgentTag {
            self.tag
        }

        async fn process(
            &self,
            _query: &str,
            _profile: &FarmerProfile,
            _mode: AgentMode,
        ) -> AgentFinding {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                FindingStatus::Ok => AgentFinding::ok(
                    self.tag,
                    serde_json::json!({"from": self.tag.as_str()}),
                    format!("{} guidance", self.tag),
                ),
                FindingStatus::Empty => AgentFinding::empty(self.tag, "nothing"),
                FindingStatus::Failed => AgentFinding::failed(self.tag, "provider down"),
            }
        }
    }

    fn orchestrator_with(
        specialists: Vec<MockSpecialist>,
        llm: ScriptedModel,
    ) -> Orchestrator {
        let mut registry = SpecialistRegistry::new();
        for specialist in specialists {
            registry.register(Arc::new(specialist));
        }
        Orchestrator::new(
            Arc::new(llm),
            registry,
            Arc::new(MemoryStores::new()),
        )
    }

    fn request(text: &str) -> OrchestrationRequest {
        OrchestrationRequest {
            task_id: "a001".to_string(),
            text: text.to_string(),
            source_language: "hi".to_string(),
        }
    }

    #[tokio::test]
    async fn test_specific_pipeline_runs_selected_agents_concurrently() {
        let weather = MockSpecialist {
            delay: Duration::from_millis(80),
            ..MockSpecialist::new(AgentTag::Weather, FindingStatus::Ok)
        };
        let pest = MockSpecialist {
            delay: Duration::from_millis(80),
            ..MockSpecialist::new(AgentTag::Pest, FindingStatus::Ok)
        };
        let weather_calls = Arc::clone(&weather.calls);
        let pest_calls = Arc::clone(&pest.calls);
        let soil = MockSpecialist::new(AgentTag::Soil, FindingStatus::Ok);
        let soil_calls = Arc::clone(&soil.calls);

        // Scripted: profile extraction, query extraction, classification,
        // synthesis, rewrite.
        let llm = ScriptedModel::new(vec![
            "{}",
            "My cotton has white insects and should I irrigate this week?",
            r#"{"pipeline_kind": "specific", "reasoning": "two targeted concerns", "confidence": 0.9, "required_agents": ["weather", "pest"], "urgency": "medium", "complexity": "moderate"}"#,
            "Combined answer about irrigation and whiteflies.",
            "Final friendly answer.",
        ]);
        let orchestrator = orchestrator_with(vec![weather, pest, soil], llm);

        let started = std::time::Instant::now();
        let result = orchestrator
            .handle(&request("cotton white insects irrigation"))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.pipeline_kind, PipelineKind::Specific);
        assert_eq!(result.agents_used, vec![AgentTag::Weather, AgentTag::Pest]);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pest_calls.load(Ordering::SeqCst), 1);
        assert_eq!(soil_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.synthesis_text, "Final friendly answer.");
        // Two 80ms specialists in parallel finish well under 160ms.
        assert!(elapsed < Duration::from_millis(150), "dispatch was serial: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_one_failed_specialist_does_not_abort() {
        let llm = ScriptedModel::new(vec![
            "{}",
            "query",
            r#"{"pipeline_kind": "specific", "confidence": 0.8, "required_agents": ["weather", "pest"]}"#,
            "synthesis",
            "rewrite",
        ]);
        let orchestrator = orchestrator_with(
            vec![
                MockSpecialist::new(AgentTag::Weather, FindingStatus::Failed),
                MockSpecialist::new(AgentTag::Pest, FindingStatus::Ok),
            ],
            llm,
        );

        let result = orchestrator.handle(&request("insects and rain")).await.unwrap();
        let statuses: Vec<FindingStatus> = result.findings.iter().map(|f| f.status).collect();
        assert!(statuses.contains(&FindingStatus::Failed));
        assert!(statuses.contains(&FindingStatus::Ok));
        // The pest finding is intact despite the weather failure.
        let pest = result
            .findings
            .iter()
            .find(|f| f.agent == AgentTag::Pest)
            .unwrap();
        assert_eq!(pest.prose, "pest guidance");
    }

    #[tokio::test]
    async fn test_all_failed_returns_error() {
        let llm = ScriptedModel::new(vec![
            "{}",
            "query",
            r#"{"pipeline_kind": "specific", "confidence": 0.8, "required_agents": ["weather"]}"#,
        ]);
        let orchestrator = orchestrator_with(
            vec![MockSpecialist::new(AgentTag::Weather, FindingStatus::Failed)],
            llm,
        );
        let err = orchestrator.handle(&request("anything")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AllAgentsFailed));
    }

    #[tokio::test]
    async fn test_slow_specialist_is_cancelled_and_marked_failed() {
        let slow = MockSpecialist {
            delay: Duration::from_secs(10),
            ..MockSpecialist::new(AgentTag::Weather, FindingStatus::Ok)
        };
        let llm = ScriptedModel::new(vec![
            "{}",
            "query",
            r#"{"pipeline_kind": "specific", "confidence": 0.8, "required_agents": ["weather", "pest"]}"#,
            "synthesis",
            "rewrite",
        ]);
        let mut registry = SpecialistRegistry::new();
        registry.register(Arc::new(slow));
        registry.register(Arc::new(MockSpecialist::new(AgentTag::Pest, FindingStatus::Ok)));
        let orchestrator = Orchestrator::new(
            Arc::new(llm),
            registry,
            Arc::new(MemoryStores::new()),
        )
        .with_specialist_deadline(Duration::from_millis(50));

        let result = orchestrator.handle(&request("anything")).await.unwrap();
        let weather = result
            .findings
            .iter()
            .find(|f| f.agent == AgentTag::Weather)
            .unwrap();
        assert_eq!(weather.status, FindingStatus::Failed);
        assert!(weather.prose.contains("timed out"));
    }

    #[tokio::test]
    async fn test_generic_pipeline_uses_all_agents_and_builds_artifacts() {
        let llm = ScriptedModel::new(vec![
            "{}",
            "Help me improve my farm this season",
            r#"{"pipeline_kind": "generic", "confidence": 0.95, "required_agents": "all"}"#,
            "Season-wide strategy text.",
            "Final comprehensive message.",
        ]);
        let orchestrator = orchestrator_with(
            vec![
                MockSpecialist::new(AgentTag::Weather, FindingStatus::Ok),
                MockSpecialist::new(AgentTag::Soil, FindingStatus::Ok),
                MockSpecialist::new(AgentTag::Pest, FindingStatus::Ok),
                MockSpecialist::new(AgentTag::Scheme, FindingStatus::Ok),
            ],
            llm,
        );

        let result = orchestrator
            .handle(&request("help me improve my farm this season"))
            .await
            .unwrap();
        assert_eq!(result.pipeline_kind, PipelineKind::Generic);
        assert_eq!(result.agents_used.len(), 4);
        let generic = result.generic.as_ref().unwrap();
        assert_eq!(
            generic.actionable_roadmap["seasonal_calendar"]
                .as_object()
                .unwrap()
                .len(),
            12
        );
        assert!(generic.hyperlocal_guidance.get("location_specific").is_some());
    }

    #[tokio::test]
    async fn test_llm_breakdown_still_produces_an_answer() {
        // Every model call fails: classification falls back to keywords,
        // synthesis to concatenation, rewrite to passthrough.
        let orchestrator = orchestrator_with(
            vec![
                MockSpecialist::new(AgentTag::Weather, FindingStatus::Ok),
                MockSpecialist::new(AgentTag::Pest, FindingStatus::Ok),
            ],
            ScriptedModel::failing(),
        );

        let result = orchestrator
            .handle(&request("my cotton has insects and needs irrigation before rain"))
            .await
            .unwrap();
        assert_eq!(result.pipeline_kind, PipelineKind::Specific);
        assert!(result.synthesis_text.contains("pest guidance"));
    }
}
