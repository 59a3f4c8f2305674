//! Pipeline classification: does this query need one or two specialists, or
//! the full comprehensive treatment.

use kisanvani_agents::AgentTag;
use kisanvani_llm::{extract_json, ChatModel, CompletionOptions};
use kisanvani_stores::FarmerProfile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Specific,
    Generic,
}

/// The classification decision driving dispatch.
#[derive(Debug, Clone)]
pub struct Classification {
    pub pipeline_kind: PipelineKind,
    pub reasoning: String,
    pub confidence: f64,
    pub required_agents: Vec<AgentTag>,
    pub urgency: String,
    pub complexity: String,
}

const AGENT_KEYWORDS: &[(&[&str], AgentTag)] = &[
    (&["weather", "rain", "irrigation", "irrigate", "temperature", "forecast"], AgentTag::Weather),
    (&["soil", "fertilizer", "fertiliser", "nutrient", "manure"], AgentTag::Soil),
    (&["pest", "insect", "disease", "weed", "bug", "worm"], AgentTag::Pest),
    (&["scheme", "subsidy", "loan", "government", "insurance", "credit"], AgentTag::Scheme),
];

/// Keyword mapping used when the model's reply cannot be parsed.
pub fn infer_required_agents(query: &str) -> Vec<AgentTag> {
    let query_lower = query.to_lowercase();
    let mut agents = Vec::new();
    for (keywords, tag) in AGENT_KEYWORDS {
        if keywords.iter().any(|k| query_lower.contains(k)) {
            agents.push(*tag);
        }
    }
    agents
}

/// Rule-based fallback: matched keywords make it specific with those agents,
/// anything else gets the comprehensive pipeline.
pub fn classify_fallback(query: &str) -> Classification {
    let agents = infer_required_agents(query);
    if agents.is_empty() || agents.len() > 2 {
        Classification {
            pipeline_kind: PipelineKind::Generic,
            reasoning: "keyword fallback: broad or unmatched query".to_string(),
            confidence: 0.5,
            required_agents: AgentTag::ALL.to_vec(),
            urgency: "medium".to_string(),
            complexity: "moderate".to_string(),
        }
    } else {
        Classification {
            pipeline_kind: PipelineKind::Specific,
            reasoning: "keyword fallback: matched domain terms".to_string(),
            confidence: 0.5,
            required_agents: agents,
            urgency: "medium".to_string(),
            complexity: "simple".to_string(),
        }
    }
}

pub(crate) async fn classify_with_llm(
    llm: &dyn ChatModel,
    query: &str,
    farmer: &FarmerProfile,
) -> Option<Classification> {
    let crops = farmer.crop_names().join(", ");
    let prompt = format!(
        r#"You are an agricultural coordinator deciding how to answer a farmer.

FARMER QUERY: "{query}"
FARMER CROPS: {crops}

Decide between:
1. "specific" - a targeted question one or two domain specialists can answer
   (weather/irrigation timing, pest identification, soil/fertilizer advice,
   government schemes).
2. "generic" - a broad request for comprehensive guidance (season planning,
   "help me with my farm", overall improvement).

Specialists: weather, soil, pest, scheme.

Return ONLY a JSON object:
{{
    "pipeline_kind": "specific" or "generic",
    "reasoning": "brief explanation",
    "confidence": 0.0-1.0,
    "required_agents": ["weather", "pest"] or "all",
    "urgency": "low" or "medium" or "high",
    "complexity": "simple" or "moderate" or "complex"
}}"#,
    );

    let reply = match llm.complete(&prompt, CompletionOptions::with_temperature(0.2)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "classification call failed");
            return None;
        }
    };

    let value = extract_json(&reply)?;
    let kind = match value["pipeline_kind"].as_str()? {
        "specific" => PipelineKind::Specific,
        "generic" => PipelineKind::Generic,
        other => {
            tracing::warn!(kind = other, "unknown pipeline kind from model");
            return None;
        }
    };

    let required_agents = match kind {
        PipelineKind::Generic => AgentTag::ALL.to_vec(),
        PipelineKind::Specific => {
            let listed: Vec<AgentTag> = match &value["required_agents"] {
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(AgentTag::parse)
                    .collect(),
                serde_json::Value::String(s) if s == "all" => AgentTag::ALL.to_vec(),
                _ => Vec::new(),
            };
            if listed.is_empty() {
                let inferred = infer_required_agents(query);
                if inferred.is_empty() {
                    AgentTag::ALL.to_vec()
                } else {
                    inferred
                }
            } else {
                listed
            }
        }
    };

    Some(Classification {
        pipeline_kind: kind,
        reasoning: value["reasoning"].as_str().unwrap_or("").to_string(),
        confidence: value["confidence"].as_f64().unwrap_or(0.7).clamp(0.0, 1.0),
        required_agents,
        urgency: value["urgency"].as_str().unwrap_or("medium").to_string(),
        complexity: value["complexity"].as_str().unwrap_or("moderate").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisanvani_llm::testing::ScriptedModel;

    #[test]
    fn test_keyword_inference() {
        assert_eq!(
            infer_required_agents("should I irrigate before the rain"),
            vec![AgentTag::Weather]
        );
        assert_eq!(
            infer_required_agents("white insects on cotton, and can I get a loan"),
            vec![AgentTag::Pest, AgentTag::Scheme]
        );
        assert!(infer_required_agents("tell me a story").is_empty());
    }

    #[test]
    fn test_fallback_specific_vs_generic() {
        let specific = classify_fallback("my wheat has aphids");
        assert_eq!(specific.pipeline_kind, PipelineKind::Specific);
        assert_eq!(specific.required_agents, vec![AgentTag::Pest]);

        let generic = classify_fallback("help me improve my farm this season");
        assert_eq!(generic.pipeline_kind, PipelineKind::Generic);
        assert_eq!(generic.required_agents.len(), 4);
    }

    #[tokio::test]
    async fn test_llm_classification_parses_prose_wrapped_json() {
        let llm = ScriptedModel::new(vec![
            r#"Sure, here is my analysis:
{"pipeline_kind": "specific", "reasoning": "pest question", "confidence": 0.85, "required_agents": ["pest"], "urgency": "high", "complexity": "simple"}"#,
        ]);
        let classification = classify_with_llm(&llm, "insects!", &FarmerProfile::default())
            .await
            .unwrap();
        assert_eq!(classification.pipeline_kind, PipelineKind::Specific);
        assert_eq!(classification.required_agents, vec![AgentTag::Pest]);
        assert_eq!(classification.urgency, "high");
    }

    #[tokio::test]
    async fn test_unparseable_reply_returns_none() {
        let llm = ScriptedModel::new(vec!["I think it is specific, probably."]);
        assert!(classify_with_llm(&llm, "q", &FarmerProfile::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_specific_without_agents_infers_from_query() {
        let llm = ScriptedModel::new(vec![
            r#"{"pipeline_kind": "specific", "confidence": 0.8}"#,
        ]);
        let classification =
            classify_with_llm(&llm, "fertilizer for black soil", &FarmerProfile::default())
                .await
                .unwrap();
        assert_eq!(classification.required_agents, vec![AgentTag::Soil]);
    }
}
