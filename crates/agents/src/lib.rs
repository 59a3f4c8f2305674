//! Domain specialists.
//!
//! Every specialist answers one agricultural domain through the same
//! contract: a query, a farmer profile and a mode in; a finding out. The
//! orchestrator only ever sees the [`Specialist`] trait and its tag-keyed
//! registry, so specialists know nothing about each other and tests can swap
//! in scripted mocks.

pub mod pest;
pub mod scheme;
pub mod soil;
pub mod weather;

use chrono::{DateTime, Utc};
use kisanvani_stores::FarmerProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("weather api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather api returned status {0}")]
    BadStatus(u16),
    #[error("store error: {0}")]
    Store(#[from] kisanvani_stores::StoreError),
    #[error("llm error: {0}")]
    Llm(#[from] kisanvani_llm::LlmError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Identifies a specialist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTag {
    Weather,
    Soil,
    Pest,
    Scheme,
}

impl AgentTag {
    pub const ALL: [AgentTag; 4] = [AgentTag::Weather, AgentTag::Soil, AgentTag::Pest, AgentTag::Scheme];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "weather" => Some(AgentTag::Weather),
            "soil" => Some(AgentTag::Soil),
            "pest" => Some(AgentTag::Pest),
            "scheme" | "schemes" => Some(AgentTag::Scheme),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTag::Weather => "weather",
            AgentTag::Soil => "soil",
            AgentTag::Pest => "pest",
            AgentTag::Scheme => "scheme",
        }
    }
}

impl std::fmt::Display for AgentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of answer requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Focused answer to one question.
    Specific,
    /// Season-wide guidance for the comprehensive pipeline.
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Ok,
    /// The specialist ran but had no data to answer with.
    Empty,
    Failed,
}

/// One specialist's output, collected by the orchestrator before synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFinding {
    pub agent: AgentTag,
    pub status: FindingStatus,
    /// Domain-specific payload, opaque to the orchestrator.
    pub structured: serde_json::Value,
    /// Farmer-readable summary.
    pub prose: String,
    /// Cross-agent hints: priority, risk, deadlines.
    pub insights: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentFinding {
    pub fn ok(agent: AgentTag, structured: serde_json::Value, prose: String) -> Self {
        Self {
            agent,
            status: FindingStatus::Ok,
            structured,
            prose,
            insights: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn empty(agent: AgentTag, prose: impl Into<String>) -> Self {
        Self {
            agent,
            status: FindingStatus::Empty,
            structured: serde_json::Value::Null,
            prose: prose.into(),
            insights: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(agent: AgentTag, error: impl std::fmt::Display) -> Self {
        Self {
            agent,
            status: FindingStatus::Failed,
            structured: serde_json::Value::Null,
            prose: format!("{agent} specialist unavailable: {error}"),
            insights: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_insight(mut self, key: &str, value: serde_json::Value) -> Self {
        self.insights.insert(key.to_string(), value);
        self
    }
}

/// The uniform specialist contract.
///
/// Implementations absorb their own errors: a hard failure comes back as a
/// `Failed` finding, never as a panic or an `Err` that could take down the
/// orchestration.
#[async_trait::async_trait]
pub trait Specialist: Send + Sync {
    fn tag(&self) -> AgentTag;

    async fn process(
        &self,
        query: &str,
        profile: &FarmerProfile,
        mode: AgentMode,
    ) -> AgentFinding;
}

/// Tag-keyed registry the orchestrator dispatches through.
#[derive(Default)]
pub struct SpecialistRegistry {
    specialists: BTreeMap<AgentTag, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        self.specialists.insert(specialist.tag(), specialist);
    }

    pub fn get(&self, tag: AgentTag) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(&tag).cloned()
    }

    pub fn tags(&self) -> Vec<AgentTag> {
        self.specialists.keys().copied().collect()
    }
}

/// Render the fragments of a profile that exist into prompt context; absent
/// fields simply do not appear.
pub(crate) fn profile_context(profile: &FarmerProfile) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &profile.name {
        parts.push(format!("Farmer: {name}"));
    }
    if let Some(pincode) = &profile.pincode {
        parts.push(format!("Location PIN: {pincode}"));
    }
    if let Some(state) = &profile.state {
        parts.push(format!("State: {state}"));
    }
    if let Some(land) = profile.land_total_ha {
        parts.push(format!("Total land: {land} hectares"));
    }
    if let Some(soil) = &profile.soil_type {
        parts.push(format!("Soil type: {soil}"));
    }
    if !profile.crops.is_empty() {
        let crops: Vec<String> = profile
            .crops
            .iter()
            .map(|c| match c.area_ha {
                Some(area) => format!("{} ({area} ha)", c.crop),
                None => c.crop.clone(),
            })
            .collect();
        parts.push(format!("Crops: {}", crops.join(", ")));
    }
    if let Some(budget) = &profile.budget {
        if let Some(cash) = budget.cash_on_hand_inr {
            parts.push(format!("Available cash: INR {cash}"));
        }
    }
    if parts.is_empty() {
        "Limited farmer information available".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(AgentTag::parse("Weather"), Some(AgentTag::Weather));
        assert_eq!(AgentTag::parse(" schemes "), Some(AgentTag::Scheme));
        assert_eq!(AgentTag::parse("market"), None);
    }

    #[test]
    fn test_registry_round_trip() {
        struct Dummy(AgentTag);

        #[async_trait::async_trait]
        impl Specialist for Dummy {
            fn tag(&self) -> AgentTag {
                self.0
            }
            async fn process(
                &self,
                _query: &str,
                _profile: &FarmerProfile,
                _mode: AgentMode,
            ) -> AgentFinding {
                AgentFinding::empty(self.0, "nothing")
            }
        }

        let mut registry = SpecialistRegistry::new();
        registry.register(Arc::new(Dummy(AgentTag::Pest)));
        registry.register(Arc::new(Dummy(AgentTag::Weather)));
        assert!(registry.get(AgentTag::Pest).is_some());
        assert!(registry.get(AgentTag::Soil).is_none());
        assert_eq!(registry.tags(), vec![AgentTag::Weather, AgentTag::Pest]);
    }

    #[test]
    fn test_profile_context_skips_absent_fields() {
        let profile = FarmerProfile {
            phone: "x".to_string(),
            pincode: Some("452001".to_string()),
            ..Default::default()
        };
        let context = profile_context(&profile);
        assert!(context.contains("452001"));
        assert!(!context.contains("Crops"));
        assert_eq!(
            profile_context(&FarmerProfile::default()),
            "Limited farmer information available"
        );
    }
}
