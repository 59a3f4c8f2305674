//! Soil specialist.
//!
//! The soil class is resolved in falling order of trust: explicit profile
//! value, model classification against the closed class set, state-to-soil
//! table, and finally the alluvial default (the most widespread class).

use crate::{profile_context, AgentFinding, AgentMode, AgentTag, Specialist};
use kisanvani_llm::{ChatModel, CompletionOptions};
use kisanvani_stores::{FarmerProfile, SoilRecord, SoilStore};
use std::sync::Arc;

/// The closed set of soil classes in the knowledge base.
pub const SOIL_TYPES: &[&str] = &[
    "alluvial", "black", "desert", "forest", "laterite", "mountain", "peaty", "red", "saline",
];

pub const DEFAULT_SOIL: &str = "alluvial";

const SOIL_ALIASES: &[(&str, &str)] = &[
    ("regur", "black"),
    ("vertisol", "black"),
    ("cotton soil", "black"),
    ("alluvium", "alluvial"),
    ("arid", "desert"),
    ("sandy desert", "desert"),
    ("lateritic", "laterite"),
    ("hill", "mountain"),
    ("marshy", "peaty"),
    ("alkaline", "saline"),
];

const STATE_SOIL_TABLE: &[(&str, &str)] = &[
    ("punjab", "alluvial"),
    ("haryana", "alluvial"),
    ("uttar pradesh", "alluvial"),
    ("bihar", "alluvial"),
    ("west bengal", "alluvial"),
    ("assam", "alluvial"),
    ("maharashtra", "black"),
    ("madhya pradesh", "black"),
    ("gujarat", "black"),
    ("telangana", "black"),
    ("tamil nadu", "red"),
    ("andhra pradesh", "red"),
    ("karnataka", "red"),
    ("jharkhand", "red"),
    ("odisha", "red"),
    ("rajasthan", "desert"),
    ("kerala", "laterite"),
    ("goa", "laterite"),
    ("himachal pradesh", "mountain"),
    ("uttarakhand", "mountain"),
    ("sikkim", "mountain"),
];

/// Canonicalise a free-form soil name against the class set and its aliases.
pub fn canonical_soil_type(raw: &str) -> Option<&'static str> {
    let lowered = raw.trim().to_lowercase();
    if let Some(exact) = SOIL_TYPES.iter().find(|t| lowered.contains(*t)) {
        return Some(exact);
    }
    SOIL_ALIASES
        .iter()
        .find(|(alias, _)| lowered.contains(alias))
        .map(|(_, class)| *class)
}

/// State-table fallback when neither the profile nor the model can decide.
pub fn soil_from_state(profile: &FarmerProfile) -> Option<&'static str> {
    let mut haystack = String::new();
    if let Some(state) = &profile.state {
        haystack.push_str(&state.to_lowercase());
    }
    if let Some(district) = &profile.district {
        haystack.push(' ');
        haystack.push_str(&district.to_lowercase());
    }
    STATE_SOIL_TABLE
        .iter()
        .find(|(region, _)| haystack.contains(region))
        .map(|(_, class)| *class)
}

/// pH class from the record's range midpoint.
pub fn ph_status(record: &SoilRecord) -> &'static str {
    match (record.ph_min, record.ph_max) {
        (Some(min), Some(max)) => {
            let mid = (min + max) / 2.0;
            if mid < 6.5 {
                "acidic"
            } else if mid <= 7.5 {
                "neutral"
            } else {
                "alkaline"
            }
        }
        _ => "unknown",
    }
}

/// Fertility class from how many nutrients the class typically lacks.
pub fn fertility_class(record: &SoilRecord) -> &'static str {
    match record.nutrients_deficient.len() {
        0 => "good",
        1 | 2 => "moderate",
        _ => "poor",
    }
}

fn prioritised_actions(record: &SoilRecord) -> Vec<String> {
    let mut actions = Vec::new();
    for nutrient in &record.nutrients_deficient {
        actions.push(format!("Correct {nutrient} deficiency before the next sowing"));
    }
    match ph_status(record) {
        "acidic" => actions.push("Apply lime to raise soil pH".to_string()),
        "alkaline" => actions.push("Apply gypsum or organic matter to lower soil pH".to_string()),
        _ => {}
    }
    if record.water_holding.as_deref() == Some("low") {
        actions.push("Add organic matter to improve water retention".to_string());
    }
    for hazard in &record.hazards {
        actions.push(format!("Mitigate {hazard} risk"));
    }
    if actions.is_empty() {
        actions.push("Maintain current soil management practices".to_string());
    }
    actions
}

pub struct SoilSpecialist {
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn SoilStore>,
}

impl SoilSpecialist {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<dyn SoilStore>) -> Self {
        Self { llm, store }
    }

    /// Resolve the farmer's soil class. Never fails; the default class is the
    /// last resort.
    pub async fn determine_soil_type(&self, profile: &FarmerProfile, query: &str) -> String {
        if let Some(explicit) = profile.soil_type.as_deref().and_then(canonical_soil_type) {
            return explicit.to_string();
        }
        if let Some(from_query) = canonical_soil_type(query) {
            return from_query.to_string();
        }

        let prompt = format!(
            r#"Determine the most likely soil class for this farmer.

Available classes: {classes}

{context}

FARMER QUERY: "{query}"

Match the location to regional soil patterns (Gangetic plain states are
alluvial, the Deccan plateau is black, peninsular uplands are red, the Thar
region is desert, the Malabar coast is laterite, Himalayan states are
mountain). Respond with exactly one class key from the list, nothing else."#,
            classes = SOIL_TYPES.join(", "),
            context = profile_context(profile),
        );

        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.1)).await {
            Ok(reply) => {
                if let Some(class) = canonical_soil_type(&reply) {
                    return class.to_string();
                }
                tracing::warn!(reply = %reply.trim(), "unrecognised soil class from model");
            }
            Err(e) => tracing::warn!(error = %e, "soil classification call failed"),
        }

        soil_from_state(profile).unwrap_or(DEFAULT_SOIL).to_string()
    }

    async fn recommendation_prose(
        &self,
        query: &str,
        record: &SoilRecord,
        profile: &FarmerProfile,
    ) -> String {
        let prompt = format!(
            r#"You are a soil scientist advising an Indian farmer.

FARMER QUERY: "{query}"

{context}

SOIL RECORD ({name}):
- pH range: {ph_min:?}-{ph_max:?}
- Water holding: {water:?}
- Deficient nutrients: {deficient}
- Known hazards: {hazards}
- Well-suited crops: {crops}

Give focused advice: fertilisation, crop fit, irrigation strategy and hazard
mitigation for this soil. Short, practical, no jargon."#,
            context = profile_context(profile),
            name = record.soil_name,
            ph_min = record.ph_min,
            ph_max = record.ph_max,
            water = record.water_holding,
            deficient = record.nutrients_deficient.join(", "),
            hazards = record.hazards.join(", "),
            crops = record.suitable_crops.join(", "),
        );
        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(prose) => prose.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "soil analysis fell back to record prose");
                format!(
                    "Your {} soil is {} with {} fertility. Recommended actions: {}.",
                    record.soil_name,
                    ph_status(record),
                    fertility_class(record),
                    prioritised_actions(record).join("; ")
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl Specialist for SoilSpecialist {
    fn tag(&self) -> AgentTag {
        AgentTag::Soil
    }

    async fn process(&self, query: &str, profile: &FarmerProfile, mode: AgentMode) -> AgentFinding {
        let soil_type = self.determine_soil_type(profile, query).await;
        tracing::info!(soil_type = %soil_type, mode = ?mode, "soil specialist processing");

        let record = match self.store.get(&soil_type) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return AgentFinding::empty(
                    AgentTag::Soil,
                    format!("No soil data available for the {soil_type} class."),
                )
            }
            Err(e) => return AgentFinding::failed(AgentTag::Soil, e),
        };

        let ph = ph_status(&record);
        let fertility = fertility_class(&record);
        let actions = prioritised_actions(&record);

        match mode {
            AgentMode::Specific => {
                let prose = self.recommendation_prose(query, &record, profile).await;
                let structured = serde_json::json!({
                    "soil_type": &soil_type,
                    "record": record,
                    "ph_status": ph,
                    "fertility": fertility,
                });
                AgentFinding::ok(AgentTag::Soil, structured, prose)
                    .with_insight("soil_type", serde_json::json!(soil_type))
                    .with_insight("fertility", serde_json::json!(fertility))
            }
            AgentMode::Generic => {
                let water_retention = record
                    .water_holding
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                let prose = format!(
                    "Your farm is on {} soil: pH {}, {} water retention, {} fertility. Priority actions: {}.",
                    record.soil_name,
                    ph,
                    water_retention,
                    fertility,
                    actions.join("; ")
                );
                let structured = serde_json::json!({
                    "soil_type": &soil_type,
                    "profile": {
                        "ph_status": ph,
                        "water_retention": water_retention,
                        "fertility": fertility,
                        "hazards": &record.hazards,
                    },
                    "prioritised_actions": &actions,
                    "suitable_crops": &record.suitable_crops,
                    "record": record,
                });
                AgentFinding::ok(AgentTag::Soil, structured, prose)
                    .with_insight("soil_type", serde_json::json!(soil_type))
                    .with_insight("fertility", serde_json::json!(fertility))
                    .with_insight("priority_actions", serde_json::json!(actions))
            }
        }
    }
}
