//! Pest specialist.
//!
//! Identification falls back in order: model match against the known-pest
//! vocabulary, keyword table on the query, crop and (crop, soil) tables,
//! and a default trio of widespread pests. Management advice is assembled
//! from the matched records.

use crate::{AgentFinding, AgentMode, AgentTag, Specialist};
use kisanvani_llm::{ChatModel, CompletionOptions};
use kisanvani_stores::{FarmerProfile, PestRecord, PestStore};
use std::sync::Arc;

/// Records consulted per query.
pub const SPECIFIC_PEST_LIMIT: usize = 3;
pub const GENERIC_PEST_LIMIT: usize = 5;

const DEFAULT_PESTS: &[&str] = &["Brown Planthopper", "Cotton Aphid", "Wheat Aphid"];

const PEST_KEYWORDS: &[(&str, &[&str])] = &[
    ("aphid", &["Cotton Aphid", "Wheat Aphid", "Pulse Aphid"]),
    ("borer", &["Pink Bollworm", "Coffee Berry Borer", "Maize Stem Borer", "Early Shoot Borer"]),
    ("planthopper", &["Brown Planthopper"]),
    ("thrips", &["Cotton Thrips", "Pulse Thrips"]),
    ("whitefly", &["Cotton Whitefly"]),
    ("white insects", &["Cotton Whitefly", "Cotton Aphid"]),
    ("caterpillar", &["Tobacco Caterpillar", "Jute Hairy Caterpillar"]),
    ("mite", &["Red Spider Mite", "Yellow Mite"]),
    ("termite", &["Wheat Termite"]),
    ("armyworm", &["Fall Armyworm", "Wheat Armyworm"]),
];

struct CropPests {
    crop: &'static str,
    common: &'static [&'static str],
    by_soil: &'static [(&'static str, &'static [&'static str])],
}

const CROP_PESTS: &[CropPests] = &[
    CropPests {
        crop: "rice",
        common: &["Brown Planthopper", "Rice Gall Midge", "Rice Leaf Folder", "Yellow Stem Borer"],
        by_soil: &[
            ("alluvial", &["Brown Planthopper", "Yellow Stem Borer"]),
            ("clay", &["Rice Gall Midge", "Brown Planthopper"]),
            ("loamy", &["Rice Leaf Folder", "Yellow Stem Borer"]),
        ],
    },
    CropPests {
        crop: "cotton",
        common: &["Pink Bollworm", "Cotton Aphid", "Cotton Whitefly", "Cotton Thrips"],
        by_soil: &[
            ("black", &["Pink Bollworm", "Cotton Aphid"]),
            ("red", &["Cotton Whitefly", "Cotton Thrips"]),
            ("alluvial", &["Cotton Aphid", "Pink Bollworm"]),
        ],
    },
    CropPests {
        crop: "wheat",
        common: &["Wheat Aphid", "Wheat Armyworm", "Wheat Termite"],
        by_soil: &[
            ("alluvial", &["Wheat Aphid", "Wheat Armyworm"]),
            ("black", &["Wheat Termite", "Wheat Aphid"]),
            ("red", &["Wheat Armyworm", "Wheat Termite"]),
        ],
    },
    CropPests {
        crop: "coffee",
        common: &["Coffee Berry Borer", "Coffee White Stem Borer"],
        by_soil: &[
            ("red", &["Coffee Berry Borer"]),
            ("forest", &["Coffee White Stem Borer"]),
            ("laterite", &["Coffee Berry Borer"]),
        ],
    },
    CropPests {
        crop: "sugarcane",
        common: &["Sugarcane Pyrilla", "Early Shoot Borer", "Top Borer"],
        by_soil: &[
            ("alluvial", &["Early Shoot Borer", "Top Borer"]),
            ("black", &["Sugarcane Pyrilla"]),
            ("red", &["Early Shoot Borer"]),
        ],
    },
];

/// Keyword table match on the query text.
pub fn pests_from_keywords(query: &str) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut matched = Vec::new();
    for (keyword, pests) in PEST_KEYWORDS {
        if query_lower.contains(keyword) {
            for pest in *pests {
                if !matched.iter().any(|m| m == pest) {
                    matched.push(pest.to_string());
                }
            }
        }
    }
    matched
}

/// Crop and (crop, soil) table fallback.
pub fn pests_from_crops(crops: &[String], soil_type: Option<&str>) -> Vec<String> {
    let mut found = Vec::new();
    let mut push = |name: &str| {
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
    };
    for crop in crops {
        let crop_lower = crop.to_lowercase();
        if let Some(entry) = CROP_PESTS.iter().find(|e| crop_lower.contains(e.crop)) {
            if let Some(soil) = soil_type {
                if let Some((_, soil_pests)) =
                    entry.by_soil.iter().find(|(key, _)| *key == soil.to_lowercase())
                {
                    for pest in *soil_pests {
                        push(pest);
                    }
                }
            }
            for pest in entry.common {
                push(pest);
            }
        }
    }
    found
}

/// Management priority from the worst expected crop loss across the matches.
pub fn management_priority(records: &[PestRecord]) -> &'static str {
    let max_loss = records
        .iter()
        .filter_map(|r| r.max_crop_loss_percent)
        .fold(0.0f64, f64::max);
    if max_loss > 40.0 {
        "critical"
    } else if max_loss > 20.0 {
        "high"
    } else if max_loss > 10.0 {
        "medium"
    } else {
        "low"
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TreatmentCost {
    pub min_inr: f64,
    pub max_inr: f64,
    pub per_hectare_inr: f64,
    pub options: Vec<serde_json::Value>,
}

/// Cost envelope from the pesticide market rows: top two products per pest,
/// lower bound at 60% of the listed total.
pub fn estimate_treatment_cost(records: &[PestRecord]) -> TreatmentCost {
    let mut max_total = 0.0f64;
    let mut options = Vec::new();
    for record in records {
        for listing in record.pesticides_market.iter().take(2) {
            max_total += listing.cost_inr;
            options.push(serde_json::json!({
                "product": &listing.brand_name,
                "cost_inr": listing.cost_inr,
                "unit": &listing.unit,
            }));
        }
    }
    options.truncate(3);
    TreatmentCost {
        min_inr: max_total * 0.6,
        max_inr: max_total,
        per_hectare_inr: max_total / 2.0,
        options,
    }
}

fn seasonal_calendar() -> serde_json::Value {
    serde_json::json!({
        "pre_sowing": ["Field preparation", "Soil treatment", "Seed treatment"],
        "sowing_early_growth": ["Monitor for early pests", "Preventive sprays"],
        "vegetative_growth": ["Regular scouting", "Biological control release"],
        "flowering_fruiting": ["Intensive monitoring", "Targeted interventions"],
        "harvest": ["Final treatments", "Field sanitation"],
        "post_harvest": ["Crop residue management", "Storage pest management"],
    })
}

pub struct PestSpecialist {
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn PestStore>,
}

impl PestSpecialist {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<dyn PestStore>) -> Self {
        Self { llm, store }
    }

    async fn identify_with_llm(&self, query: &str, profile: &FarmerProfile) -> Vec<String> {
        let vocabulary = match self.store.list_names() {
            Ok(names) if !names.is_empty() => names,
            _ => return Vec::new(),
        };
        let crops = profile.crop_names().join(", ");
        let prompt = format!(
            r#"You are an agricultural entomologist. Identify the pests most likely
behind this farmer's problem.

FARMER QUERY: "{query}"
CROPS GROWN: {crops}
SOIL TYPE: {soil}

KNOWN PESTS: {vocabulary}

Match the described symptoms and crop to the known pests. Reply with a JSON
list of up to 3 exact pest names from the known list, e.g.
["Pest One", "Pest Two"]. Nothing else."#,
            soil = profile.soil_type.as_deref().unwrap_or("unspecified"),
            vocabulary = vocabulary.join(", "),
        );

        let reply = match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.2)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "pest identification call failed");
                return Vec::new();
            }
        };

        let names = parse_name_list(&reply);
        // Only names the store actually knows survive.
        names
            .into_iter()
            .filter(|name| {
                matches!(self.store.get_by_common_name(name), Ok(Some(_)))
            })
            .take(SPECIFIC_PEST_LIMIT)
            .collect()
    }

    fn identify_fallback(&self, query: &str, profile: &FarmerProfile) -> Vec<String> {
        let matched = pests_from_keywords(query);
        if !matched.is_empty() {
            return matched;
        }
        let from_crops = pests_from_crops(&profile.crop_names(), profile.soil_type.as_deref());
        if !from_crops.is_empty() {
            return from_crops;
        }
        DEFAULT_PESTS.iter().map(|p| p.to_string()).collect()
    }

    fn fetch_records(&self, names: &[String], limit: usize) -> Vec<PestRecord> {
        let mut records = Vec::new();
        for name in names.iter().take(limit * 2) {
            match self.store.get_by_common_name(name) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::debug!(pest = %name, "pest not in knowledge base"),
                Err(e) => tracing::warn!(pest = %name, error = %e, "pest lookup failed"),
            }
            if records.len() == limit {
                break;
            }
        }
        records
    }

    async fn management_prose(
        &self,
        query: &str,
        records: &[PestRecord],
        priority: &str,
    ) -> String {
        let mut record_context = String::new();
        for record in records {
            record_context.push_str(&format!(
                "\n{}: symptoms {}; cultural {}; biological {}; chemical {}",
                record.common_name,
                record.symptoms.join(", "),
                record.cultural_methods.join(", "),
                record.biological_control.join(", "),
                record.chemical_control.join(", "),
            ));
        }
        let prompt = format!(
            r#"You are a pest management advisor for Indian farmers.

FARMER QUERY: "{query}"
LIKELY PESTS:{record_context}

Give concise management guidance: how to confirm the pest, cultural and
biological measures first, chemical control only past thresholds, and what to
do this week. Management priority is {priority}."#
        );
        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(prose) => prose.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "pest analysis fell back to record prose");
                let mut prose = format!(
                    "Likely pests: {}. Management priority is {priority}.",
                    records
                        .iter()
                        .map(|r| r.common_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                if let Some(first) = records.first() {
                    if !first.cultural_methods.is_empty() {
                        prose.push_str(&format!(
                            " Start with: {}.",
                            first.cultural_methods.join("; ")
                        ));
                    }
                }
                prose
            }
        }
    }
}

// A model reply should be a JSON list of names, but is parsed tolerantly.
fn parse_name_list(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
        return items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
    }
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Ok(serde_json::Value::Array(items)) =
                serde_json::from_str(&trimmed[start..=end])
            {
                return items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect();
            }
        }
    }
    Vec::new()
}

#[async_trait::async_trait]
impl Specialist for PestSpecialist {
    fn tag(&self) -> AgentTag {
        AgentTag::Pest
    }

    async fn process(&self, query: &str, profile: &FarmerProfile, mode: AgentMode) -> AgentFinding {
        let limit = match mode {
            AgentMode::Specific => SPECIFIC_PEST_LIMIT,
            AgentMode::Generic => GENERIC_PEST_LIMIT,
        };

        let mut names = match mode {
            AgentMode::Specific => self.identify_with_llm(query, profile).await,
            // Generic mode surveys the farmer's crops rather than symptoms.
            AgentMode::Generic => pests_from_crops(&profile.crop_names(), profile.soil_type.as_deref()),
        };
        if names.is_empty() {
            names = self.identify_fallback(query, profile);
        }
        tracing::info!(candidates = names.len(), mode = ?mode, "pest identification complete");

        let records = self.fetch_records(&names, limit);
        if records.is_empty() {
            return AgentFinding::empty(
                AgentTag::Pest,
                "No pest data matched the described symptoms. Please describe the damage more specifically.",
            );
        }

        let priority = management_priority(&records);
        let cost = estimate_treatment_cost(&records);
        let prose = self.management_prose(query, &records, priority).await;
        let pest_names: Vec<String> = records.iter().map(|r| r.common_name.clone()).collect();

        let structured = serde_json::json!({
            "identified_pests": &pest_names,
            "records": records,
            "management_priority": priority,
            "treatment_cost": &cost,
            "seasonal_calendar": seasonal_calendar(),
        });

        AgentFinding::ok(AgentTag::Pest, structured, prose)
            .with_insight("priority", serde_json::json!(priority))
            .with_insight(
                "treatment_cost_inr",
                serde_json::json!({"min": cost.min_inr, "max": cost.max_inr}),
            )
            .with_insight("pests", serde_json::json!(pest_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FindingStatus;
    use kisanvani_llm::testing::ScriptedModel;
    use kisanvani_stores::{MemoryStores, PesticideListing};

    fn seed(stores: &MemoryStores) {
        stores.seed_pest(PestRecord {
            common_name: "Cotton Whitefly".to_string(),
            max_crop_loss_percent: Some(45.0),
            cultural_methods: vec!["Remove infested leaves".to_string()],
            pesticides_market: vec![
                PesticideListing {
                    brand_name: "NeemX".to_string(),
                    cost_inr: 400.0,
                    unit: "litre".to_string(),
                },
                PesticideListing {
                    brand_name: "FlyGone".to_string(),
                    cost_inr: 600.0,
                    unit: "litre".to_string(),
                },
            ],
            ..Default::default()
        });
        stores.seed_pest(PestRecord {
            common_name: "Cotton Aphid".to_string(),
            max_crop_loss_percent: Some(15.0),
            ..Default::default()
        });
    }

    #[test]
    fn test_keyword_table() {
        let pests = pests_from_keywords("My cotton has whitefly and aphid problems");
        assert!(pests.contains(&"Cotton Whitefly".to_string()));
        assert!(pests.contains(&"Cotton Aphid".to_string()));
        assert!(pests_from_keywords("how is the weather").is_empty());
    }

    #[test]
    fn test_crop_soil_table_prefers_soil_specific() {
        let pests = pests_from_crops(&["cotton".to_string()], Some("black"));
        assert_eq!(pests[0], "Pink Bollworm");
        assert_eq!(pests[1], "Cotton Aphid");
        // Common pests follow, without duplicates.
        assert!(pests.contains(&"Cotton Whitefly".to_string()));
        assert_eq!(
            pests.iter().filter(|p| *p == "Cotton Aphid").count(),
            1
        );
    }

    #[test]
    fn test_priority_from_crop_loss() {
        let critical = vec![PestRecord {
            max_crop_loss_percent: Some(50.0),
            ..Default::default()
        }];
        assert_eq!(management_priority(&critical), "critical");

        let low = vec![PestRecord {
            max_crop_loss_percent: Some(5.0),
            ..Default::default()
        }];
        assert_eq!(management_priority(&low), "low");
    }

    #[test]
    fn test_treatment_cost_arithmetic() {
        let stores = MemoryStores::new();
        seed(&stores);
        let record = stores.get_by_common_name("Cotton Whitefly").unwrap().unwrap();
        let cost = estimate_treatment_cost(&[record]);
        assert_eq!(cost.max_inr, 1000.0);
        assert_eq!(cost.min_inr, 600.0);
        assert_eq!(cost.per_hectare_inr, 500.0);
        assert_eq!(cost.options.len(), 2);
    }

    #[test]
    fn test_parse_name_list_tolerates_prose() {
        assert_eq!(
            parse_name_list(r#"Here you go: ["Cotton Whitefly", "Cotton Aphid"] hope that helps"#),
            vec!["Cotton Whitefly", "Cotton Aphid"]
        );
        assert!(parse_name_list("no list at all").is_empty());
    }

    #[tokio::test]
    async fn test_llm_identification_validates_against_store() {
        let stores = Arc::new(MemoryStores::new());
        seed(&stores);
        let llm = Arc::new(ScriptedModel::new(vec![
            r#"["Cotton Whitefly", "Imaginary Bug"]"#,
        ]));
        let specialist = PestSpecialist::new(llm, stores);

        let profile = FarmerProfile {
            crops: vec![kisanvani_stores::CropEntry {
                crop: "cotton".to_string(),
                area_ha: None,
                season: None,
            }],
            ..Default::default()
        };
        let finding = specialist
            .process("white insects on my cotton", &profile, AgentMode::Specific)
            .await;
        assert_eq!(finding.status, FindingStatus::Ok);
        let identified = finding.structured["identified_pests"].as_array().unwrap();
        // The hallucinated name was dropped.
        assert_eq!(identified.len(), 1);
        assert_eq!(identified[0], "Cotton Whitefly");
        assert_eq!(finding.insights["priority"], "critical");
    }

    #[tokio::test]
    async fn test_fallback_path_without_llm() {
        let stores = Arc::new(MemoryStores::new());
        seed(&stores);
        let specialist = PestSpecialist::new(Arc::new(ScriptedModel::failing()), stores);
        let finding = specialist
            .process(
                "whitefly everywhere",
                &FarmerProfile::default(),
                AgentMode::Specific,
            )
            .await;
        assert_eq!(finding.status, FindingStatus::Ok);
        assert!(finding.prose.contains("Cotton Whitefly"));
    }

    #[tokio::test]
    async fn test_no_matching_data_is_empty() {
        let stores = Arc::new(MemoryStores::new());
        let specialist = PestSpecialist::new(Arc::new(ScriptedModel::failing()), stores);
        let finding = specialist
            .process("strange spots", &FarmerProfile::default(), AgentMode::Specific)
            .await;
        assert_eq!(finding.status, FindingStatus::Empty);
    }
}
