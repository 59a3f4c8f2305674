//! Government-scheme specialist.
//!
//! Candidate schemes come from the model against the catalogue, with a
//! keyword fallback; each candidate is then scored against the farmer's
//! profile criterion by criterion. A candidate is eligible when at least 60%
//! of its applicable criteria match.

use crate::{profile_context, AgentFinding, AgentMode, AgentTag, Specialist};
use chrono::{Duration, NaiveDate, Utc};
use kisanvani_llm::{ChatModel, CompletionOptions};
use kisanvani_stores::{FarmerProfile, SchemeRecord, SchemeStore};
use serde::Serialize;
use std::sync::Arc;

/// Eligibility threshold: matched criteria / applicable criteria.
pub const ELIGIBILITY_RATIO: f64 = 0.6;

/// Land ceiling for the small-and-marginal farmer segment.
pub const SMALL_FARMER_LAND_HA: f64 = 2.0;

/// Application windows closing inside this horizon raise urgency to high.
pub const URGENCY_HORIZON_DAYS: i64 = 30;

const SCHEME_KEYWORDS: &[(&str, &[&str])] = &[
    ("insurance", &["Pradhan Mantri Fasal Bima Yojana"]),
    ("bima", &["Pradhan Mantri Fasal Bima Yojana"]),
    ("credit", &["Kisan Credit Card"]),
    ("loan", &["Kisan Credit Card"]),
    ("irrigation", &["Pradhan Mantri Krishi Sinchayee Yojana - Per Drop More Crop"]),
    ("organic", &["Paramparagat Krishi Vikas Yojana"]),
    ("market", &["National Agriculture Market (e-NAM)"]),
    ("pension", &["Pradhan Mantri Kisan Maandhan Yojana"]),
    ("soil", &["Soil Health Card Scheme"]),
];

/// Keyword fallback when the model cannot identify candidates.
pub fn schemes_from_keywords(query: &str) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut matched = Vec::new();
    for (keyword, schemes) in SCHEME_KEYWORDS {
        if query_lower.contains(keyword) {
            for scheme in *schemes {
                if !matched.iter().any(|m| m == scheme) {
                    matched.push(scheme.to_string());
                }
            }
        }
    }
    matched
}

/// Segment-based defaults when even keywords find nothing.
pub fn schemes_from_situation(profile: &FarmerProfile) -> Vec<String> {
    let mut schemes = Vec::new();
    if profile.land_total_ha.map(|ha| ha <= SMALL_FARMER_LAND_HA).unwrap_or(false) {
        schemes.push("Pradhan Mantri Fasal Bima Yojana".to_string());
        schemes.push("Kisan Credit Card".to_string());
        schemes.push("Pradhan Mantri Kisan Maandhan Yojana".to_string());
    }
    if !profile.crops.is_empty() {
        schemes.push("National Agriculture Market (e-NAM)".to_string());
        schemes.push("Soil Health Card Scheme".to_string());
    }
    if profile
        .irrigation_method
        .as_deref()
        .map(|m| {
            let m = m.to_lowercase();
            m.contains("drip") || m.contains("sprinkler")
        })
        .unwrap_or(false)
    {
        schemes.push("Pradhan Mantri Krishi Sinchayee Yojana - Per Drop More Crop".to_string());
    }
    if schemes.is_empty() {
        schemes.push("Pradhan Mantri Fasal Bima Yojana".to_string());
        schemes.push("Kisan Credit Card".to_string());
    }
    schemes.dedup();
    schemes
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityAssessment {
    pub scheme_name: String,
    pub scheme_id: String,
    pub eligible: bool,
    pub score: f64,
    pub matching_criteria: Vec<String>,
    pub missing_criteria: Vec<String>,
}

/// Score one scheme against the profile. Only criteria the scheme actually
/// declares count toward the ratio.
pub fn assess_eligibility(scheme: &SchemeRecord, profile: &FarmerProfile) -> EligibilityAssessment {
    let mut matched = 0usize;
    let mut total = 0usize;
    let mut matching = Vec::new();
    let mut missing = Vec::new();

    if !scheme.farmer_segments.is_empty() {
        total += 1;
        let is_small = profile
            .land_total_ha
            .map(|ha| ha <= SMALL_FARMER_LAND_HA)
            .unwrap_or(false);
        if is_small && scheme.farmer_segments.iter().any(|s| s == "small_and_marginal") {
            matched += 1;
            matching.push("Small and marginal farmer".to_string());
        } else {
            missing.push("May not qualify for the targeted farmer segment".to_string());
        }
    }

    if scheme.age_min.is_some() || scheme.age_max.is_some() {
        // Profiles carry no date of birth; the age bracket is assumed
        // satisfiable and surfaced in the document checklist instead.
        total += 1;
        matched += 1;
        matching.push("Age requirements".to_string());
    }

    if let Some(ceiling) = scheme.land_holding_max_ha {
        total += 1;
        match profile.land_total_ha {
            Some(ha) if ha <= ceiling => {
                matched += 1;
                matching.push(format!("Land holding within {ceiling} hectares"));
            }
            Some(_) => missing.push(format!("Land exceeds the {ceiling} hectare ceiling")),
            None => missing.push("Land holding unknown".to_string()),
        }
    }

    if !scheme.covered_crops.is_empty() && !profile.crops.is_empty() {
        total += 1;
        let crop_match = profile.crops.iter().any(|farmer_crop| {
            scheme.covered_crops.iter().any(|covered| {
                let a = farmer_crop.crop.to_lowercase();
                let b = covered.to_lowercase();
                a.contains(&b) || b.contains(&a)
            })
        });
        if crop_match {
            matched += 1;
            matching.push("Crop covered by the scheme".to_string());
        } else {
            missing.push("Crop not covered by the scheme".to_string());
        }
    }

    let score = if total > 0 {
        matched as f64 / total as f64
    } else {
        0.0
    };

    EligibilityAssessment {
        scheme_name: scheme.name.clone(),
        scheme_id: scheme.scheme_id.clone(),
        eligible: total > 0 && score >= ELIGIBILITY_RATIO,
        score,
        matching_criteria: matching,
        missing_criteria: missing,
    }
}

/// High urgency when any candidate's application window closes soon.
pub fn application_urgency(schemes: &[SchemeRecord], today: NaiveDate) -> &'static str {
    let horizon = today + Duration::days(URGENCY_HORIZON_DAYS);
    for scheme in schemes {
        for window in &scheme.application_windows {
            if window.to >= today && window.to <= horizon {
                return "high";
            }
        }
    }
    "medium"
}

pub struct SchemeSpecialist {
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn SchemeStore>,
}

impl SchemeSpecialist {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<dyn SchemeStore>) -> Self {
        Self { llm, store }
    }

    async fn identify_with_llm(&self, query: &str, profile: &FarmerProfile) -> Vec<String> {
        let catalogue = match self.store.list() {
            Ok(schemes) if !schemes.is_empty() => schemes,
            _ => return Vec::new(),
        };
        let names: Vec<String> = catalogue.iter().map(|s| s.name.clone()).collect();
        let prompt = format!(
            r#"You are a government-scheme advisor for Indian farmers.

FARMER QUERY: "{query}"

{context}

AVAILABLE SCHEMES:
{names}

Pick the schemes most relevant to the query and profile. Reply with the exact
scheme names from the list, one per line, at most five lines, nothing else."#,
            context = profile_context(profile),
            names = names.join("\n"),
        );

        let reply = match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "scheme identification call failed");
                return Vec::new();
            }
        };

        reply
            .lines()
            .map(|line| line.trim().trim_start_matches('-').trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_string())
            .take(5)
            .collect()
    }

    fn fetch(&self, names: &[String]) -> Vec<SchemeRecord> {
        let mut records = Vec::new();
        for name in names {
            match self.store.get_by_name(name) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => tracing::debug!(scheme = %name, "scheme not in catalogue"),
                Err(e) => tracing::warn!(scheme = %name, error = %e, "scheme lookup failed"),
            }
        }
        records
    }

    fn summaries(
        schemes: &[SchemeRecord],
        assessments: &[EligibilityAssessment],
    ) -> Vec<serde_json::Value> {
        schemes
            .iter()
            .zip(assessments)
            .map(|(scheme, assessment)| {
                serde_json::json!({
                    "name": &scheme.name,
                    "scheme_id": &scheme.scheme_id,
                    "status": if assessment.eligible { "eligible" } else { "check_eligibility" },
                    "headline_benefit": &scheme.headline_benefit,
                    "application_modes": &scheme.application_modes,
                    "documents_required": &scheme.documents_required,
                    "contact": {"helpline": &scheme.helpline, "website": &scheme.website},
                })
            })
            .collect()
    }

    async fn guidance_prose(
        &self,
        query: &str,
        schemes: &[SchemeRecord],
        assessments: &[EligibilityAssessment],
        profile: &FarmerProfile,
    ) -> String {
        let mut scheme_context = String::new();
        for (scheme, assessment) in schemes.iter().zip(assessments) {
            scheme_context.push_str(&format!(
                "\n{} [{}]: benefit {}; apply via {}; documents {}",
                scheme.name,
                if assessment.eligible { "eligible" } else { "check eligibility" },
                scheme.headline_benefit.as_deref().unwrap_or("see scheme details"),
                scheme.application_modes.join("/"),
                scheme.documents_required.join(", "),
            ));
        }
        let prompt = format!(
            r#"You are an agricultural extension officer advising an Indian farmer on
government schemes, in clear simple English.

FARMER QUERY: "{query}"

{context}

RELEVANT SCHEMES:{scheme_context}

Answer the query, list the schemes worth applying to with their headline
benefit, the application steps, documents needed and contacts. Bullet points,
no jargon."#,
            context = profile_context(profile),
        );
        match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.4)).await {
            Ok(prose) => prose.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "scheme guidance fell back to catalogue prose");
                let mut prose = String::from("Relevant government schemes:");
                for (scheme, assessment) in schemes.iter().zip(assessments) {
                    prose.push_str(&format!(
                        " {} ({}).",
                        scheme.name,
                        if assessment.eligible {
                            "you appear eligible, gather the documents and apply"
                        } else {
                            "check the eligibility criteria carefully"
                        }
                    ));
                }
                prose
            }
        }
    }
}

#[async_trait::async_trait]
impl Specialist for SchemeSpecialist {
    fn tag(&self) -> AgentTag {
        AgentTag::Scheme
    }

    async fn process(&self, query: &str, profile: &FarmerProfile, mode: AgentMode) -> AgentFinding {
        let mut names = self.identify_with_llm(query, profile).await;
        if names.is_empty() {
            names = schemes_from_keywords(query);
        }
        if names.is_empty() {
            names = schemes_from_situation(profile);
        }

        let schemes = self.fetch(&names);
        if schemes.is_empty() {
            return AgentFinding::empty(
                AgentTag::Scheme,
                "No matching government schemes found for this request.",
            );
        }
        tracing::info!(candidates = schemes.len(), "scheme candidates retrieved");

        let assessments: Vec<EligibilityAssessment> = schemes
            .iter()
            .map(|scheme| assess_eligibility(scheme, profile))
            .collect();
        let eligible_names: Vec<String> = assessments
            .iter()
            .filter(|a| a.eligible)
            .map(|a| a.scheme_name.clone())
            .collect();
        let eligible_count = eligible_names.len();
        let urgency = application_urgency(&schemes, Utc::now().date_naive());
        let prose = self.guidance_prose(query, &schemes, &assessments, profile).await;

        let structured = serde_json::json!({
            "schemes": Self::summaries(&schemes, &assessments),
            "eligibility": assessments,
            "eligible_count": eligible_count,
        });

        let mut finding = AgentFinding::ok(AgentTag::Scheme, structured, prose)
            .with_insight("scheme_opportunities", serde_json::json!(eligible_count))
            .with_insight(
                "priority_schemes",
                serde_json::json!(eligible_names.iter().take(3).collect::<Vec<_>>()),
            )
            .with_insight("application_urgency", serde_json::json!(urgency));

        if mode == AgentMode::Generic && eligible_count > 0 {
            finding = finding.with_insight(
                "required_actions",
                serde_json::json!([
                    "Prepare documents for scheme applications",
                    "Visit the nearest agriculture office or bank",
                ]),
            );
        }
        finding
    }
}
