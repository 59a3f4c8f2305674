//! Synthesis: merging specialist findings into one answer.
//!
//! The specific pipeline produces a sectioned reply to the farmer's question.
//! The generic pipeline produces three artifacts built from the union of the
//! specialists' insights and prose: a comprehensive strategy, a twelve-month
//! actionable roadmap, and hyperlocal guidance.

use chrono::{Datelike, Months, Utc};
use kisanvani_agents::{AgentFinding, AgentTag, FindingStatus};
use kisanvani_llm::{ChatModel, CompletionOptions};
use kisanvani_stores::FarmerProfile;
use serde::Serialize;

/// Comprehensive artifacts of the generic pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct GenericArtifacts {
    pub comprehensive_strategy: String,
    pub actionable_roadmap: serde_json::Value,
    pub hyperlocal_guidance: serde_json::Value,
}

fn findings_digest(findings: &[AgentFinding]) -> String {
    let mut digest = String::new();
    for finding in findings {
        if finding.status != FindingStatus::Ok {
            continue;
        }
        digest.push_str(&format!("\n{} SPECIALIST:\n{}\n", finding.agent.to_string().to_uppercase(), finding.prose));
        if !finding.insights.is_empty() {
            for (key, value) in &finding.insights {
                digest.push_str(&format!("- {key}: {value}\n"));
            }
        }
    }
    digest
}

/// Merge specific-pipeline findings into a sectioned answer. The model does
/// the merging; on failure the findings' prose is concatenated.
pub async fn synthesize_specific(
    llm: &dyn ChatModel,
    query: &str,
    farmer: &FarmerProfile,
    findings: &[AgentFinding],
) -> String {
    let digest = findings_digest(findings);
    let prompt = format!(
        r#"You are coordinating specialist advice for a farmer.

FARMER: {name}
ORIGINAL QUERY: "{query}"

SPECIALIST FINDINGS:
{digest}

Merge these into one practical response, structured as:
1. Direct Answer
2. Key Recommendations
3. Timing
4. Additional Notes

Simple language, concrete doses and dates where the findings give them."#,
        name = farmer.name.as_deref().unwrap_or("unknown"),
    );

    match llm
        .complete(
            &prompt,
            CompletionOptions {
                temperature: 0.4,
                max_tokens: None,
            },
        )
        .await
    {
        Ok(synthesis) if !synthesis.trim().is_empty() => synthesis.trim().to_string(),
        _ => {
            tracing::warn!("synthesis fell back to concatenated findings");
            let mut merged = String::from("Based on the analysis:\n");
            for finding in findings {
                if finding.status == FindingStatus::Ok {
                    merged.push_str(&format!("\n{}: {}\n", finding.agent, finding.prose));
                }
            }
            merged
        }
    }
}

/// Build the three generic-pipeline artifacts.
pub async fn synthesize_generic(
    llm: &dyn ChatModel,
    query: &str,
    farmer: &FarmerProfile,
    findings: &[AgentFinding],
) -> GenericArtifacts {
    let digest = findings_digest(findings);

    let strategy_prompt = format!(
        r#"You are creating a comprehensive farming strategy.

FARMER: {name}, PIN {pin}
REQUEST: "{query}"

SPECIALIST INTELLIGENCE:
{digest}

Write an integrated strategy covering: situation assessment, objectives for
this cycle, a crop/soil/weather/pest/finance action plan, and success
measures. Practical and specific."#,
        name = farmer.name.as_deref().unwrap_or("unknown"),
        pin = farmer.pincode.as_deref().unwrap_or("unknown"),
    );
    let comprehensive_strategy = match llm
        .complete(
            &strategy_prompt,
            CompletionOptions {
                temperature: 0.3,
                max_tokens: Some(4000),
            },
        )
        .await
    {
        Ok(strategy) if !strategy.trim().is_empty() => strategy.trim().to_string(),
        _ => {
            tracing::warn!("strategy generation fell back to digest");
            format!("Season-wide guidance based on all specialists:\n{digest}")
        }
    };

    GenericArtifacts {
        comprehensive_strategy,
        actionable_roadmap: build_roadmap(findings),
        hyperlocal_guidance: build_hyperlocal(farmer, findings),
    }
}

/// Timeline roadmap from the findings' insights: immediate actions feed from
/// the specialists, and the calendar skeleton covers the next twelve months.
pub fn build_roadmap(findings: &[AgentFinding]) -> serde_json::Value {
    let mut immediate: Vec<serde_json::Value> = Vec::new();
    let mut short_term: Vec<serde_json::Value> = Vec::new();
    let mut critical_deadlines: Vec<serde_json::Value> = Vec::new();

    for finding in findings {
        if finding.status != FindingStatus::Ok {
            continue;
        }
        if let Some(actions) = finding.insights.get("required_actions").and_then(|v| v.as_array()) {
            immediate.extend(actions.iter().cloned());
        }
        if let Some(priority_actions) = finding.insights.get("priority_actions").and_then(|v| v.as_array()) {
            short_term.extend(priority_actions.iter().cloned());
        }
        if finding.agent == AgentTag::Scheme {
            if let Some(urgency) = finding.insights.get("application_urgency").and_then(|v| v.as_str()) {
                if urgency == "high" {
                    critical_deadlines.push(serde_json::json!(
                        "A scheme application window closes within the month"
                    ));
                }
            }
        }
        if let Some(need) = finding.insights.get("irrigation_need").and_then(|v| v.as_str()) {
            if need == "high" {
                immediate.push(serde_json::json!("Arrange irrigation; little rain is expected"));
            }
        }
    }

    let today = Utc::now().date_naive();
    let mut calendar = serde_json::Map::new();
    for i in 0..12u32 {
        let month = today
            .checked_add_months(Months::new(i))
            .unwrap_or(today);
        calendar.insert(
            format!("{:04}-{:02}", month.year(), month.month()),
            serde_json::json!({
                "month": month.format("%B %Y").to_string(),
                "weather_considerations": [],
                "crop_activities": [],
                "pest_monitoring": [],
                "scheme_deadlines": [],
            }),
        );
    }

    serde_json::json!({
        "immediate_actions": immediate,
        "short_term_plan": short_term,
        "long_term_strategy": [
            "Improve soil health over successive seasons",
            "Diversify crops to spread weather and market risk",
            "Build a record of scheme benefits and yields",
        ],
        "seasonal_calendar": calendar,
        "critical_deadlines": critical_deadlines,
    })
}

/// Location-anchored guidance assembled from the profile and findings.
pub fn build_hyperlocal(farmer: &FarmerProfile, findings: &[AgentFinding]) -> serde_json::Value {
    let pincode = farmer.pincode.as_deref().unwrap_or("unknown");

    let mut variety_recommendations: Vec<serde_json::Value> = Vec::new();
    let mut weather_specific = serde_json::Value::Null;
    for finding in findings {
        if finding.status != FindingStatus::Ok {
            continue;
        }
        match finding.agent {
            AgentTag::Soil => {
                if let Some(crops) = finding.structured.get("suitable_crops").and_then(|v| v.as_array()) {
                    variety_recommendations.extend(crops.iter().cloned());
                }
            }
            AgentTag::Weather => {
                if !finding.insights.is_empty() {
                    weather_specific = serde_json::json!(&finding.insights);
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "location_specific": {
            "pincode": pincode,
            "soil_type": farmer.soil_type.clone().unwrap_or_else(|| "unknown".to_string()),
        },
        "variety_recommendations": variety_recommendations,
        "local_suppliers": {
            "seeds": "Contact the local agricultural department",
            "fertilizers": "Nearest cooperative society",
            "pesticides": "Licensed dealers in your area",
        },
        "market_linkages": {
            "nearby_markets": format!("Markets near {pincode}"),
            "price_trends": "Check local mandi rates",
        },
        "extension_services": {
            "krishi_vigyan_kendra": format!("KVK for the {pincode} area"),
            "agricultural_officer": "Contact the district agricultural officer",
        },
        "weather_specific": weather_specific,
    })
}
