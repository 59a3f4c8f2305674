//! Farmer profile resolution.
//!
//! A phone number in the transcript keys a store lookup; otherwise the model
//! extracts whatever profile fragments the utterance carries. Extraction
//! degrades gracefully: an unparsable field is omitted, never fabricated.

use kisanvani_llm::{extract_json, ChatModel, CompletionOptions};
use kisanvani_stores::{Budget, CropEntry, FarmerProfile, FarmerProfileStore};
use std::sync::Arc;

/// Find the first 10-digit run in the text (Indian mobile number), tolerating
/// a 91 country prefix on a 12-digit run.
pub fn extract_phone(text: &str) -> Option<String> {
    let mut digits = String::new();
    let mut runs: Vec<String> = Vec::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            runs.push(std::mem::take(&mut digits));
        }
    }
    if !digits.is_empty() {
        runs.push(digits);
    }

    for run in runs {
        if run.len() == 10 {
            return Some(run);
        }
        if run.len() == 12 && run.starts_with("91") {
            return Some(run[2..].to_string());
        }
    }
    None
}

pub struct ProfileResolver {
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn FarmerProfileStore>,
}

impl ProfileResolver {
    pub fn new(llm: Arc<dyn ChatModel>, store: Arc<dyn FarmerProfileStore>) -> Self {
        Self { llm, store }
    }

    /// Resolve the caller to a profile: stored profile by phone, else an
    /// extracted one (persisted only when a phone was found), else an
    /// ephemeral profile keyed to the task.
    pub async fn resolve(&self, text: &str, task_id: &str) -> FarmerProfile {
        let phone = extract_phone(text);

        if let Some(phone) = &phone {
            match self.store.get(phone) {
                Ok(Some(existing)) => {
                    tracing::info!(phone = %phone, "existing farmer profile found");
                    return existing;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(phone = %phone, error = %e, "profile lookup failed"),
            }
        }

        let mut profile = self
            .extract_profile(text)
            .await
            .unwrap_or_default();

        match phone {
            Some(phone) => {
                profile.phone = phone;
                profile.updated_at = Some(chrono::Utc::now());
                if let Err(e) = self.store.upsert(&profile) {
                    tracing::warn!(error = %e, "could not persist extracted profile");
                }
            }
            None => {
                profile.phone = format!("anon-{task_id}");
                tracing::debug!(task_id, "no phone in utterance, profile is ephemeral");
            }
        }
        profile
    }

    async fn extract_profile(&self, text: &str) -> Option<FarmerProfile> {
        let prompt = format!(
            r#"Extract structured farmer details from this phone-call text. Convert
area figures to hectares (1 acre = 0.4047 hectares). Include ONLY fields the
text actually states; omit everything else.

TEXT:
{text}

Return ONLY JSON with any of these fields:
{{
    "name": "...", "phone": "digits only", "pincode": "...",
    "village": "...", "district": "...", "state": "...",
    "land_total_ha": 0.0, "land_cultivated_ha": 0.0,
    "soil_type": "...", "irrigation_method": "...",
    "crops": [{{"crop": "...", "area_ha": 0.0, "season": "..."}}],
    "budget": {{"cash_on_hand_inr": 0, "planned_loan_inr": 0}},
    "language_spoken": "..."
}}"#,
        );

        let reply = match self.llm.complete(&prompt, CompletionOptions::with_temperature(0.3)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "profile extraction call failed");
                return None;
            }
        };
        let value = extract_json(&reply)?;

        let mut profile = FarmerProfile {
            name: value["name"].as_str().map(|s| s.to_string()),
            pincode: value["pincode"].as_str().map(|s| s.to_string()),
            village: value["village"].as_str().map(|s| s.to_string()),
            district: value["district"].as_str().map(|s| s.to_string()),
            state: value["state"].as_str().map(|s| s.to_string()),
            land_total_ha: value["land_total_ha"].as_f64(),
            land_cultivated_ha: value["land_cultivated_ha"].as_f64(),
            soil_type: value["soil_type"].as_str().map(|s| s.to_string()),
            irrigation_method: value["irrigation_method"].as_str().map(|s| s.to_string()),
            language_spoken: value["language_spoken"].as_str().map(|s| s.to_string()),
            ..Default::default()
        };

        if let Some(crops) = value["crops"].as_array() {
            for crop in crops {
                if let Some(name) = crop["crop"].as_str() {
                    profile.crops.push(CropEntry {
                        crop: name.to_string(),
                        area_ha: crop["area_ha"].as_f64(),
                        season: crop["season"].as_str().map(|s| s.to_string()),
                    });
                }
            }
        }
        if value["budget"].is_object() {
            profile.budget = Some(Budget {
                cash_on_hand_inr: value["budget"]["cash_on_hand_inr"].as_i64(),
                planned_loan_inr: value["budget"]["planned_loan_inr"].as_i64(),
            });
        }
        Some(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kisanvani_llm::testing::ScriptedModel;
    use kisanvani_stores::MemoryStores;

    #[test]
    fn test_phone_extraction() {
        assert_eq!(
            extract_phone("my number is 9876001234, please call"),
            Some("9876001234".to_string())
        );
        assert_eq!(
            extract_phone("call 919876001234 anytime"),
            Some("9876001234".to_string())
        );
        // A pincode is not a phone number.
        assert_eq!(extract_phone("I live at PIN 452001"), None);
        assert_eq!(extract_phone("no numbers here"), None);
    }

    #[tokio::test]
    async fn test_existing_profile_short_circuits_extraction() {
        let store = Arc::new(MemoryStores::new());
        store
            .upsert(&FarmerProfile {
                phone: "9876001234".to_string(),
                name: Some("Ramesh".to_string()),
                ..Default::default()
            })
            .unwrap();
        // The model would fail if called; it must not be.
        let resolver = ProfileResolver::new(Arc::new(ScriptedModel::failing()), store);
        let profile = resolver
            .resolve("this is 9876001234 calling about wheat", "t1")
            .await;
        assert_eq!(profile.name.as_deref(), Some("Ramesh"));
    }

    #[tokio::test]
    async fn test_new_caller_is_extracted_and_persisted() {
        let store = Arc::new(MemoryStores::new());
        let llm = Arc::new(ScriptedModel::new(vec![
            r#"{"name": "Sita", "pincode": "452001", "crops": [{"crop": "cotton", "area_ha": 1.2}]}"#,
        ]));
        let resolver = ProfileResolver::new(llm, Arc::clone(&store) as Arc<dyn FarmerProfileStore>);

        let profile = resolver
            .resolve("I am Sita from 452001, number 9876009999, growing cotton", "t2")
            .await;
        assert_eq!(profile.phone, "9876009999");
        assert_eq!(profile.name.as_deref(), Some("Sita"));
        assert_eq!(profile.crops.len(), 1);

        let stored = store.get("9876009999").unwrap().unwrap();
        assert_eq!(stored.pincode.as_deref(), Some("452001"));
    }

    #[tokio::test]
    async fn test_no_phone_gives_ephemeral_profile() {
        let store = Arc::new(MemoryStores::new());
        let resolver = ProfileResolver::new(
            Arc::new(ScriptedModel::failing()),
            Arc::clone(&store) as Arc<dyn FarmerProfileStore>,
        );
        let profile = resolver.resolve("my crop is failing", "a003").await;
        assert_eq!(profile.phone, "anon-a003");
        // Nothing was persisted for the synthetic key.
        assert!(store.get("anon-a003").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extraction_omits_unstated_fields() {
        let store = Arc::new(MemoryStores::new());
        let llm = Arc::new(ScriptedModel::new(vec![r#"{"name": "Mohan"}"#]));
        let resolver = ProfileResolver::new(llm, store);
        let profile = resolver.resolve("I am Mohan, 9876005555", "t4").await;
        assert_eq!(profile.name.as_deref(), Some("Mohan"));
        assert!(profile.pincode.is_none());
        assert!(profile.crops.is_empty());
        assert!(profile.budget.is_none());
    }
}
