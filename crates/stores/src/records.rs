//! Record types held by the stores.
//!
//! Every profile attribute is optional: IVR callers rarely state more than a
//! fragment of this, and nothing downstream may assume a field is present.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CropEntry {
    pub crop: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_ha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_on_hand_inr: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_loan_inr: Option<i64>,
}

/// A farmer as known to the system. `phone` is the canonical key (digits
/// only); profiles without one are ephemeral and keyed synthetically per
/// task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmerProfile {
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_total_ha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_cultivated_ha: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crops: Vec<CropEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irrigation_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_spoken: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FarmerProfile {
    pub fn ephemeral(key: impl Into<String>) -> Self {
        Self {
            phone: key.into(),
            ..Default::default()
        }
    }

    pub fn crop_names(&self) -> Vec<String> {
        self.crops.iter().map(|c| c.crop.clone()).collect()
    }
}

/// One soil class from the knowledge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoilRecord {
    pub soil_key: String,
    pub soil_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ph_max: Option<f64>,
    /// Water-holding capacity class: "low", "moderate" or "high".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_holding: Option<String>,
    #[serde(default)]
    pub nutrients_deficient: Vec<String>,
    #[serde(default)]
    pub nutrients_adequate: Vec<String>,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub suitable_crops: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PesticideListing {
    pub brand_name: String,
    pub cost_inr: f64,
    pub unit: String,
}

/// One pest from the knowledge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PestRecord {
    pub common_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub crops_affected: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_crop_loss_percent: Option<f64>,
    #[serde(default)]
    pub cultural_methods: Vec<String>,
    #[serde(default)]
    pub biological_control: Vec<String>,
    #[serde(default)]
    pub chemical_control: Vec<String>,
    #[serde(default)]
    pub pesticides_market: Vec<PesticideListing>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// One government scheme from the catalogue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemeRecord {
    pub scheme_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub farmer_segments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_holding_max_ha: Option<f64>,
    #[serde(default)]
    pub covered_crops: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline_benefit: Option<String>,
    #[serde(default)]
    pub application_modes: Vec<String>,
    #[serde(default)]
    pub documents_required: Vec<String>,
    #[serde(default)]
    pub application_windows: Vec<ApplicationWindow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_serde_omits_absent_fields() {
        let profile = FarmerProfile {
            phone: "9876001234".to_string(),
            name: Some("Ramesh".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["phone"], "9876001234");
        assert_eq!(json["name"], "Ramesh");
        assert!(json.get("pincode").is_none());
        assert!(json.get("crops").is_none());
    }

    #[test]
    fn test_profile_round_trip_with_crops() {
        let profile = FarmerProfile {
            phone: "9876001234".to_string(),
            crops: vec![CropEntry {
                crop: "cotton".to_string(),
                area_ha: Some(1.5),
                season: Some("kharif".to_string()),
            }],
            budget: Some(Budget {
                cash_on_hand_inr: Some(40_000),
                planned_loan_inr: None,
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&profile).unwrap();
        let back: FarmerProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.crop_names(), vec!["cotton"]);
        assert_eq!(back.budget.unwrap().cash_on_hand_inr, Some(40_000));
    }
}
