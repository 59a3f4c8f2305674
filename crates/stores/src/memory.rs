//! In-memory store implementation for tests and ephemeral runs.

use crate::records::{FarmerProfile, PestRecord, SchemeRecord, SoilRecord};
use crate::{FarmerProfileStore, PestStore, Result, SchemeStore, SoilStore};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStores {
    farmers: Mutex<BTreeMap<String, FarmerProfile>>,
    soils: Mutex<BTreeMap<String, SoilRecord>>,
    pests: Mutex<BTreeMap<String, PestRecord>>,
    schemes: Mutex<BTreeMap<String, SchemeRecord>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_soil(&self, record: SoilRecord) {
        self.soils.lock().unwrap().insert(record.soil_key.clone(), record);
    }

    pub fn seed_pest(&self, record: PestRecord) {
        self.pests
            .lock()
            .unwrap()
            .insert(record.common_name.to_lowercase(), record);
    }

    pub fn seed_scheme(&self, record: SchemeRecord) {
        self.schemes
            .lock()
            .unwrap()
            .insert(record.name.to_lowercase(), record);
    }
}

impl FarmerProfileStore for MemoryStores {
    fn get(&self, phone: &str) -> Result<Option<FarmerProfile>> {
        Ok(self.farmers.lock().unwrap().get(phone).cloned())
    }

    fn upsert(&self, profile: &FarmerProfile) -> Result<()> {
        self.farmers
            .lock()
            .unwrap()
            .insert(profile.phone.clone(), profile.clone());
        Ok(())
    }
}

impl SoilStore for MemoryStores {
    fn get(&self, soil_key: &str) -> Result<Option<SoilRecord>> {
        Ok(self.soils.lock().unwrap().get(soil_key).cloned())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.soils.lock().unwrap().keys().cloned().collect())
    }
}

impl PestStore for MemoryStores {
    fn get_by_common_name(&self, name: &str) -> Result<Option<PestRecord>> {
        Ok(self.pests.lock().unwrap().get(&name.to_lowercase()).cloned())
    }

    fn list_names(&self) -> Result<Vec<String>> {
        Ok(self
            .pests
            .lock()
            .unwrap()
            .values()
            .map(|p| p.common_name.clone())
            .collect())
    }
}

impl SchemeStore for MemoryStores {
    fn get_by_name(&self, name: &str) -> Result<Option<SchemeRecord>> {
        Ok(self.schemes.lock().unwrap().get(&name.to_lowercase()).cloned())
    }

    fn list(&self) -> Result<Vec<SchemeRecord>> {
        Ok(self.schemes.lock().unwrap().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let stores = MemoryStores::new();
        stores.seed_pest(PestRecord {
            common_name: "Cotton Whitefly".to_string(),
            ..Default::default()
        });
        assert!(stores.get_by_common_name("cotton whitefly").unwrap().is_some());
        assert!(stores.get_by_common_name("unknown pest").unwrap().is_none());

        stores
            .upsert(&FarmerProfile {
                phone: "9876001234".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(FarmerProfileStore::get(&stores, "9876001234").unwrap().is_some());
    }
}
