//! SQLite-backed store implementation.
//!
//! Each record lives as a JSON document under its natural key; lookups are
//! key reads, so no cross-call locking beyond the connection mutex is needed.

use crate::records::{FarmerProfile, PestRecord, SchemeRecord, SoilRecord};
use crate::{FarmerProfileStore, PestStore, Result, SchemeStore, SoilStore, StoreError};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS farmers (
                phone TEXT PRIMARY KEY,
                profile_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS soil_profiles (
                soil_key TEXT PRIMARY KEY,
                doc_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pest_profiles (
                common_name TEXT PRIMARY KEY,
                doc_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schemes (
                scheme_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                doc_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schemes_name ON schemes(name);
            "#,
        )?;
        Ok(())
    }

    /// Seed helpers for provisioning the knowledge bases.
    pub fn upsert_soil(&self, record: &SoilRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO soil_profiles (soil_key, doc_json) VALUES (?1, ?2)",
            (&record.soil_key, json),
        )?;
        Ok(())
    }

    pub fn upsert_pest(&self, record: &PestRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO pest_profiles (common_name, doc_json) VALUES (?1, ?2)",
            (&record.common_name, json),
        )?;
        Ok(())
    }

    pub fn upsert_scheme(&self, record: &SchemeRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO schemes (scheme_id, name, doc_json) VALUES (?1, ?2, ?3)",
            (&record.scheme_id, &record.name, json),
        )?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(json: String) -> Result<T> {
    Ok(serde_json::from_str(&json)?)
}

impl FarmerProfileStore for Database {
    fn get(&self, phone: &str) -> Result<Option<FarmerProfile>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let row: Option<String> = conn
            .query_row(
                "SELECT profile_json FROM farmers WHERE phone = ?1",
                [phone],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Database(other)),
            })?;
        row.map(decode).transpose()
    }

    fn upsert(&self, profile: &FarmerProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO farmers (phone, profile_json, updated_at) VALUES (?1, ?2, ?3)",
            (
                &profile.phone,
                json,
                chrono::Utc::now().timestamp(),
            ),
        )?;
        tracing::debug!(phone = %profile.phone, "farmer profile stored");
        Ok(())
    }
}

impl SoilStore for Database {
    fn get(&self, soil_key: &str) -> Result<Option<SoilRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let row: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM soil_profiles WHERE soil_key = ?1",
                [soil_key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Database(other)),
            })?;
        row.map(decode).transpose()
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare("SELECT soil_key FROM soil_profiles ORDER BY soil_key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

impl PestStore for Database {
    fn get_by_common_name(&self, name: &str) -> Result<Option<PestRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let row: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM pest_profiles WHERE common_name = ?1 COLLATE NOCASE",
                [name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Database(other)),
            })?;
        row.map(decode).transpose()
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare("SELECT common_name FROM pest_profiles ORDER BY common_name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

impl SchemeStore for Database {
    fn get_by_name(&self, name: &str) -> Result<Option<SchemeRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let row: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM schemes WHERE name = ?1 COLLATE NOCASE",
                [name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Database(other)),
            })?;
        row.map(decode).transpose()
    }

    fn list(&self) -> Result<Vec<SchemeRecord>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare("SELECT doc_json FROM schemes ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut schemes = Vec::new();
        for row in rows {
            let json: String = row?;
            if let Ok(record) = serde_json::from_str(&json) {
                schemes.push(record);
            }
        }
        Ok(schemes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CropEntry;

    #[test]
    fn test_farmer_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let profile = FarmerProfile {
            phone: "9876001234".to_string(),
            name: Some("Sita".to_string()),
            crops: vec![CropEntry {
                crop: "rice".to_string(),
                area_ha: Some(2.0),
                season: None,
            }],
            ..Default::default()
        };
        db.upsert(&profile).unwrap();

        let loaded = FarmerProfileStore::get(&db, "9876001234").unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("Sita"));
        assert_eq!(loaded.crop_names(), vec!["rice"]);
        assert!(FarmerProfileStore::get(&db, "0000000000").unwrap().is_none());
    }

    #[test]
    fn test_soil_and_pest_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_soil(&SoilRecord {
            soil_key: "black".to_string(),
            soil_name: "Black (Regur)".to_string(),
            ph_min: Some(6.5),
            ph_max: Some(8.5),
            ..Default::default()
        })
        .unwrap();
        db.upsert_pest(&PestRecord {
            common_name: "Pink Bollworm".to_string(),
            max_crop_loss_percent: Some(50.0),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(db.list_keys().unwrap(), vec!["black"]);
        assert!(SoilStore::get(&db, "black").unwrap().is_some());
        // Case-insensitive common-name lookup.
        assert!(db.get_by_common_name("pink bollworm").unwrap().is_some());
        assert_eq!(db.list_names().unwrap(), vec!["Pink Bollworm"]);
    }

    #[test]
    fn test_scheme_catalogue() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_scheme(&SchemeRecord {
            scheme_id: "PMFBY".to_string(),
            name: "Pradhan Mantri Fasal Bima Yojana".to_string(),
            farmer_segments: vec!["small_and_marginal".to_string()],
            ..Default::default()
        })
        .unwrap();

        let all = db.list().unwrap();
        assert_eq!(all.len(), 1);
        assert!(db
            .get_by_name("pradhan mantri fasal bima yojana")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kisanvani.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_soil(&SoilRecord {
                soil_key: "alluvial".to_string(),
                soil_name: "Alluvial".to_string(),
                ..Default::default()
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(SoilStore::get(&db, "alluvial").unwrap().is_some());
    }
}
