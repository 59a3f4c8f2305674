//! Domain knowledge stores.
//!
//! The pipeline reads farmer profiles and the soil/pest/scheme knowledge
//! bases through repository traits so specialists stay decoupled from the
//! backing database. The shipped implementation keeps JSON documents in
//! SQLite under their natural keys; tests use the in-memory stores.

mod memory;
mod records;
mod sqlite;

pub use memory::MemoryStores;
pub use records::{
    ApplicationWindow, Budget, CropEntry, FarmerProfile, PesticideListing, PestRecord,
    SchemeRecord, SoilRecord,
};
pub use sqlite::Database;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Farmer profiles, keyed by digits-only phone number.
pub trait FarmerProfileStore: Send + Sync {
    fn get(&self, phone: &str) -> Result<Option<FarmerProfile>>;
    fn upsert(&self, profile: &FarmerProfile) -> Result<()>;
}

/// Soil knowledge base, keyed by soil class.
pub trait SoilStore: Send + Sync {
    fn get(&self, soil_key: &str) -> Result<Option<SoilRecord>>;
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Pest knowledge base, keyed by common name.
pub trait PestStore: Send + Sync {
    fn get_by_common_name(&self, name: &str) -> Result<Option<PestRecord>>;
    fn list_names(&self) -> Result<Vec<String>>;
}

/// Government scheme catalogue.
pub trait SchemeStore: Send + Sync {
    fn get_by_name(&self, name: &str) -> Result<Option<SchemeRecord>>;
    fn list(&self) -> Result<Vec<SchemeRecord>>;
}
