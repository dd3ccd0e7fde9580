//! clockface-store — Persistence for face embeddings and fingerprint
//! templates.
//!
//! The engine talks to the abstract [`EmbeddingStore`] / [`TemplateStore`]
//! traits; this crate ships a SQLite implementation for the kiosk and an
//! in-memory one for tests. One row per employee: `put` overwrites, so the
//! store can never accumulate duplicate records for an id.

pub mod memory;
pub mod sqlite;

use clockface_core::{FaceEmbeddingRecord, FingerprintTemplate};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record for employee {0}")]
    NotFound(String),
    #[error("corrupt record for employee {employee_id}: {detail}")]
    Corrupt { employee_id: String, detail: String },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Face embedding persistence, keyed by employee id.
///
/// Implementations serialize access internally, so registration and
/// matching for the same employee never race.
pub trait EmbeddingStore: Send + Sync {
    fn get(&self, employee_id: &str) -> Result<FaceEmbeddingRecord, StoreError>;
    /// Insert or overwrite the single record for the employee.
    fn put(&self, record: &FaceEmbeddingRecord) -> Result<(), StoreError>;
    /// Remove the record if present. Returns whether a record existed.
    fn delete(&self, employee_id: &str) -> Result<bool, StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;
    /// Full gallery, for matching.
    fn list_all(&self) -> Result<Vec<FaceEmbeddingRecord>, StoreError>;
}

/// Fingerprint template persistence; same shape as [`EmbeddingStore`].
pub trait TemplateStore: Send + Sync {
    fn get(&self, employee_id: &str) -> Result<FingerprintTemplate, StoreError>;
    fn put(&self, template: &FingerprintTemplate) -> Result<(), StoreError>;
    fn delete(&self, employee_id: &str) -> Result<bool, StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;
    fn list_all(&self) -> Result<Vec<FingerprintTemplate>, StoreError>;
}
