//! SQLite-backed store. Embedding vectors are stored as little-endian f32
//! blobs; timestamps as RFC 3339 text.

use crate::{EmbeddingStore, StoreError, TemplateStore};
use chrono::{DateTime, Utc};
use clockface_core::{Embedding, FaceEmbeddingRecord, FingerprintTemplate};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS face_embeddings (
    employee_id           TEXT PRIMARY KEY,
    embedding             BLOB NOT NULL,
    crop_ref              TEXT NOT NULL,
    extraction_confidence REAL NOT NULL,
    registered_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fingerprint_templates (
    employee_id TEXT PRIMARY KEY,
    template    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

/// Store over a single SQLite connection. The connection mutex serializes
/// all reads and writes, which also gives the required per-employee
/// sequencing between registration and matching.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "opened store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-process database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for val in values {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_timestamp(employee_id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            employee_id: employee_id.to_string(),
            detail: format!("bad timestamp {raw:?}: {e}"),
        })
}

impl EmbeddingStore for SqliteStore {
    fn get(&self, employee_id: &str) -> Result<FaceEmbeddingRecord, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row = conn.query_row(
            "SELECT embedding, crop_ref, extraction_confidence, registered_at
             FROM face_embeddings WHERE employee_id = ?",
            [employee_id],
            |row| {
                let bytes: Vec<u8> = row.get(0)?;
                let crop_ref: String = row.get(1)?;
                let confidence: f32 = row.get(2)?;
                let registered_at: String = row.get(3)?;
                Ok((bytes, crop_ref, confidence, registered_at))
            },
        );

        match row {
            Ok((bytes, crop_ref, extraction_confidence, raw_ts)) => Ok(FaceEmbeddingRecord {
                employee_id: employee_id.to_string(),
                embedding: Embedding { values: bytes_to_embedding(&bytes) },
                crop_ref,
                extraction_confidence,
                registered_at: parse_timestamp(employee_id, &raw_ts)?,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(employee_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, record: &FaceEmbeddingRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO face_embeddings
             (employee_id, embedding, crop_ref, extraction_confidence, registered_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.employee_id,
                embedding_to_bytes(&record.embedding.values),
                record.crop_ref,
                record.extraction_confidence,
                record.registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, employee_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let removed = conn.execute(
            "DELETE FROM face_embeddings WHERE employee_id = ?",
            [employee_id],
        )?;
        Ok(removed > 0)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM face_embeddings", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT employee_id FROM face_embeddings ORDER BY employee_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn list_all(&self) -> Result<Vec<FaceEmbeddingRecord>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT employee_id, embedding, crop_ref, extraction_confidence, registered_at
             FROM face_embeddings ORDER BY employee_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let employee_id: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                let crop_ref: String = row.get(2)?;
                let confidence: f32 = row.get(3)?;
                let raw_ts: String = row.get(4)?;
                Ok((employee_id, bytes, crop_ref, confidence, raw_ts))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(employee_id, bytes, crop_ref, extraction_confidence, raw_ts)| {
                let registered_at = parse_timestamp(&employee_id, &raw_ts)?;
                Ok(FaceEmbeddingRecord {
                    employee_id,
                    embedding: Embedding { values: bytes_to_embedding(&bytes) },
                    crop_ref,
                    extraction_confidence,
                    registered_at,
                })
            })
            .collect()
    }
}

impl TemplateStore for SqliteStore {
    fn get(&self, employee_id: &str) -> Result<FingerprintTemplate, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row = conn.query_row(
            "SELECT template, created_at FROM fingerprint_templates WHERE employee_id = ?",
            [employee_id],
            |row| {
                let template: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                Ok((template, created_at))
            },
        );

        match row {
            Ok((template, raw_ts)) => Ok(FingerprintTemplate {
                employee_id: employee_id.to_string(),
                template,
                created_at: parse_timestamp(employee_id, &raw_ts)?,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(employee_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, template: &FingerprintTemplate) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO fingerprint_templates (employee_id, template, created_at)
             VALUES (?, ?, ?)",
            params![
                template.employee_id,
                template.template,
                template.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, employee_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let removed = conn.execute(
            "DELETE FROM fingerprint_templates WHERE employee_id = ?",
            [employee_id],
        )?;
        Ok(removed > 0)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let n: i64 =
            conn.query_row("SELECT COUNT(*) FROM fingerprint_templates", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT employee_id FROM fingerprint_templates ORDER BY employee_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn list_all(&self) -> Result<Vec<FingerprintTemplate>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT employee_id, template, created_at FROM fingerprint_templates ORDER BY employee_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let employee_id: String = row.get(0)?;
                let template: String = row.get(1)?;
                let raw_ts: String = row.get(2)?;
                Ok((employee_id, template, raw_ts))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(employee_id, template, raw_ts)| {
                let created_at = parse_timestamp(&employee_id, &raw_ts)?;
                Ok(FingerprintTemplate { employee_id, template, created_at })
            })
            .collect()
    }
}
