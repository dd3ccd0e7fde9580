//! In-memory store for tests and dry runs. Same contract as the SQLite
//! store, including overwrite-on-put.

use crate::{EmbeddingStore, StoreError, TemplateStore};
use clockface_core::{FaceEmbeddingRecord, FingerprintTemplate};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    faces: Mutex<BTreeMap<String, FaceEmbeddingRecord>>,
    templates: Mutex<BTreeMap<String, FingerprintTemplate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for MemoryStore {
    fn get(&self, employee_id: &str) -> Result<FaceEmbeddingRecord, StoreError> {
        self.faces
            .lock()
            .expect("store mutex poisoned")
            .get(employee_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(employee_id.to_string()))
    }

    fn put(&self, record: &FaceEmbeddingRecord) -> Result<(), StoreError> {
        self.faces
            .lock()
            .expect("store mutex poisoned")
            .insert(record.employee_id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, employee_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .faces
            .lock()
            .expect("store mutex poisoned")
            .remove(employee_id)
            .is_some())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.faces.lock().expect("store mutex poisoned").len() as u64)
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .faces
            .lock()
            .expect("store mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<FaceEmbeddingRecord>, StoreError> {
        Ok(self
            .faces
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect())
    }
}

impl TemplateStore for MemoryStore {
    fn get(&self, employee_id: &str) -> Result<FingerprintTemplate, StoreError> {
        self.templates
            .lock()
            .expect("store mutex poisoned")
            .get(employee_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(employee_id.to_string()))
    }

    fn put(&self, template: &FingerprintTemplate) -> Result<(), StoreError> {
        self.templates
            .lock()
            .expect("store mutex poisoned")
            .insert(template.employee_id.clone(), template.clone());
        Ok(())
    }

    fn delete(&self, employee_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .templates
            .lock()
            .expect("store mutex poisoned")
            .remove(employee_id)
            .is_some())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.templates.lock().expect("store mutex poisoned").len() as u64)
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .templates
            .lock()
            .expect("store mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<FingerprintTemplate>, StoreError> {
        Ok(self
            .templates
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect())
    }
}
