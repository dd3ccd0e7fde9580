//! Bulk face registration orchestrator.
//!
//! Walks the employee directory, runs each reference image through the
//! extraction engine, and overwrites the stored record. Re-registration is
//! idempotent: the store keys one record per employee id, and a failed
//! pipeline leaves the store untouched.

use crate::engine::{EngineError, EngineHandle};
use clockface_core::{DetectionMode, Employee, ExtractError};
use clockface_store::{EmbeddingStore, StoreError, TemplateStore};
use image::GrayImage;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory backend: {0}")]
    Backend(String),
}

/// Read-only view of the external employee directory.
pub trait EmployeeDirectory: Send + Sync {
    fn list(&self) -> Result<Vec<Employee>, DirectoryError>;
    fn get(&self, employee_id: &str) -> Result<Option<Employee>, DirectoryError>;
    /// `Ok(None)` when the employee has no usable reference image.
    fn load_reference_image(&self, employee: &Employee)
        -> Result<Option<GrayImage>, DirectoryError>;
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("directory: {0}")]
    Directory(#[from] DirectoryError),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Per-employee result of one registration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationOutcome {
    Registered,
    MissingImage,
    NoFaceDetected,
    FaceTooSmall,
    InvalidEmbedding,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeOutcome {
    pub employee_id: String,
    pub outcome: RegistrationOutcome,
}

#[derive(Debug, Serialize)]
pub struct RegistrationReport {
    pub outcomes: Vec<EmployeeOutcome>,
    /// Employees successfully (re)registered in this pass.
    pub processed: usize,
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub total_employees: u64,
    pub registered_faces: u64,
    pub pending_registrations: u64,
}

pub struct RegistrationOrchestrator {
    directory: Arc<dyn EmployeeDirectory>,
    engine: EngineHandle,
    embeddings: Arc<dyn EmbeddingStore>,
    templates: Arc<dyn TemplateStore>,
    mode: DetectionMode,
}

impl RegistrationOrchestrator {
    pub fn new(
        directory: Arc<dyn EmployeeDirectory>,
        engine: EngineHandle,
        embeddings: Arc<dyn EmbeddingStore>,
        templates: Arc<dyn TemplateStore>,
        mode: DetectionMode,
    ) -> Self {
        Self { directory, engine, embeddings, templates, mode }
    }

    /// Register (or re-register) one employee from their reference image.
    ///
    /// Extraction failures with a per-employee reason come back as an
    /// outcome; infrastructure failures (store, model misconfiguration,
    /// engine gone) propagate as errors and abort the caller's pass.
    pub async fn register_employee(
        &self,
        employee: &Employee,
    ) -> Result<RegistrationOutcome, OrchestratorError> {
        let Some(image) = self.directory.load_reference_image(employee)? else {
            tracing::warn!(employee_id = %employee.id, "no reference image");
            return Ok(RegistrationOutcome::MissingImage);
        };

        match self.engine.register(&employee.id, image, self.mode).await {
            Ok(_) => Ok(RegistrationOutcome::Registered),
            Err(EngineError::Extract(ExtractError::NoFaceDetected)) => {
                Ok(RegistrationOutcome::NoFaceDetected)
            }
            Err(EngineError::Extract(ExtractError::FaceTooSmall { .. })) => {
                Ok(RegistrationOutcome::FaceTooSmall)
            }
            Err(EngineError::Extract(ExtractError::InvalidEmbedding)) => {
                Ok(RegistrationOutcome::InvalidEmbedding)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Re-run the pipeline for every employee in the directory.
    ///
    /// Returns the full per-employee report; `processed` counts successful
    /// registrations only.
    pub async fn reprocess_all(&self) -> Result<RegistrationReport, OrchestratorError> {
        let employees = self.directory.list()?;
        tracing::info!(total = employees.len(), "bulk registration started");

        let mut outcomes = Vec::with_capacity(employees.len());
        let mut processed = 0usize;

        for employee in &employees {
            let outcome = self.register_employee(employee).await?;
            if outcome == RegistrationOutcome::Registered {
                processed += 1;
            } else {
                tracing::warn!(
                    employee_id = %employee.id,
                    ?outcome,
                    "registration skipped"
                );
            }
            outcomes.push(EmployeeOutcome { employee_id: employee.id.clone(), outcome });
        }

        tracing::info!(processed, total = employees.len(), "bulk registration finished");
        Ok(RegistrationReport { outcomes, processed })
    }

    /// Registration coverage: directory size vs. enrolled faces.
    pub fn diagnostics(&self) -> Result<Diagnostics, OrchestratorError> {
        let total_employees = self.directory.list()?.len() as u64;
        let registered_faces = self.embeddings.count()?;
        Ok(Diagnostics {
            total_employees,
            registered_faces,
            pending_registrations: total_employees.saturating_sub(registered_faces),
        })
    }

    /// Remove all biometric records for an employee. Returns whether any
    /// record existed.
    pub fn unenroll(&self, employee_id: &str) -> Result<bool, OrchestratorError> {
        let had_face = self.embeddings.delete(employee_id)?;
        let had_template = self.templates.delete(employee_id)?;
        if had_face || had_template {
            tracing::info!(employee_id, "biometric records removed");
        }
        Ok(had_face || had_template)
    }
}
