//! Drives a fingerprint enrollment session against the platform sensor.
//!
//! The state machine itself lives in clockface-core; this loop feeds it
//! sensor outcomes and persists the template only when the session
//! completes. Cancellation or failure persists nothing.

use crate::session::{ScanOutcome, SensorPrompt};
use clockface_core::{EnrollmentError, EnrollmentSession, EnrollmentStep, FingerprintTemplate, ScanEvent};
use clockface_store::{StoreError, TemplateStore};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Hardware absence is fatal and surfaced immediately, never retried.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
}

/// Terminal result of one enrollment run.
#[derive(Debug)]
pub enum EnrollmentRun {
    Enrolled(FingerprintTemplate),
    Cancelled,
    Failed(EnrollmentError),
}

/// Prompt for scans until the session reaches a terminal state.
pub async fn run_enrollment(
    sensor: &mut dyn SensorPrompt,
    session: EnrollmentSession,
    templates: &dyn TemplateStore,
) -> Result<EnrollmentRun, EnrollError> {
    let mut step = EnrollmentStep::InProgress(session);

    loop {
        match step {
            EnrollmentStep::InProgress(session) => {
                if let Some(index) = session.pending_scan() {
                    tracing::debug!(scan = index, "prompting for scan");
                }
                let event = match sensor.authenticate().await {
                    ScanOutcome::Success(scan) => ScanEvent::Captured { timestamp: scan.timestamp },
                    ScanOutcome::Failed => ScanEvent::Misread,
                    ScanOutcome::UserCancelled => ScanEvent::Cancelled,
                    ScanOutcome::Timeout => ScanEvent::Timeout,
                    ScanOutcome::Lockout => ScanEvent::Lockout,
                    ScanOutcome::Error { message } => {
                        tracing::warn!(message, "sensor error during enrollment, retrying scan");
                        ScanEvent::Misread
                    }
                    ScanOutcome::Unavailable { message } => {
                        tracing::error!(message, "sensor unavailable, enrollment aborted");
                        return Err(EnrollError::SensorUnavailable(message));
                    }
                };
                step = session.advance(event);
            }
            EnrollmentStep::Complete(template) => {
                templates.put(&template)?;
                tracing::info!(employee_id = %template.employee_id, "fingerprint enrolled");
                return Ok(EnrollmentRun::Enrolled(template));
            }
            EnrollmentStep::Cancelled => return Ok(EnrollmentRun::Cancelled),
            EnrollmentStep::Failed(err) => return Ok(EnrollmentRun::Failed(err)),
        }
    }
}
