//! Clockface kiosk daemon library.
//!
//! Ties the biometric pipeline (clockface-core) and persistence
//! (clockface-store) together into the long-running services the kiosk
//! needs: the engine thread, the continuous identification session, the
//! fingerprint enrollment driver, and the registration orchestrator.

pub mod config;
pub mod directory;
pub mod engine;
pub mod enroll;
pub mod registration;
pub mod session;
pub mod stubs;

pub use config::Config;
pub use directory::JsonDirectory;
pub use engine::{EngineError, EngineHandle};
pub use enroll::{run_enrollment, EnrollError, EnrollmentRun};
pub use registration::{
    Diagnostics, DirectoryError, EmployeeDirectory, EmployeeOutcome, OrchestratorError,
    RegistrationOrchestrator, RegistrationOutcome, RegistrationReport,
};
pub use session::{
    ContinuousSession, EventSink, ScanOutcome, SensorPrompt, SessionConfig, SessionError,
    SessionEvent, SessionState,
};
