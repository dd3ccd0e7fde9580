//! clockface-core — Biometric identity matching for the clock-in kiosk.
//!
//! Face embeddings are extracted from camera captures, L2-normalized, and
//! compared by cosine similarity against the enrolled gallery. Fingerprint
//! enrollment combines a fixed number of sensor scans into one opaque
//! template via a state machine. All hardware and the embedding model itself
//! sit behind collaborator traits.

pub mod extractor;
pub mod fingerprint;
pub mod matcher;
pub mod model;
pub mod types;

pub use extractor::{
    CaptureError, EmbeddingModel, ExtractError, Extraction, ExtractorConfig, FaceDetector,
    FaceEmbeddingExtractor, ImageSource,
};
pub use fingerprint::{
    AnyEnrolledMatcher, EnrollmentConfig, EnrollmentError, EnrollmentSession, EnrollmentState,
    EnrollmentStep, FingerprintMatcher, ScanEvent, SensorScan,
};
pub use matcher::{ConfidenceTier, FaceMatch, FaceMatcher, MatchError, MatcherConfig};
pub use model::PixelHashModel;
pub use types::{BoundingBox, DetectionMode, Embedding, Employee, FaceEmbeddingRecord, FingerprintTemplate};
