use clockface_core::{DetectionMode, EnrollmentConfig, ExtractorConfig, MatcherConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from `CLOCKFACE_*` environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the employee directory export (JSON).
    pub directory_path: PathBuf,
    /// Identifier of this kiosk's biometric sensor, hashed into scan tokens.
    pub device_id: String,
    /// Detection quality mode for extraction.
    pub detection_mode: DetectionMode,
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
    pub enrollment: EnrollmentConfig,
    /// Cooldown after a failed identification attempt.
    pub retry_cooldown: Duration,
    /// How long the success screen is held before the next person.
    pub success_hold: Duration,
    /// Delay before restarting capture after a user-cancelled prompt.
    pub cancel_restart_delay: Duration,
    /// Consecutive transient sensor errors tolerated before giving up.
    pub max_consecutive_errors: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("clockface");

        let db_path = std::env::var("CLOCKFACE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("kiosk.db"));

        let directory_path = std::env::var("CLOCKFACE_DIRECTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("employees.json"));

        let detection_mode = match std::env::var("CLOCKFACE_DETECTION_MODE").as_deref() {
            Ok("fast") => DetectionMode::Fast,
            _ => DetectionMode::Accurate,
        };

        Self {
            db_path,
            directory_path,
            device_id: std::env::var("CLOCKFACE_DEVICE_ID")
                .unwrap_or_else(|_| "kiosk-0".to_string()),
            detection_mode,
            extractor: ExtractorConfig {
                min_face_pixels: env_u32("CLOCKFACE_MIN_FACE_PIXELS", 64),
                padding_ratio: env_f32("CLOCKFACE_PADDING_RATIO", 0.30),
                embedding_dim: env_usize("CLOCKFACE_EMBEDDING_DIM", 512),
            },
            matcher: MatcherConfig {
                similarity_threshold: env_f32("CLOCKFACE_SIMILARITY_THRESHOLD", 0.55),
                high_confidence_threshold: env_f32("CLOCKFACE_HIGH_CONFIDENCE_THRESHOLD", 0.80),
            },
            enrollment: EnrollmentConfig {
                required_scans: env_u32("CLOCKFACE_REQUIRED_SCANS", 3),
                max_retries_per_scan: env_u32("CLOCKFACE_MAX_SCAN_RETRIES", 5),
            },
            retry_cooldown: Duration::from_millis(env_u64("CLOCKFACE_RETRY_COOLDOWN_MS", 2000)),
            success_hold: Duration::from_millis(env_u64("CLOCKFACE_SUCCESS_HOLD_MS", 3000)),
            cancel_restart_delay: Duration::from_millis(env_u64(
                "CLOCKFACE_CANCEL_RESTART_DELAY_MS",
                500,
            )),
            max_consecutive_errors: env_u32("CLOCKFACE_MAX_CONSECUTIVE_ERRORS", 5),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
