//! Multi-scan fingerprint enrollment state machine and the placeholder
//! fingerprint matcher.
//!
//! Enrollment combines a fixed number of successful sensor scans into one
//! opaque template. Session state is an explicit value threaded through each
//! transition (no global counters), so concurrent sessions and deterministic
//! tests are possible. No partial template ever leaves the session: only a
//! fully completed run yields a [`FingerprintTemplate`].

use crate::types::FingerprintTemplate;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEFAULT_REQUIRED_SCANS: u32 = 3;
const DEFAULT_MAX_RETRIES_PER_SCAN: u32 = 5;

// Field separator inside hashed tuples, so adjacent fields cannot collide.
const TOKEN_SEPARATOR: char = '\u{1f}';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("user cancelled enrollment")]
    UserCancelled,
    #[error("sensor timed out")]
    SensorTimeout,
    #[error("sensor locked out after too many attempts")]
    SensorLockout,
    #[error("scan {index} failed {attempts} times, giving up")]
    RetriesExhausted { index: u32, attempts: u32 },
}

/// Sensor outcome fed into the state machine for the current scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// The sensor authenticated a finger press.
    Captured { timestamp: DateTime<Utc> },
    /// The sensor failed to read (smudge, partial press). Retry same index.
    Misread,
    /// The platform sensor reported a timeout.
    Timeout,
    /// The platform sensor locked out further attempts.
    Lockout,
    /// The user dismissed the prompt.
    Cancelled,
}

/// Where a live session currently is. Cancellation and failure are not
/// states: they consume the session and surface as terminal
/// [`EnrollmentStep`] variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentState {
    Scanning { index: u32, retries: u32 },
    ScanSucceeded { index: u32 },
    AllScansComplete,
    TemplateCombined,
    Done,
}

/// Result of one transition. Terminal variants consume the session, which
/// drops all partial scan tokens.
pub enum EnrollmentStep {
    InProgress(EnrollmentSession),
    Complete(FingerprintTemplate),
    Cancelled,
    Failed(EnrollmentError),
}

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    /// Successful scans required to produce a template (N).
    pub required_scans: u32,
    /// Misreads tolerated per scan index before the session fails.
    pub max_retries_per_scan: u32,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            required_scans: DEFAULT_REQUIRED_SCANS,
            max_retries_per_scan: DEFAULT_MAX_RETRIES_PER_SCAN,
        }
    }
}

/// One enrollment session for one employee on one device.
#[derive(Debug)]
pub struct EnrollmentSession {
    employee_id: String,
    employee_name: String,
    device_id: String,
    config: EnrollmentConfig,
    state: EnrollmentState,
    tokens: Vec<String>,
}

impl EnrollmentSession {
    /// Start a session; the first scan is immediately pending.
    pub fn begin(
        employee_id: impl Into<String>,
        employee_name: impl Into<String>,
        device_id: impl Into<String>,
        config: EnrollmentConfig,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_name: employee_name.into(),
            device_id: device_id.into(),
            config,
            state: EnrollmentState::Scanning { index: 1, retries: 0 },
            tokens: Vec::new(),
        }
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    /// Successful scans captured so far.
    pub fn scans_captured(&self) -> usize {
        self.tokens.len()
    }

    /// 1-based index of the scan currently pending, if the session is live.
    pub fn pending_scan(&self) -> Option<u32> {
        match self.state {
            EnrollmentState::Scanning { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Feed one sensor outcome into the machine.
    pub fn advance(mut self, event: ScanEvent) -> EnrollmentStep {
        let EnrollmentState::Scanning { index, retries } = self.state else {
            // Terminal states never re-enter advance; treat as cancelled
            // rather than panic so a misbehaving driver cannot crash us.
            tracing::warn!(state = ?self.state, "advance called on non-scanning session");
            return EnrollmentStep::Cancelled;
        };

        match event {
            ScanEvent::Captured { timestamp } => {
                let token = scan_token(&self.employee_name, index, timestamp, &self.device_id);
                self.tokens.push(token);
                self.state = EnrollmentState::ScanSucceeded { index };
                tracing::debug!(
                    employee_id = %self.employee_id,
                    scan = index,
                    of = self.config.required_scans,
                    "scan captured"
                );

                if index < self.config.required_scans {
                    self.state = EnrollmentState::Scanning { index: index + 1, retries: 0 };
                    EnrollmentStep::InProgress(self)
                } else {
                    self.state = EnrollmentState::AllScansComplete;
                    let template = combine_template(
                        &self.employee_name,
                        &self.tokens,
                        timestamp,
                    );
                    self.state = EnrollmentState::TemplateCombined;
                    tracing::info!(
                        employee_id = %self.employee_id,
                        scans = self.tokens.len(),
                        "fingerprint template combined"
                    );
                    self.state = EnrollmentState::Done;
                    EnrollmentStep::Complete(FingerprintTemplate {
                        employee_id: self.employee_id,
                        template,
                        created_at: timestamp,
                    })
                }
            }
            ScanEvent::Misread => {
                let attempts = retries + 1;
                if attempts >= self.config.max_retries_per_scan {
                    tracing::warn!(
                        employee_id = %self.employee_id,
                        scan = index,
                        attempts,
                        "scan retries exhausted"
                    );
                    EnrollmentStep::Failed(EnrollmentError::RetriesExhausted { index, attempts })
                } else {
                    // Same index, one more retry burned.
                    self.state = EnrollmentState::Scanning { index, retries: attempts };
                    EnrollmentStep::InProgress(self)
                }
            }
            ScanEvent::Timeout => EnrollmentStep::Failed(EnrollmentError::SensorTimeout),
            ScanEvent::Lockout => EnrollmentStep::Failed(EnrollmentError::SensorLockout),
            ScanEvent::Cancelled => {
                tracing::info!(
                    employee_id = %self.employee_id,
                    discarded_scans = self.tokens.len(),
                    "enrollment cancelled"
                );
                EnrollmentStep::Cancelled
            }
        }
    }
}

/// One-way token for a single successful scan.
fn scan_token(
    employee_name: &str,
    index: u32,
    timestamp: DateTime<Utc>,
    device_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(employee_name.as_bytes());
    hasher.update([TOKEN_SEPARATOR as u8]);
    hasher.update(index.to_le_bytes());
    hasher.update([TOKEN_SEPARATOR as u8]);
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update([TOKEN_SEPARATOR as u8]);
    hasher.update(device_id.as_bytes());
    hex(&hasher.finalize())
}

/// Final template: hash of all scan tokens plus name and completion time.
fn combine_template(employee_name: &str, tokens: &[String], completed_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    for token in tokens {
        hasher.update(token.as_bytes());
    }
    hasher.update(employee_name.as_bytes());
    hasher.update(completed_at.to_rfc3339().as_bytes());
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A single authenticated sensor scan at identification time.
#[derive(Debug, Clone)]
pub struct SensorScan {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
}

/// Scan × enrolled templates → candidate employee.
pub trait FingerprintMatcher {
    fn match_scan(
        &self,
        scan: &SensorScan,
        templates: &[FingerprintTemplate],
    ) -> Option<String>;
}

/// PLACEHOLDER matcher, preserved from the reference system: any
/// successfully authenticated sensor scan matches the FIRST employee with a
/// non-empty stored template. It performs no biometric comparison at all.
///
/// This is a known security gap carried over deliberately; do not deploy a
/// multi-user kiosk on it. A real vendor comparator must be substituted
/// behind [`FingerprintMatcher`] with explicit sign-off.
pub struct AnyEnrolledMatcher;

impl FingerprintMatcher for AnyEnrolledMatcher {
    fn match_scan(
        &self,
        _scan: &SensorScan,
        templates: &[FingerprintTemplate],
    ) -> Option<String> {
        templates
            .iter()
            .find(|t| !t.template.is_empty())
            .map(|t| t.employee_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session() -> EnrollmentSession {
        EnrollmentSession::begin("e1", "Ada Lovelace", "sensor-0", EnrollmentConfig::default())
    }

    fn capture(step: EnrollmentStep, secs: i64) -> EnrollmentStep {
        match step {
            EnrollmentStep::InProgress(s) => s.advance(ScanEvent::Captured { timestamp: ts(secs) }),
            _ => panic!("expected in-progress session"),
        }
    }

    #[test]
    fn test_three_scans_complete() {
        let s = session();
        assert_eq!(s.pending_scan(), Some(1));

        let step = s.advance(ScanEvent::Captured { timestamp: ts(0) });
        let step = capture(step, 1);
        match step {
            EnrollmentStep::InProgress(ref s) => {
                assert_eq!(s.pending_scan(), Some(3));
                assert_eq!(s.scans_captured(), 2);
            }
            _ => panic!("expected third scan pending"),
        }

        match capture(step, 2) {
            EnrollmentStep::Complete(template) => {
                assert_eq!(template.employee_id, "e1");
                assert_eq!(template.template.len(), 64); // sha256 hex
                assert_eq!(template.created_at, ts(2));
            }
            _ => panic!("expected completed template"),
        }
    }

    #[test]
    fn test_done_only_after_exactly_n_scans() {
        let step = session().advance(ScanEvent::Captured { timestamp: ts(0) });
        // Two scans in: still in progress, never Done early.
        match capture(step, 1) {
            EnrollmentStep::InProgress(s) => assert_eq!(s.scans_captured(), 2),
            _ => panic!("must not complete before N scans"),
        }
    }

    #[test]
    fn test_misread_retries_same_index() {
        let step = session().advance(ScanEvent::Misread);
        match step {
            EnrollmentStep::InProgress(s) => {
                assert_eq!(s.pending_scan(), Some(1));
                assert_eq!(s.scans_captured(), 0);
                assert_eq!(*s.state(), EnrollmentState::Scanning { index: 1, retries: 1 });
            }
            _ => panic!("misread should retry"),
        }
    }

    #[test]
    fn test_retries_exhausted_fails() {
        let mut step = EnrollmentStep::InProgress(session());
        for _ in 0..4 {
            step = match step {
                EnrollmentStep::InProgress(s) => s.advance(ScanEvent::Misread),
                _ => panic!("should still be retrying"),
            };
        }
        match step {
            EnrollmentStep::InProgress(s) => match s.advance(ScanEvent::Misread) {
                EnrollmentStep::Failed(EnrollmentError::RetriesExhausted { index: 1, attempts: 5 }) => {}
                _ => panic!("expected retries exhausted"),
            },
            EnrollmentStep::Failed(EnrollmentError::RetriesExhausted { .. }) => {}
            _ => panic!("expected retries exhausted"),
        }
    }

    #[test]
    fn test_live_session_state_is_always_scanning() {
        // The only state observable between transitions is Scanning;
        // terminal outcomes come back as steps, never as states.
        let mut step = EnrollmentStep::InProgress(session());
        for i in 1..=2u32 {
            step = match step {
                EnrollmentStep::InProgress(s) => {
                    assert_eq!(*s.state(), EnrollmentState::Scanning { index: i, retries: 0 });
                    s.advance(ScanEvent::Captured { timestamp: ts(i as i64) })
                }
                _ => panic!("expected live session"),
            };
        }
        match step {
            EnrollmentStep::InProgress(s) => {
                assert_eq!(*s.state(), EnrollmentState::Scanning { index: 3, retries: 0 });
            }
            _ => panic!("expected third scan pending"),
        }
    }

    #[test]
    fn test_cancel_on_second_scan_discards_tokens() {
        let step = session().advance(ScanEvent::Captured { timestamp: ts(0) });
        match step {
            EnrollmentStep::InProgress(s) => {
                assert_eq!(s.scans_captured(), 1);
                match s.advance(ScanEvent::Cancelled) {
                    EnrollmentStep::Cancelled => {} // session consumed, tokens dropped
                    _ => panic!("expected cancelled"),
                }
            }
            _ => panic!("expected in-progress"),
        }
    }

    #[test]
    fn test_timeout_and_lockout_are_terminal() {
        match session().advance(ScanEvent::Timeout) {
            EnrollmentStep::Failed(EnrollmentError::SensorTimeout) => {}
            _ => panic!("expected timeout failure"),
        }
        match session().advance(ScanEvent::Lockout) {
            EnrollmentStep::Failed(EnrollmentError::SensorLockout) => {}
            _ => panic!("expected lockout failure"),
        }
    }

    #[test]
    fn test_tokens_differ_per_scan_index() {
        let t1 = scan_token("Ada", 1, ts(0), "dev");
        let t2 = scan_token("Ada", 2, ts(0), "dev");
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_template_deterministic_for_same_events() {
        let run = || {
            let step = session().advance(ScanEvent::Captured { timestamp: ts(0) });
            let step = capture(step, 1);
            match capture(step, 2) {
                EnrollmentStep::Complete(t) => t.template,
                _ => panic!("expected completion"),
            }
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_template_differs_across_sessions_with_different_times() {
        let run = |offset: i64| {
            let step = session().advance(ScanEvent::Captured { timestamp: ts(offset) });
            let step = capture(step, offset + 1);
            match capture(step, offset + 2) {
                EnrollmentStep::Complete(t) => t.template,
                _ => panic!("expected completion"),
            }
        };
        assert_ne!(run(0), run(100));
    }

    #[test]
    fn test_any_enrolled_matcher_returns_first_non_empty() {
        let scan = SensorScan { timestamp: ts(0), device_id: "dev".into() };
        let templates = vec![
            FingerprintTemplate { employee_id: "empty".into(), template: String::new(), created_at: ts(0) },
            FingerprintTemplate { employee_id: "a".into(), template: "t".into(), created_at: ts(0) },
            FingerprintTemplate { employee_id: "b".into(), template: "u".into(), created_at: ts(0) },
        ];
        assert_eq!(AnyEnrolledMatcher.match_scan(&scan, &templates).as_deref(), Some("a"));
    }

    #[test]
    fn test_any_enrolled_matcher_empty_store() {
        let scan = SensorScan { timestamp: ts(0), device_id: "dev".into() };
        assert!(AnyEnrolledMatcher.match_scan(&scan, &[]).is_none());
    }
}
