//! Continuous unattended identification session.
//!
//! Drives the kiosk loop: wait for a capture, route it through the matcher,
//! emit one lifecycle event, pause, repeat. Exactly one capture request is
//! outstanding at any time, cooldowns are session-owned timers, and a
//! shutdown signal cancels the outstanding capture without emitting any
//! further events.

use crate::engine::{EngineError, EngineHandle};
use crate::registration::EmployeeDirectory;
use clockface_core::{
    CaptureError, ConfidenceTier, DetectionMode, ExtractError, FingerprintMatcher, SensorScan,
};
use clockface_store::{StoreError, TemplateStore};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Outcome of one platform sensor prompt.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// The sensor authenticated a press.
    Success(SensorScan),
    /// Misread (smudge, partial contact). Safe to re-prompt.
    Failed,
    /// The user dismissed the prompt.
    UserCancelled,
    /// The platform prompt timed out.
    Timeout,
    /// The platform locked the sensor after repeated failures.
    Lockout,
    /// Transient platform error.
    Error { message: String },
    /// Sensor hardware is absent. Fatal, never retried.
    Unavailable { message: String },
}

/// Cancellable async wrapper over the platform biometric prompt.
///
/// Callback-style sensor APIs are adapted to a future so the session's
/// suspension points and cancellation are explicit: dropping the returned
/// future must release the underlying sensor request.
pub trait SensorPrompt: Send {
    fn authenticate(&mut self) -> Pin<Box<dyn Future<Output = ScanOutcome> + Send + '_>>;
}

/// Lifecycle events surfaced to the kiosk UI.
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    Identified {
        employee_id: String,
        employee_name: String,
        /// Present for the face flow; the fingerprint flow has no score.
        score: Option<f32>,
        tier: Option<ConfidenceTier>,
    },
    NotRecognized,
    Error { reason: String },
    Cancelled,
}

/// Event consumer owned by the caller (UI layer).
pub trait EventSink: Send {
    fn emit(&self, event: SessionEvent);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Waiting,
    Processing,
    Success,
    Retry,
    Error,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub retry_cooldown: Duration,
    pub success_hold: Duration,
    pub cancel_restart_delay: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_cooldown: Duration::from_secs(2),
            success_hold: Duration::from_secs(3),
            cancel_restart_delay: Duration::from_millis(500),
            max_consecutive_errors: 5,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("{0} consecutive sensor errors, giving up")]
    TooManyErrors(u32),
}

/// Which biometric drives the session.
enum Flow {
    Fingerprint {
        sensor: Box<dyn SensorPrompt>,
        matcher: Box<dyn FingerprintMatcher + Send>,
        templates: Arc<dyn TemplateStore>,
    },
    Face {
        engine: EngineHandle,
        mode: DetectionMode,
    },
}

/// Result of one capture+process iteration, before event emission.
enum Attempt {
    Matched {
        employee_id: String,
        score: Option<f32>,
        tier: Option<ConfidenceTier>,
    },
    NoMatch,
    Misread,
    UserCancelled,
    Transient { reason: String },
}

pub struct ContinuousSession {
    flow: Flow,
    directory: Arc<dyn EmployeeDirectory>,
    events: Box<dyn EventSink>,
    config: SessionConfig,
    shutdown: watch::Receiver<bool>,
    /// Published lifecycle state; the UI subscribes via [`Self::state_watch`].
    state: watch::Sender<SessionState>,
}

impl ContinuousSession {
    pub fn fingerprint(
        sensor: Box<dyn SensorPrompt>,
        matcher: Box<dyn FingerprintMatcher + Send>,
        templates: Arc<dyn TemplateStore>,
        directory: Arc<dyn EmployeeDirectory>,
        events: Box<dyn EventSink>,
        config: SessionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            flow: Flow::Fingerprint { sensor, matcher, templates },
            directory,
            events,
            config,
            shutdown,
            state: watch::channel(SessionState::Idle).0,
        }
    }

    pub fn face(
        engine: EngineHandle,
        mode: DetectionMode,
        directory: Arc<dyn EmployeeDirectory>,
        events: Box<dyn EventSink>,
        config: SessionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            flow: Flow::Face { engine, mode },
            directory,
            events,
            config,
            shutdown,
            state: watch::channel(SessionState::Idle).0,
        }
    }

    /// Subscribe to lifecycle state changes. Take the receiver before
    /// calling [`Self::run`], which consumes the session.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run until shutdown or a fatal error.
    ///
    /// Shutdown is silent: the outstanding capture is dropped and no
    /// further events are emitted. Fatal errors emit one final
    /// `Error` event before returning.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let mut consecutive_errors = 0u32;

        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            self.state.send_replace(SessionState::Waiting);
            // Exactly one capture request in flight; select! drops it on
            // shutdown, which cancels the underlying sensor request.
            let attempt = tokio::select! {
                _ = self.shutdown.changed() => return Ok(()),
                attempt = Self::attempt(&mut self.flow) => attempt,
            };

            self.state.send_replace(SessionState::Processing);
            let attempt = match attempt {
                Ok(a) => a,
                Err(err) => {
                    self.state.send_replace(SessionState::Error);
                    self.events.emit(SessionEvent::Error { reason: err.to_string() });
                    return Err(err);
                }
            };

            match attempt {
                Attempt::Matched { employee_id, score, tier } => {
                    consecutive_errors = 0;
                    let employee_name = self.lookup_name(&employee_id);
                    tracing::info!(employee_id = %employee_id, name = %employee_name, "identified");
                    self.events.emit(SessionEvent::Identified {
                        employee_id,
                        employee_name,
                        score,
                        tier,
                    });
                    self.state.send_replace(SessionState::Success);
                    if !self.pause(self.config.success_hold).await {
                        return Ok(());
                    }
                    self.state.send_replace(SessionState::Idle);
                }
                Attempt::NoMatch | Attempt::Misread => {
                    consecutive_errors = 0;
                    self.events.emit(SessionEvent::NotRecognized);
                    self.state.send_replace(SessionState::Retry);
                    if !self.pause(self.config.retry_cooldown).await {
                        return Ok(());
                    }
                }
                Attempt::UserCancelled => {
                    consecutive_errors = 0;
                    self.events.emit(SessionEvent::Cancelled);
                    self.state.send_replace(SessionState::Cancelled);
                    if !self.pause(self.config.cancel_restart_delay).await {
                        return Ok(());
                    }
                }
                Attempt::Transient { reason } => {
                    consecutive_errors += 1;
                    tracing::warn!(reason = %reason, consecutive = consecutive_errors, "sensor error");
                    self.events.emit(SessionEvent::Error { reason });
                    if consecutive_errors >= self.config.max_consecutive_errors {
                        self.state.send_replace(SessionState::Error);
                        return Err(SessionError::TooManyErrors(consecutive_errors));
                    }
                    self.state.send_replace(SessionState::Retry);
                    if !self.pause(self.config.retry_cooldown).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One capture + processing step. Fatal conditions come back as `Err`.
    async fn attempt(flow: &mut Flow) -> Result<Attempt, SessionError> {
        match flow {
            Flow::Fingerprint { sensor, matcher, templates } => {
                match sensor.authenticate().await {
                    ScanOutcome::Success(scan) => {
                        let enrolled = templates.list_all()?;
                        match matcher.match_scan(&scan, &enrolled) {
                            Some(employee_id) => Ok(Attempt::Matched {
                                employee_id,
                                score: None,
                                tier: None,
                            }),
                            None => Ok(Attempt::NoMatch),
                        }
                    }
                    ScanOutcome::Failed => Ok(Attempt::Misread),
                    ScanOutcome::UserCancelled => Ok(Attempt::UserCancelled),
                    ScanOutcome::Timeout => Ok(Attempt::Transient { reason: "sensor timeout".into() }),
                    ScanOutcome::Lockout => Ok(Attempt::Transient { reason: "sensor lockout".into() }),
                    ScanOutcome::Error { message } => Ok(Attempt::Transient { reason: message }),
                    ScanOutcome::Unavailable { message } => {
                        Err(SessionError::SensorUnavailable(message))
                    }
                }
            }
            Flow::Face { engine, mode } => match engine.identify(*mode).await {
                Ok(Some(found)) => Ok(Attempt::Matched {
                    employee_id: found.employee_id,
                    score: Some(found.score),
                    tier: Some(found.tier),
                }),
                Ok(None) => Ok(Attempt::NoMatch),
                // Nobody in frame, or too far away: a transient misread.
                Err(EngineError::Extract(ExtractError::NoFaceDetected))
                | Err(EngineError::Extract(ExtractError::FaceTooSmall { .. })) => {
                    Ok(Attempt::Misread)
                }
                Err(EngineError::Capture(CaptureError::Failed(reason))) => {
                    Ok(Attempt::Transient { reason })
                }
                Err(EngineError::Capture(CaptureError::SensorUnavailable(reason))) => {
                    Err(SessionError::SensorUnavailable(reason))
                }
                // Model, store, and empty-gallery errors are not retried
                // locally; the caller gets a typed failure.
                Err(err) => Err(SessionError::Engine(err)),
            },
        }
    }

    fn lookup_name(&self, employee_id: &str) -> String {
        match self.directory.get(employee_id) {
            Ok(Some(employee)) => employee.display_name,
            Ok(None) => employee_id.to_string(),
            Err(err) => {
                tracing::warn!(employee_id, error = %err, "directory lookup failed");
                employee_id.to_string()
            }
        }
    }

    /// Sleep, unless shutdown arrives first. Returns false on shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.changed() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
