//! [`AuthenticationGate`] – one-shot startup check against an external
//! recognizer.
//!
//! The gate calls [`Recognizer::recognize`] up to `auth.max_attempts` times.
//! Each failed attempt (no match, recognizer error, or attempt timeout)
//! publishes an `auth.failure` event; the first match publishes
//! `auth.success` and ends the sequence.  When authentication is disabled
//! the gate succeeds immediately with zero attempts and publishes nothing.
//!
//! Deciding what an exhausted budget means is left to the caller: the
//! orchestrator treats it as a fatal startup condition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gestura_middleware::EventBus;
use gestura_types::config::AuthConfig;
use gestura_types::{AuthSession, Event, EventKind, GesturaError};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

const EVENT_SOURCE: &str = "gestura-kernel::auth";

// ────────────────────────────────────────────────────────────────────────────
// Recognizer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("recognition failed: {0}")]
    Failed(String),
}

/// External identity check (face match, token, ...).
///
/// `Ok(true)` is a match, `Ok(false)` a clean rejection.
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self) -> Result<bool, RecognizerError>;
}

/// Runs a configured program per attempt; exit status 0 is a match.
pub struct ProgramRecognizer {
    program: String,
    args: Vec<String>,
}

impl ProgramRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `None` when no recognizer program is configured.
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        config
            .recognizer_program
            .as_ref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| Self::new(p.clone(), config.recognizer_args.clone()))
    }
}

#[async_trait]
impl Recognizer for ProgramRecognizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn recognize(&self) -> Result<bool, RecognizerError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| RecognizerError::Unavailable(format!("{}: {e}", self.program)))?;
        Ok(status.success())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AuthenticationGate
// ────────────────────────────────────────────────────────────────────────────

/// Result of one authentication phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub attempts_used: u32,
}

pub struct AuthenticationGate {
    enabled: bool,
    max_attempts: u32,
    attempt_timeout: Duration,
    recognizer: Option<Arc<dyn Recognizer>>,
    bus: EventBus,
}

impl AuthenticationGate {
    pub fn new(config: &AuthConfig, recognizer: Option<Arc<dyn Recognizer>>, bus: EventBus) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            attempt_timeout: config.attempt_timeout(),
            recognizer,
            bus,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run the authentication phase.
    ///
    /// # Errors
    ///
    /// [`GesturaError::Config`] when enabled with a zero attempt budget or
    /// without a recognizer.  A failed authentication is **not** an error
    /// here; inspect [`AuthOutcome::success`].
    pub async fn authenticate(&self) -> Result<AuthOutcome, GesturaError> {
        if !self.enabled {
            return Ok(AuthOutcome {
                success: true,
                attempts_used: 0,
            });
        }

        let mut session = AuthSession::new(self.max_attempts)?;
        let recognizer = self.recognizer.as_ref().ok_or_else(|| {
            GesturaError::Config("auth is enabled but no recognizer is configured".to_string())
        })?;

        while !session.exhausted() {
            let attempt = session.begin_attempt();
            let result = tokio::time::timeout(self.attempt_timeout, recognizer.recognize()).await;

            let failure = match result {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("no match".to_string()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {:?}", self.attempt_timeout)),
            };

            match failure {
                None => {
                    session.mark_succeeded();
                    info!(attempt, recognizer = recognizer.name(), "authentication succeeded");
                    self.bus.publish(
                        Event::new(EventKind::AuthSuccess, EVENT_SOURCE).with("attempts", attempt),
                    );
                    break;
                }
                Some(reason) => {
                    warn!(attempt, max = self.max_attempts, %reason, "authentication attempt failed");
                    self.bus.publish(
                        Event::new(EventKind::AuthFailure, EVENT_SOURCE)
                            .with("attempt", attempt)
                            .with("max_attempts", self.max_attempts)
                            .with("reason", reason),
                    );
                }
            }
        }

        Ok(AuthOutcome {
            success: session.succeeded(),
            attempts_used: session.attempts_used(),
        })
    }
}
