//! `gestura-types` – the shared vocabulary of the Gestura stack.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! the [`Command`] a signal is translated into, the [`SecurityDecision`] the
//! gate produces for it, the [`Event`] published for every decision and
//! lifecycle transition, and the [`GesturaError`] taxonomy.
//!
//! Configuration structures live in [`config`].

pub mod config;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::RuntimeConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Signals
// ─────────────────────────────────────────────────────────────────────────────

/// Vertical scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// A discrete gesture recognised from the hand tracker.
///
/// Pointer coordinates are normalized to the screen: `(0.0, 0.0)` is the
/// top-left corner and `(1.0, 1.0)` the bottom-right one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gesture", rename_all = "snake_case")]
pub enum Gesture {
    Point { x: f64, y: f64 },
    Click,
    DoubleClick,
    RightClick,
    Scroll { direction: ScrollDirection },
}

/// A phrase heard by the speech recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePhrase {
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl VoicePhrase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
        }
    }
}

/// A raw, unvalidated observation from a signal producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Gesture(Gesture),
    Voice(VoicePhrase),
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Which signal producer a [`Command`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    Gesture,
    Voice,
}

impl CommandSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandSource::Gesture => "gesture",
            CommandSource::Voice => "voice",
        }
    }
}

/// A single payload field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Number(f64),
    Text(String),
}

impl PayloadValue {
    /// The numeric value, or `None` for text fields.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PayloadValue::Number(n) => Some(*n),
            PayloadValue::Text(_) => None,
        }
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

impl From<&PayloadValue> for serde_json::Value {
    fn from(value: &PayloadValue) -> Self {
        match value {
            PayloadValue::Number(n) => serde_json::json!(n),
            PayloadValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Command payload: field name to value, ordered for stable logging.
pub type Payload = BTreeMap<String, PayloadValue>;

/// The closed set of commands the executor knows how to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "mouse.move")]
    MouseMove,
    #[serde(rename = "mouse.click.left")]
    ClickLeft,
    #[serde(rename = "mouse.click.right")]
    ClickRight,
    #[serde(rename = "mouse.double_click")]
    DoubleClick,
    #[serde(rename = "mouse.scroll.up")]
    ScrollUp,
    #[serde(rename = "mouse.scroll.down")]
    ScrollDown,
    #[serde(rename = "system.volume.up")]
    VolumeUp,
    #[serde(rename = "system.volume.down")]
    VolumeDown,
    #[serde(rename = "system.mute.toggle")]
    MuteToggle,
    #[serde(rename = "system.lock")]
    Lock,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::MouseMove,
        CommandKind::ClickLeft,
        CommandKind::ClickRight,
        CommandKind::DoubleClick,
        CommandKind::ScrollUp,
        CommandKind::ScrollDown,
        CommandKind::VolumeUp,
        CommandKind::VolumeDown,
        CommandKind::MuteToggle,
        CommandKind::Lock,
    ];

    /// Wire name, e.g. `"mouse.move"`.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::MouseMove => "mouse.move",
            CommandKind::ClickLeft => "mouse.click.left",
            CommandKind::ClickRight => "mouse.click.right",
            CommandKind::DoubleClick => "mouse.double_click",
            CommandKind::ScrollUp => "mouse.scroll.up",
            CommandKind::ScrollDown => "mouse.scroll.down",
            CommandKind::VolumeUp => "system.volume.up",
            CommandKind::VolumeDown => "system.volume.down",
            CommandKind::MuteToggle => "system.mute.toggle",
            CommandKind::Lock => "system.lock",
        }
    }

    /// Resolve a wire name.  Returns `None` for names outside the closed set.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A candidate OS action derived from a [`Signal`].
///
/// Immutable once built: the builder methods consume `self` and all access
/// after construction goes through shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    id: Uuid,
    name: String,
    payload: Payload,
    source: CommandSource,
    timestamp: DateTime<Utc>,
}

impl Command {
    pub fn new(name: impl Into<String>, source: CommandSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload: Payload::new(),
            source,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a command of a known [`CommandKind`].
    pub fn of(kind: CommandKind, source: CommandSource) -> Self {
        Self::new(kind.name(), source)
    }

    /// Add a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn source(&self) -> CommandSource {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Numeric payload field, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(PayloadValue::as_number)
    }

    /// The [`CommandKind`] named by this command, if it is one.
    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Security decisions
// ─────────────────────────────────────────────────────────────────────────────

/// Why the security gate refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotAllowed,
    InvalidPayload,
    UnknownCommandFailClosed,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::NotAllowed => "not_allowed",
            DenyReason::InvalidPayload => "invalid_payload",
            DenyReason::UnknownCommandFailClosed => "unknown_command_fail_closed",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one [`Command`].  Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDecision {
    pub allow: bool,
    pub reason: Option<DenyReason>,
    /// Diagnostic detail, e.g. the name of the offending payload field.
    pub detail: Option<String>,
}

impl SecurityDecision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
            detail: None,
        }
    }

    pub fn deny(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason),
            detail: Some(detail.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle and command-decision event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "startup")]
    Startup,
    #[serde(rename = "shutdown")]
    Shutdown,
    #[serde(rename = "state.changed")]
    StateChanged,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "auth.success")]
    AuthSuccess,
    #[serde(rename = "auth.failure")]
    AuthFailure,
    #[serde(rename = "gesture.frame")]
    GestureFrame,
    #[serde(rename = "voice.command")]
    VoiceCommand,
    #[serde(rename = "command.allowed")]
    CommandAllowed,
    #[serde(rename = "command.denied")]
    CommandDenied,
    #[serde(rename = "command.executed")]
    CommandExecuted,
    #[serde(rename = "command.failed")]
    CommandFailed,
    #[serde(rename = "integration.unavailable")]
    IntegrationUnavailable,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

impl EventKind {
    pub const COUNT: usize = 15;

    pub const ALL: [EventKind; EventKind::COUNT] = [
        EventKind::Startup,
        EventKind::Shutdown,
        EventKind::StateChanged,
        EventKind::Heartbeat,
        EventKind::AuthSuccess,
        EventKind::AuthFailure,
        EventKind::GestureFrame,
        EventKind::VoiceCommand,
        EventKind::CommandAllowed,
        EventKind::CommandDenied,
        EventKind::CommandExecuted,
        EventKind::CommandFailed,
        EventKind::IntegrationUnavailable,
        EventKind::Warning,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Startup => "startup",
            EventKind::Shutdown => "shutdown",
            EventKind::StateChanged => "state.changed",
            EventKind::Heartbeat => "heartbeat",
            EventKind::AuthSuccess => "auth.success",
            EventKind::AuthFailure => "auth.failure",
            EventKind::GestureFrame => "gesture.frame",
            EventKind::VoiceCommand => "voice.command",
            EventKind::CommandAllowed => "command.allowed",
            EventKind::CommandDenied => "command.denied",
            EventKind::CommandExecuted => "command.executed",
            EventKind::CommandFailed => "command.failed",
            EventKind::IntegrationUnavailable => "integration.unavailable",
            EventKind::Warning => "warning",
            EventKind::Error => "error",
        }
    }

    /// Dense index into per-kind counter arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified event wrapper for the event bus.  Append-only: delivery never
/// mutates an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    /// e.g. `"gestura-runtime::pipeline"`
    pub source: String,
    pub payload: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    /// Id of the [`Command`] this event was produced for, if any.
    pub correlation_id: Option<Uuid>,
}

impl Event {
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.into(),
            payload: BTreeMap::new(),
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn correlated(mut self, command_id: Uuid) -> Self {
        self.correlation_id = Some(command_id);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time copy of the per-kind event counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Counter for `kind`; zero when absent.
    pub fn get(&self, kind: EventKind) -> u64 {
        self.counters.get(kind.as_str()).copied().unwrap_or(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

/// Book-keeping for one authentication phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    attempts_used: u32,
    max_attempts: u32,
    succeeded: bool,
}

impl AuthSession {
    /// # Errors
    ///
    /// [`GesturaError::Config`] when `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Result<Self, GesturaError> {
        if max_attempts == 0 {
            return Err(GesturaError::Config(
                "auth.max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            attempts_used: 0,
            max_attempts,
            succeeded: false,
        })
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// `true` once the budget is spent without a success.
    pub fn exhausted(&self) -> bool {
        !self.succeeded && self.attempts_used >= self.max_attempts
    }

    /// Count one attempt.  Returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts_used += 1;
        self.attempts_used
    }

    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator state
// ─────────────────────────────────────────────────────────────────────────────

/// Process lifecycle state owned by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Init,
    Authenticating,
    Running,
    Stopping,
    Stopped,
}

impl OrchestratorState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Init => "INIT",
            OrchestratorState::Authenticating => "AUTHENTICATING",
            OrchestratorState::Running => "RUNNING",
            OrchestratorState::Stopping => "STOPPING",
            OrchestratorState::Stopped => "STOPPED",
        }
    }

    /// Whether `self → next` is a legal lifecycle edge.
    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self, next),
            (Init, Authenticating)
                | (Init, Running)
                | (Init, Stopping)
                | (Authenticating, Running)
                | (Authenticating, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Recoverable failure while carrying out an allowed command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The command passed the allow-list but no handler is wired for it.
    #[error("unmapped_command: no handler registered for '{0}'")]
    UnmappedCommand(String),

    #[error("adapter_failure: '{command}' failed: {details}")]
    AdapterFailure { command: String, details: String },
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::UnmappedCommand(_) => "unmapped_command",
            ExecutionError::AdapterFailure { .. } => "adapter_failure",
        }
    }
}

/// Top-level error taxonomy.  Only [`GesturaError::Config`] and
/// [`GesturaError::AuthenticationFailed`] may abort startup.
#[derive(Error, Debug)]
pub enum GesturaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed after {attempts} attempt(s)")]
    AuthenticationFailed { attempts: u32 },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("integration '{integration}' unavailable: {reason}")]
    IntegrationUnavailable { integration: String, reason: String },

    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GesturaError {
    fn from(e: serde_json::Error) -> Self {
        GesturaError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kind_names_roundtrip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(CommandKind::from_name("system.shutdown"), None);
    }

    #[test]
    fn command_kind_serde_uses_wire_name() {
        let json = serde_json::to_string(&CommandKind::ScrollUp).unwrap();
        assert_eq!(json, "\"mouse.scroll.up\"");
    }

    #[test]
    fn command_builder_collects_payload() {
        let cmd = Command::of(CommandKind::MouseMove, CommandSource::Gesture)
            .with_field("x", 0.25)
            .with_field("y", 0.75);
        assert_eq!(cmd.name(), "mouse.move");
        assert_eq!(cmd.kind(), Some(CommandKind::MouseMove));
        assert_eq!(cmd.number("x"), Some(0.25));
        assert_eq!(cmd.number("missing"), None);
        assert_eq!(cmd.payload().len(), 2);
    }

    #[test]
    fn text_payload_is_not_a_number() {
        let cmd = Command::new("mouse.move", CommandSource::Voice).with_field("x", "left");
        assert_eq!(cmd.number("x"), None);
    }

    #[test]
    fn payload_value_untagged_json() {
        let v: PayloadValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(v, PayloadValue::Number(0.5));
        let v: PayloadValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(v, PayloadValue::Text("abc".into()));
    }

    #[test]
    fn event_kind_index_matches_all_order() {
        for (i, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn event_kind_serde_matches_as_str() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn event_builder_sets_correlation() {
        let cmd = Command::of(CommandKind::ClickLeft, CommandSource::Voice);
        let event = Event::new(EventKind::CommandAllowed, "test")
            .with("command", cmd.name())
            .correlated(cmd.id());
        assert_eq!(event.correlation_id, Some(cmd.id()));
        assert_eq!(event.payload["command"], "mouse.click.left");
    }

    #[test]
    fn deny_reason_wire_strings() {
        assert_eq!(DenyReason::NotAllowed.as_str(), "not_allowed");
        assert_eq!(DenyReason::InvalidPayload.as_str(), "invalid_payload");
        assert_eq!(
            DenyReason::UnknownCommandFailClosed.as_str(),
            "unknown_command_fail_closed"
        );
    }

    #[test]
    fn auth_session_exhausts_after_budget() {
        let mut session = AuthSession::new(2).unwrap();
        assert!(!session.exhausted());
        assert_eq!(session.begin_attempt(), 1);
        assert_eq!(session.begin_attempt(), 2);
        assert!(session.exhausted());
        assert_eq!(session.attempts_used(), 2);
    }

    #[test]
    fn auth_session_rejects_zero_budget() {
        assert!(matches!(AuthSession::new(0), Err(GesturaError::Config(_))));
    }

    #[test]
    fn orchestrator_state_edges() {
        use OrchestratorState::*;
        assert!(Init.can_transition_to(Authenticating));
        assert!(Init.can_transition_to(Running));
        assert!(Authenticating.can_transition_to(Stopping));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Authenticating));
        assert!(!Stopping.can_transition_to(Running));
    }

    #[test]
    fn execution_error_codes() {
        assert_eq!(
            ExecutionError::UnmappedCommand("x".into()).code(),
            "unmapped_command"
        );
        let err = ExecutionError::AdapterFailure {
            command: "system.lock".into(),
            details: "boom".into(),
        };
        assert_eq!(err.code(), "adapter_failure");
        assert!(err.to_string().contains("system.lock"));
    }

    #[test]
    fn snapshot_get_defaults_to_zero() {
        let snap = MetricsSnapshot {
            generated_at: Utc::now(),
            counters: BTreeMap::from([("command.denied".to_string(), 5)]),
        };
        assert_eq!(snap.get(EventKind::CommandDenied), 5);
        assert_eq!(snap.get(EventKind::CommandExecuted), 0);
    }
}
