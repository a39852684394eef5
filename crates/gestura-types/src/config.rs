//! Runtime configuration consumed read-only by every component.
//!
//! The structures are loaded once (see the `gestura` binary), checked with
//! [`RuntimeConfig::validate`], and then shared behind an `Arc`.  Every field
//! carries a serde default so a partial file is always a complete config.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CommandKind, GesturaError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
    pub workers: WorkerConfig,
    pub gesture: GestureConfig,
    pub voice: VoiceConfig,
    pub actions: ActionConfig,
    pub logging: LoggingConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Security
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Exhaustive list of command names permitted to reach execution.
    pub allowed_commands: Vec<String>,
    /// Deny allow-listed commands that have no registered payload schema.
    pub fail_closed: bool,
    pub redact_sensitive_logs: bool,
    /// Payload fields replaced with `<redacted>` before any logging call.
    pub sensitive_fields: Vec<String>,
    pub bounds: PayloadBounds,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: CommandKind::ALL
                .iter()
                .map(|k| k.name().to_string())
                .collect(),
            fail_closed: true,
            redact_sensitive_logs: true,
            sensitive_fields: Vec::new(),
            bounds: PayloadBounds::default(),
        }
    }
}

/// Inclusive numeric bounds applied by the payload schemas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadBounds {
    pub pointer_min: f64,
    pub pointer_max: f64,
    pub scroll_min: f64,
    pub scroll_max: f64,
}

impl Default for PayloadBounds {
    fn default() -> Self {
        Self {
            pointer_min: 0.0,
            pointer_max: 1.0,
            scroll_min: 1.0,
            scroll_max: 15.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// External face-match program; exit status 0 means "match".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognizer_program: Option<String>,

    /// Arguments passed to the recognizer (may embed reference image paths).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recognizer_args: Vec<String>,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            recognizer_program: None,
            recognizer_args: Vec::new(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl AuthConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("max_attempts", &self.max_attempts)
            .field("recognizer_program", &self.recognizer_program)
            .field(
                "recognizer_args",
                if self.recognizer_args.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics / workers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub output_path: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            output_path: PathBuf::from("runtime/metrics.json"),
        }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on any single wait for a producer signal.
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Per-worker join timeout during shutdown.
    pub join_timeout_ms: u64,
    /// A worker with no loop iteration for this long is reported stale.
    pub stale_after_ms: u64,
    /// Capacity of the worker → pipeline command queue.
    pub queue_capacity: usize,
    /// Capacity of each event-bus subscriber queue.
    pub bus_capacity: usize,
    /// Scroll amount attached to gesture and voice scroll commands.
    pub scroll_step: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            heartbeat_interval_ms: 5_000,
            join_timeout_ms: 2_000,
            stale_after_ms: 15_000,
            queue_capacity: 64,
            bus_capacity: 256,
            scroll_step: 3.0,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Producers
// ─────────────────────────────────────────────────────────────────────────────

/// Gesture interpretation thresholds.  Distances are in normalized image
/// units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub enabled: bool,
    pub mirrored: bool,
    pub smoothing_alpha: f64,
    pub deadzone: f64,
    pub click_distance: f64,
    pub right_click_distance: f64,
    pub double_click_window_ms: u64,
    pub scroll_threshold: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mirrored: true,
            smoothing_alpha: 0.25,
            deadzone: 0.004,
            click_distance: 0.045,
            right_click_distance: 0.050,
            double_click_window_ms: 800,
            scroll_threshold: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// Phrases below this recognizer confidence are ignored.
    pub min_confidence: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// Program templates used by the external-program action adapter.
///
/// Each template is `[program, arg, …]`; `{x}`/`{y}` are replaced with pixel
/// coordinates and `{amount}` with the scroll amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// A program still running after this long is killed and the command
    /// reported as failed.
    pub timeout_ms: u64,
    pub move_pointer: Vec<String>,
    pub click_left: Vec<String>,
    pub click_right: Vec<String>,
    pub double_click: Vec<String>,
    pub scroll_up: Vec<String>,
    pub scroll_down: Vec<String>,
    pub volume_up: Vec<String>,
    pub volume_down: Vec<String>,
    pub toggle_mute: Vec<String>,
    pub lock_screen: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            timeout_ms: 2_000,
            move_pointer: argv(&["xdotool", "mousemove", "{x}", "{y}"]),
            click_left: argv(&["xdotool", "click", "1"]),
            click_right: argv(&["xdotool", "click", "3"]),
            double_click: argv(&["xdotool", "click", "--repeat", "2", "1"]),
            scroll_up: argv(&["xdotool", "click", "--repeat", "{amount}", "4"]),
            scroll_down: argv(&["xdotool", "click", "--repeat", "{amount}", "5"]),
            volume_up: argv(&["pactl", "set-sink-volume", "@DEFAULT_SINK@", "+5%"]),
            volume_down: argv(&["pactl", "set-sink-volume", "@DEFAULT_SINK@", "-5%"]),
            toggle_mute: argv(&["pactl", "set-sink-mute", "@DEFAULT_SINK@", "toggle"]),
            lock_screen: argv(&["loginctl", "lock-session"]),
        }
    }
}

impl ActionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn templates(&self) -> [(&'static str, &Vec<String>); 10] {
        [
            ("move_pointer", &self.move_pointer),
            ("click_left", &self.click_left),
            ("click_right", &self.click_right),
            ("double_click", &self.double_click),
            ("scroll_up", &self.scroll_up),
            ("scroll_down", &self.scroll_down),
            ("volume_up", &self.volume_up),
            ("volume_down", &self.volume_down),
            ("toggle_mute", &self.toggle_mute),
            ("lock_screen", &self.lock_screen),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also write plain-text logs to this file.  Unset means stderr only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// When the log file is rolled over.
    pub rotation: LogRotation,
    /// Log files kept on disk, the active one included.
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: None,
            rotation: LogRotation::Daily,
            max_files: 5,
        }
    }
}

/// Roll-over period of the log file.  Rolled files get a date suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

fn invalid(msg: impl Into<String>) -> GesturaError {
    GesturaError::Config(msg.into())
}

impl RuntimeConfig {
    /// Reject inconsistent values before any component is built.
    ///
    /// # Errors
    ///
    /// [`GesturaError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), GesturaError> {
        if let Some(pos) = self
            .security
            .allowed_commands
            .iter()
            .position(|c| c.trim().is_empty())
        {
            return Err(invalid(format!(
                "security.allowed_commands[{pos}] must not be empty"
            )));
        }

        let b = &self.security.bounds;
        for (name, value) in [
            ("pointer_min", b.pointer_min),
            ("pointer_max", b.pointer_max),
            ("scroll_min", b.scroll_min),
            ("scroll_max", b.scroll_max),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("security.bounds.{name} must be finite")));
            }
        }
        if b.pointer_min > b.pointer_max {
            return Err(invalid("security.bounds.pointer_min exceeds pointer_max"));
        }
        if b.scroll_min < 0.0 || b.scroll_max <= 0.0 || b.scroll_min > b.scroll_max {
            return Err(invalid(
                "security.bounds scroll range must be positive with scroll_min <= scroll_max",
            ));
        }

        if self.auth.enabled && self.auth.max_attempts == 0 {
            return Err(invalid("auth.max_attempts must be > 0 when auth is enabled"));
        }
        if self.auth.enabled && self.auth.attempt_timeout_ms == 0 {
            return Err(invalid("auth.attempt_timeout_ms must be > 0"));
        }

        if self.metrics.enabled {
            if self.metrics.interval_ms == 0 {
                return Err(invalid("metrics.interval_ms must be > 0"));
            }
            if self.metrics.output_path.as_os_str().is_empty() {
                return Err(invalid("metrics.output_path must not be empty"));
            }
        }

        let w = &self.workers;
        for (name, value) in [
            ("poll_interval_ms", w.poll_interval_ms),
            ("heartbeat_interval_ms", w.heartbeat_interval_ms),
            ("join_timeout_ms", w.join_timeout_ms),
            ("stale_after_ms", w.stale_after_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("workers.{name} must be > 0")));
            }
        }
        if w.queue_capacity == 0 || w.bus_capacity == 0 {
            return Err(invalid("workers queue capacities must be > 0"));
        }
        if !w.scroll_step.is_finite() || w.scroll_step <= 0.0 {
            return Err(invalid("workers.scroll_step must be a positive number"));
        }

        let g = &self.gesture;
        if !(g.smoothing_alpha > 0.0 && g.smoothing_alpha <= 1.0) {
            return Err(invalid("gesture.smoothing_alpha must be in (0, 1]"));
        }
        if g.deadzone < 0.0 || g.click_distance <= 0.0 || g.right_click_distance <= 0.0 {
            return Err(invalid("gesture distances must be positive"));
        }
        if g.scroll_threshold <= 0.0 {
            return Err(invalid("gesture.scroll_threshold must be > 0"));
        }

        if self.actions.screen_width == 0 || self.actions.screen_height == 0 {
            return Err(invalid("actions.screen_width/screen_height must be > 0"));
        }
        if self.actions.timeout_ms == 0 {
            return Err(invalid("actions.timeout_ms must be > 0"));
        }
        for (name, template) in self.actions.templates() {
            if template.first().is_none_or(|p| p.trim().is_empty()) {
                return Err(invalid(format!("actions.{name} must name a program")));
            }
        }

        if let Some(path) = &self.logging.path {
            if path.file_name().is_none() {
                return Err(invalid("logging.path must name a file"));
            }
            if self.logging.max_files == 0 {
                return Err(invalid("logging.max_files must be > 0 when logging.path is set"));
            }
        }

        Ok(())
    }
}
