//! Generic `ActionAdapter` trait for pointer, scroll, volume and lock
//! primitives.
//!
//! Adapters are handed to a [`CommandExecutor`][crate::executor::CommandExecutor]
//! once at startup.  The rest of the stack only ever talks to the trait, so
//! the real OS adapter and the dry-run stand-in are interchangeable.

use std::time::Duration;

use gestura_types::ScrollDirection;
use thiserror::Error;

/// Failure reported by an adapter primitive.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' did not finish within {timeout:?}; killed")]
    Timeout { program: String, timeout: Duration },

    #[error("payload field '{0}' missing or not numeric")]
    MissingField(&'static str),

    #[error("{0}")]
    Other(String),
}

/// The OS action primitives.
///
/// Pointer coordinates are normalized to `[0, 1]` on both axes; each adapter
/// maps them to its own coordinate space.
pub trait ActionAdapter: Send + Sync {
    /// Short identifier for logs, e.g. `"dry-run"`.
    fn name(&self) -> &str;

    fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), AdapterError>;

    fn click_left(&mut self) -> Result<(), AdapterError>;

    fn click_right(&mut self) -> Result<(), AdapterError>;

    fn double_click(&mut self) -> Result<(), AdapterError>;

    fn scroll(&mut self, direction: ScrollDirection, amount: f64) -> Result<(), AdapterError>;

    fn volume_up(&mut self) -> Result<(), AdapterError>;

    fn volume_down(&mut self) -> Result<(), AdapterError>;

    fn toggle_mute(&mut self) -> Result<(), AdapterError>;

    fn lock_screen(&mut self) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_keeps_source() {
        let err = AdapterError::Spawn {
            program: "xdotool".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("xdotool"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn timeout_names_program_and_limit() {
        let err = AdapterError::Timeout {
            program: "xdotool".into(),
            timeout: Duration::from_millis(250),
        };
        let msg = err.to_string();
        assert!(msg.contains("xdotool"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn missing_field_names_field() {
        assert!(AdapterError::MissingField("amount").to_string().contains("amount"));
    }
}
