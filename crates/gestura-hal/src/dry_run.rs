//! Dry-run adapter for CI and safe mode.
//!
//! [`DryRunAdapter`] performs no OS side effects.  Each primitive appends a
//! short line to a shared [`ActionLog`] so tests (and `--dry-run` users, via
//! the debug log) can see exactly what would have happened.
//!
//! # Example
//!
//! ```rust
//! use gestura_hal::{ActionAdapter, DryRunAdapter};
//!
//! let mut adapter = DryRunAdapter::new();
//! let log = adapter.log();
//! adapter.move_pointer(0.5, 0.25).unwrap();
//! adapter.lock_screen().unwrap();
//! assert_eq!(log.entries(), vec!["move:0.500,0.250", "lock"]);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use gestura_types::ScrollDirection;
use tracing::debug;

use crate::action::{ActionAdapter, AdapterError};

/// Shared, clonable view of the actions a [`DryRunAdapter`] recorded.
#[derive(Clone, Default, Debug)]
pub struct ActionLog(Arc<Mutex<Vec<String>>>);

impl ActionLog {
    pub fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

/// Records actions instead of performing them.
#[derive(Default)]
pub struct DryRunAdapter {
    log: ActionLog,
    failing: HashSet<&'static str>,
}

impl DryRunAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named primitive (e.g. `"lock_screen"`) return an error, to
    /// exercise failure handling.
    pub fn failing_on(mut self, primitive: &'static str) -> Self {
        self.failing.insert(primitive);
        self
    }

    /// Handle to the action log; stays valid after the adapter is moved.
    pub fn log(&self) -> ActionLog {
        self.log.clone()
    }

    fn record(&self, primitive: &'static str, entry: String) -> Result<(), AdapterError> {
        if self.failing.contains(primitive) {
            return Err(AdapterError::Other(format!("simulated failure in {primitive}")));
        }
        debug!(action = %entry, "dry-run action");
        self.log.push(entry);
        Ok(())
    }
}

impl ActionAdapter for DryRunAdapter {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), AdapterError> {
        self.record("move_pointer", format!("move:{x:.3},{y:.3}"))
    }

    fn click_left(&mut self) -> Result<(), AdapterError> {
        self.record("click_left", "click:left".to_string())
    }

    fn click_right(&mut self) -> Result<(), AdapterError> {
        self.record("click_right", "click:right".to_string())
    }

    fn double_click(&mut self) -> Result<(), AdapterError> {
        self.record("double_click", "click:double".to_string())
    }

    fn scroll(&mut self, direction: ScrollDirection, amount: f64) -> Result<(), AdapterError> {
        self.record("scroll", format!("scroll:{}:{amount}", direction.as_str()))
    }

    fn volume_up(&mut self) -> Result<(), AdapterError> {
        self.record("volume_up", "key:volumeup".to_string())
    }

    fn volume_down(&mut self) -> Result<(), AdapterError> {
        self.record("volume_down", "key:volumedown".to_string())
    }

    fn toggle_mute(&mut self) -> Result<(), AdapterError> {
        self.record("toggle_mute", "key:volumemute".to_string())
    }

    fn lock_screen(&mut self) -> Result<(), AdapterError> {
        self.record("lock_screen", "lock".to_string())
    }
}
