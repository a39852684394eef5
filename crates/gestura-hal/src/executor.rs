//! Command executor: the only component allowed to perform OS actions.
//!
//! [`CommandExecutor`] holds a handler table built once at construction,
//! command name → handler, and the single [`ActionAdapter`] the handlers
//! drive.  It never re-validates: commands reach it only after the security
//! gate allowed them.
//!
//! | Outcome                          | Result                                   |
//! |----------------------------------|------------------------------------------|
//! | handler ran, adapter returned Ok | `Ok(())`                                 |
//! | no handler for the name          | [`ExecutionError::UnmappedCommand`]      |
//! | adapter returned an error        | [`ExecutionError::AdapterFailure`]       |
//! | adapter panicked                 | [`ExecutionError::AdapterFailure`]       |
//!
//! A failing or panicking adapter never takes the executor down; the next
//! command runs normally.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use gestura_types::{Command, CommandKind, ExecutionError, ScrollDirection};
use tracing::{debug, warn};

use crate::action::{ActionAdapter, AdapterError};

/// A handler performs exactly one adapter call for one command.
pub type Handler = fn(&mut dyn ActionAdapter, &Command) -> Result<(), AdapterError>;

pub struct CommandExecutor {
    adapter: Box<dyn ActionAdapter>,
    handlers: HashMap<String, Handler>,
}

impl CommandExecutor {
    /// Executor with a handler for every [`CommandKind`].
    pub fn new(adapter: Box<dyn ActionAdapter>) -> Self {
        let handlers = CommandKind::ALL
            .into_iter()
            .map(|kind| (kind.name().to_string(), standard_handler(kind)))
            .collect();
        Self { adapter, handlers }
    }

    /// Executor with an empty handler table; see [`register`](Self::register).
    pub fn empty(adapter: Box<dyn ActionAdapter>) -> Self {
        Self {
            adapter,
            handlers: HashMap::new(),
        }
    }

    /// Wire (or replace) the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Remove the handler for `name`, leaving it unmapped.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn is_mapped(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Carry out an allowed command.
    pub fn execute(&mut self, command: &Command) -> Result<(), ExecutionError> {
        let Some(handler) = self.handlers.get(command.name()).copied() else {
            warn!(command = command.name(), "no handler registered");
            return Err(ExecutionError::UnmappedCommand(command.name().to_string()));
        };

        let adapter = self.adapter.as_mut();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(adapter, command)));

        match outcome {
            Ok(Ok(())) => {
                debug!(command = command.name(), id = %command.id(), "command executed");
                Ok(())
            }
            Ok(Err(e)) => Err(ExecutionError::AdapterFailure {
                command: command.name().to_string(),
                details: e.to_string(),
            }),
            Err(payload) => Err(ExecutionError::AdapterFailure {
                command: command.name().to_string(),
                details: format!("adapter panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn field(command: &Command, key: &'static str) -> Result<f64, AdapterError> {
    command.number(key).ok_or(AdapterError::MissingField(key))
}

fn standard_handler(kind: CommandKind) -> Handler {
    match kind {
        CommandKind::MouseMove => |a, c| a.move_pointer(field(c, "x")?, field(c, "y")?),
        CommandKind::ClickLeft => |a, _| a.click_left(),
        CommandKind::ClickRight => |a, _| a.click_right(),
        CommandKind::DoubleClick => |a, _| a.double_click(),
        CommandKind::ScrollUp => |a, c| a.scroll(ScrollDirection::Up, field(c, "amount")?),
        CommandKind::ScrollDown => |a, c| a.scroll(ScrollDirection::Down, field(c, "amount")?),
        CommandKind::VolumeUp => |a, _| a.volume_up(),
        CommandKind::VolumeDown => |a, _| a.volume_down(),
        CommandKind::MuteToggle => |a, _| a.toggle_mute(),
        CommandKind::Lock => |a, _| a.lock_screen(),
    }
}
