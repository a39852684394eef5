//! `gestura-hal` – The Action Boundary
//!
//! Everything that touches the operating system goes through the
//! [`ActionAdapter`] trait, so the rest of the stack never learns whether a
//! click was real or simulated.
//!
//! # Modules
//!
//! - [`action`] – the [`ActionAdapter`] trait and [`AdapterError`].
//! - [`dry_run`] – [`DryRunAdapter`]: records actions, performs none.
//! - [`program`] – [`ProgramAdapter`]: runs one configured external program
//!   (e.g. `xdotool`, `pactl`) per action.
//! - [`executor`] – [`CommandExecutor`]: maps an already-validated
//!   [`Command`][gestura_types::Command] to exactly one adapter call.

pub mod action;
pub mod dry_run;
pub mod executor;
pub mod program;

pub use action::{ActionAdapter, AdapterError};
pub use dry_run::{ActionLog, DryRunAdapter};
pub use executor::CommandExecutor;
pub use program::ProgramAdapter;
