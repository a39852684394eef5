//! `gestura-kernel` – Safety & Admission
//!
//! Nothing in here performs an action.  It decides whether something may
//! happen, and keeps an eye on whoever is doing the work.
//!
//! # Modules
//!
//! - [`payload_schema`] – [`SchemaRegistry`][payload_schema::SchemaRegistry]:
//!   per-command payload shapes (required numeric fields and their bounds).
//! - [`security_gate`] – [`SecurityGate`][security_gate::SecurityGate]:
//!   the allow-list and schema check every command passes through before
//!   it may reach the executor.  Also owns log redaction of sensitive fields.
//! - [`auth_gate`] – [`AuthenticationGate`][auth_gate::AuthenticationGate]:
//!   drives an external [`Recognizer`][auth_gate::Recognizer] up to the
//!   configured attempt budget at startup.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: per-worker liveness.

pub mod auth_gate;
pub mod payload_schema;
pub mod security_gate;
pub mod watchdog;

pub use auth_gate::{AuthOutcome, AuthenticationGate, ProgramRecognizer, Recognizer, RecognizerError};
pub use payload_schema::{FieldRule, PayloadSchema, SchemaRegistry};
pub use security_gate::SecurityGate;
pub use watchdog::{WorkerHealth, Watchdog};
