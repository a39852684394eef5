//! `gestura-runtime` – The Control Loop
//!
//! Turns gesture and voice signals into safely executed desktop actions and
//! keeps the process observable while it does so.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   composition root.  Owns the `INIT → AUTHENTICATING → RUNNING →
//!   STOPPING → STOPPED` state machine, spawns the worker loops and runs the
//!   ordered graceful shutdown.
//! - [`workers`] – gesture, voice and heartbeat loops sharing one
//!   cancellation token.  Signal loops only ever enqueue commands.
//! - [`pipeline`] – [`CommandPipeline`][pipeline::CommandPipeline]: the single
//!   serializing consumer that validates each command with the
//!   [`SecurityGate`] and executes it, publishing the decision and the
//!   outcome in that order.
//! - [`translate`] – [`SignalTranslator`][translate::SignalTranslator]:
//!   gesture / voice phrase → [`Command`][gestura_types::Command].
//! - [`metrics`] – [`MetricsCollector`][metrics::MetricsCollector]:
//!   per-event-kind counters with atomic JSON snapshots.
//! - [`event_log`] – [`EventLogger`][event_log::EventLogger]: logs the event
//!   stream with sensitive fields masked.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with a rolling log file
//!   and an optional OTLP span exporter.
//!
//! # Security gating
//!
//! No command reaches an [`ActionAdapter`][gestura_hal::ActionAdapter]
//! without first passing [`SecurityGate::validate`].  The gate is
//! re-exported here so embedders can inspect decisions without a direct
//! dependency on `gestura-kernel`.

pub mod event_log;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod telemetry;
pub mod translate;
pub mod workers;

pub use event_log::EventLogger;
pub use metrics::MetricsCollector;
pub use orchestrator::{Components, Orchestrator, ShutdownReport, StopHandle};
pub use pipeline::{CommandPipeline, PipelineOutcome, PipelineStats};
pub use telemetry::{init_tracing, TelemetryGuard};
pub use translate::{SignalTranslator, Unrecognized, VOICE_COMMANDS};

pub use gestura_kernel::SecurityGate;
