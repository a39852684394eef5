//! The validate → execute pipeline.
//!
//! All commands, from every worker, funnel through one [`CommandPipeline`]
//! fed by a bounded queue.  It handles one command at a time:
//!
//! 1. [`SecurityGate::validate`]
//! 2. publish the decision: `command.allowed` or `command.denied`
//! 3. allowed only: [`CommandExecutor::execute`]
//! 4. publish the outcome: `command.executed` or `command.failed`
//!
//! A second command is not looked at until the first one's outcome is
//! published, so two pointer moves apply in decision order.  Workers never
//! touch the executor.
//!
//! Adapters may block (they run external programs), so the consumer runs on
//! a dedicated blocking thread rather than an async task.  It ends when
//! every sender is dropped and the queue is drained.

use gestura_hal::CommandExecutor;
use gestura_kernel::SecurityGate;
use gestura_middleware::EventBus;
use gestura_types::{Command, DenyReason, Event, EventKind, ExecutionError};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const EVENT_SOURCE: &str = "gestura-runtime::pipeline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Denied(DenyReason),
    Executed,
    Failed(ExecutionError),
}

/// Totals reported when the pipeline drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub denied: u64,
    pub executed: u64,
    pub failed: u64,
}

pub struct CommandPipeline {
    gate: SecurityGate,
    executor: CommandExecutor,
    bus: EventBus,
    stats: PipelineStats,
}

impl CommandPipeline {
    pub fn new(gate: SecurityGate, executor: CommandExecutor, bus: EventBus) -> Self {
        Self {
            gate,
            executor,
            bus,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    fn redacted_payload(&self, command: &Command) -> Value {
        let map: Map<String, Value> = self
            .gate
            .redacted(command)
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect();
        Value::Object(map)
    }

    fn decision_event(&self, kind: EventKind, command: &Command) -> Event {
        Event::new(kind, EVENT_SOURCE)
            .with("command", command.name())
            .with("source", command.source().as_str())
            .correlated(command.id())
    }

    /// Validate and, if allowed, execute one command.
    pub fn process(&mut self, command: &Command) -> PipelineOutcome {
        self.stats.processed += 1;
        let decision = self.gate.validate(command);

        if !decision.allow {
            let reason = decision.reason.unwrap_or(DenyReason::NotAllowed);
            self.stats.denied += 1;
            debug!(command = %command.name(), %reason, "command denied");
            let mut event = self
                .decision_event(EventKind::CommandDenied, command)
                .with("reason", reason.as_str());
            if let Some(detail) = decision.detail {
                event = event.with("detail", detail);
            }
            self.bus.publish(event);
            return PipelineOutcome::Denied(reason);
        }

        self.bus.publish(
            self.decision_event(EventKind::CommandAllowed, command)
                .with("payload", self.redacted_payload(command)),
        );

        match self.executor.execute(command) {
            Ok(()) => {
                self.stats.executed += 1;
                self.bus
                    .publish(self.decision_event(EventKind::CommandExecuted, command));
                PipelineOutcome::Executed
            }
            Err(e) => {
                self.stats.failed += 1;
                self.bus.publish(
                    self.decision_event(EventKind::CommandFailed, command)
                        .with("error", e.code())
                        .with("details", e.to_string()),
                );
                PipelineOutcome::Failed(e)
            }
        }
    }

    /// Consume `commands` on a blocking thread until every sender is gone.
    pub fn spawn(mut self, mut commands: mpsc::Receiver<Command>) -> JoinHandle<PipelineStats> {
        tokio::task::spawn_blocking(move || {
            while let Some(command) = commands.blocking_recv() {
                self.process(&command);
            }
            let stats = self.stats;
            info!(
                processed = stats.processed,
                executed = stats.executed,
                denied = stats.denied,
                failed = stats.failed,
                "command pipeline drained"
            );
            stats
        })
    }
}
