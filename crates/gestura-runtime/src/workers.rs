//! Worker loops: gesture, voice and heartbeat.
//!
//! Each loop is an independent Tokio task sharing one [`CancellationToken`].
//! Waits are bounded by `workers.poll_interval`, so a stop request is
//! observed within one interval even when no signal arrives.  Signal loops
//! never call the executor; they hand commands to the pipeline queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gestura_kernel::Watchdog;
use gestura_middleware::EventBus;
use gestura_perception::{GestureSource, SignalSource, SourceError, VoiceSource};
use gestura_types::{Command, Event, EventKind, Gesture, VoicePhrase};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::MetricsCollector;
use crate::translate::SignalTranslator;

pub const GESTURE_WORKER: &str = "gesture";
pub const VOICE_WORKER: &str = "voice";
pub const HEARTBEAT_WORKER: &str = "heartbeat";

const EVENT_SOURCE: &str = "gestura-runtime::workers";

/// Everything a worker loop shares with the orchestrator.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub token: CancellationToken,
    pub watchdog: Arc<Watchdog>,
    pub bus: EventBus,
    pub commands: mpsc::Sender<Command>,
    pub poll_interval: Duration,
    pub stale_after: Duration,
}

impl WorkerContext {
    /// Queue `command` for the pipeline.  Returns `false` when stopping or
    /// when the pipeline is gone.
    async fn submit(&self, command: Command) -> bool {
        tokio::select! {
            sent = self.commands.send(command) => sent.is_ok(),
            _ = self.token.cancelled() => false,
        }
    }
}

/// Pull signals from `source` until stop, exhaustion, or pipeline loss.
async fn drive<T, S, F>(worker: &'static str, source: &mut S, ctx: &WorkerContext, mut on_signal: F)
where
    T: Send,
    S: SignalSource<T> + ?Sized,
    F: FnMut(T) -> Option<Command> + Send,
{
    ctx.watchdog.register(worker, ctx.stale_after);
    info!(worker, source = source.name(), "worker started");

    loop {
        if ctx.token.is_cancelled() {
            break;
        }
        ctx.watchdog.beat(worker);

        let next = tokio::select! {
            _ = ctx.token.cancelled() => break,
            next = source.next(ctx.poll_interval) => next,
        };

        match next {
            Ok(None) => {}
            Ok(Some(signal)) => {
                if let Some(command) = on_signal(signal) {
                    debug!(worker, command = %command.name(), "command queued");
                    if !ctx.submit(command).await {
                        break;
                    }
                }
            }
            Err(SourceError::Closed(_)) => {
                info!(worker, "source exhausted");
                break;
            }
            Err(e) => {
                warn!(worker, error = %e, "source error");
                ctx.bus.publish(
                    Event::new(EventKind::Warning, EVENT_SOURCE)
                        .with("worker", worker)
                        .with("reason", e.to_string()),
                );
                // Back off one interval so a persistent fault does not spin.
                tokio::select! {
                    _ = ctx.token.cancelled() => break,
                    _ = tokio::time::sleep(ctx.poll_interval) => {}
                }
            }
        }
    }

    ctx.watchdog.deregister(worker);
    source.stop().await;
    info!(worker, "worker stopped");
}

pub(crate) async fn gesture_loop(
    mut source: Box<dyn GestureSource>,
    ctx: WorkerContext,
    translator: SignalTranslator,
) {
    let bus = ctx.bus.clone();
    drive(GESTURE_WORKER, source.as_mut(), &ctx, |gesture: Gesture| {
        let encoded = serde_json::to_value(&gesture).unwrap_or_default();
        bus.publish(Event::new(EventKind::GestureFrame, EVENT_SOURCE).with("gesture", encoded));
        Some(translator.gesture(&gesture))
    })
    .await;
}

pub(crate) async fn voice_loop(
    mut source: Box<dyn VoiceSource>,
    ctx: WorkerContext,
    translator: SignalTranslator,
) {
    let bus = ctx.bus.clone();
    drive(VOICE_WORKER, source.as_mut(), &ctx, |phrase: VoicePhrase| {
        match translator.voice(&phrase) {
            Ok(command) => {
                bus.publish(
                    Event::new(EventKind::VoiceCommand, EVENT_SOURCE)
                        .with("command", command.name())
                        .with("text", phrase.text)
                        .with("confidence", f64::from(phrase.confidence))
                        .correlated(command.id()),
                );
                Some(command)
            }
            Err(reason) => {
                debug!(text = %phrase.text, %reason, "voice phrase ignored");
                bus.publish(
                    Event::new(EventKind::Warning, EVENT_SOURCE)
                        .with("worker", VOICE_WORKER)
                        .with("text", phrase.text)
                        .with("reason", reason.to_string()),
                );
                None
            }
        }
    })
    .await;
}

/// Publish `heartbeat` every `interval` until stopped.  The first beat goes
/// out one interval after start.
pub(crate) async fn heartbeat_loop(
    ctx: WorkerContext,
    metrics: Arc<MetricsCollector>,
    started: Instant,
    interval: Duration,
) {
    ctx.watchdog.register(HEARTBEAT_WORKER, ctx.stale_after.max(interval * 2));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => break,
            _ = ticker.tick() => {
                ctx.watchdog.beat(HEARTBEAT_WORKER);
                let stale = ctx.watchdog.stale_workers();
                if !stale.is_empty() {
                    warn!(workers = ?stale, "stale workers detected");
                }
                let counters: serde_json::Map<String, Value> = metrics
                    .snapshot()
                    .counters
                    .into_iter()
                    .map(|(kind, n)| (kind, Value::from(n)))
                    .collect();
                ctx.bus.publish(
                    Event::new(EventKind::Heartbeat, EVENT_SOURCE)
                        .with("uptime_seconds", started.elapsed().as_secs())
                        .with("stale_workers", stale)
                        .with("counters", Value::Object(counters)),
                );
            }
        }
    }

    ctx.watchdog.deregister(HEARTBEAT_WORKER);
    debug!("heartbeat stopped");
}
