//! [`Orchestrator`] – the composition root.
//!
//! Owns the process state machine and every shared component: the event
//! bus, the metrics collector, the authentication gate, the command
//! pipeline and the worker tasks.
//!
//! ```text
//! INIT ──► AUTHENTICATING ──► RUNNING ──► STOPPING ──► STOPPED
//!   │            │                           ▲
//!   │            └───────────────────────────┤  (auth exhausted)
//!   ├──────────────────► RUNNING             │  (auth disabled)
//!   └────────────────────────────────────────┘  (stop before start)
//! ```
//!
//! # Shutdown
//!
//! [`StopHandle::request_stop`] is the only cancellation entry point.  It is
//! level-triggered and settable once; any number of triggers (signal
//! handler, duration timer, tests) may call it.  The orchestrator's own
//! control path then runs [`Orchestrator::shutdown`] exactly once:
//!
//! 1. `→ STOPPING`
//! 2. join each worker with `workers.join_timeout`; a worker that overruns
//!    is aborted and reported as a shutdown anomaly
//! 3. close the command queue and join the pipeline
//! 4. `→ STOPPED`, publish `shutdown`
//! 5. final metrics flush
//! 6. stop the event bus last, so the `shutdown` event is still delivered

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gestura_hal::{ActionAdapter, CommandExecutor};
use gestura_kernel::{AuthenticationGate, Recognizer, SecurityGate, Watchdog};
use gestura_middleware::EventBus;
use gestura_perception::{GestureSource, SignalSource, VoiceSource};
use gestura_types::config::RuntimeConfig;
use gestura_types::{
    Command, Event, EventKind, Gesture, GesturaError, MetricsSnapshot, OrchestratorState, VoicePhrase,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::event_log::EventLogger;
use crate::metrics::MetricsCollector;
use crate::pipeline::{CommandPipeline, PipelineStats};
use crate::translate::SignalTranslator;
use crate::workers::{self, WorkerContext};

const EVENT_SOURCE: &str = "gestura-runtime::orchestrator";

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

/// The pluggable parts an [`Orchestrator`] is assembled from.
pub struct Components {
    pub adapter: Box<dyn ActionAdapter>,
    pub gesture: Option<Box<dyn GestureSource>>,
    pub voice: Option<Box<dyn VoiceSource>>,
    pub recognizer: Option<Arc<dyn Recognizer>>,
}

impl Components {
    pub fn new(adapter: Box<dyn ActionAdapter>) -> Self {
        Self {
            adapter,
            gesture: None,
            voice: None,
            recognizer: None,
        }
    }

    pub fn with_gesture(mut self, source: Box<dyn GestureSource>) -> Self {
        self.gesture = Some(source);
        self
    }

    pub fn with_voice(mut self, source: Box<dyn VoiceSource>) -> Self {
        self.voice = Some(source);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StopHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable, thread-safe stop trigger.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    token: CancellationToken,
}

impl StopHandle {
    /// Request a graceful stop.  Returns `true` only for the call that
    /// actually set the signal; later calls are no-ops.
    pub fn request_stop(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("stop requested");
        self.token.cancel();
        true
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

/// What happened during [`Orchestrator::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Workers (and possibly `"pipeline"`) that missed the join timeout.
    pub timed_out_workers: Vec<String>,
    pub pipeline: Option<PipelineStats>,
    pub final_snapshot: MetricsSnapshot,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    config: RuntimeConfig,
    state: OrchestratorState,
    bus: EventBus,
    metrics: Arc<MetricsCollector>,
    watchdog: Arc<Watchdog>,
    auth: AuthenticationGate,
    stop: StopHandle,
    adapter: Option<Box<dyn ActionAdapter>>,
    gesture: Option<Box<dyn GestureSource>>,
    voice: Option<Box<dyn VoiceSource>>,
    commands: Option<mpsc::Sender<Command>>,
    pipeline: Option<JoinHandle<PipelineStats>>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    started_at: Instant,
    report: Option<ShutdownReport>,
}

impl Orchestrator {
    /// Validate `config` and assemble the orchestrator in `INIT`.
    ///
    /// Nothing is started yet: the bus is idle and no task is spawned.
    ///
    /// # Errors
    ///
    /// [`GesturaError::Config`] for an invalid configuration, or when
    /// authentication is enabled without a recognizer.
    pub fn new(config: RuntimeConfig, components: Components) -> Result<Self, GesturaError> {
        config.validate()?;
        if config.auth.enabled && components.recognizer.is_none() {
            return Err(GesturaError::Config(
                "auth.enabled is set but no recognizer is available".to_string(),
            ));
        }

        let bus = EventBus::new(config.workers.bus_capacity);
        let metrics = Arc::new(MetricsCollector::new(&config.metrics));
        bus.add_tap(metrics.clone());
        let auth = AuthenticationGate::new(&config.auth, components.recognizer, bus.clone());

        Ok(Self {
            state: OrchestratorState::Init,
            bus,
            metrics,
            watchdog: Arc::new(Watchdog::new()),
            auth,
            stop: StopHandle::default(),
            adapter: Some(components.adapter),
            gesture: components.gesture,
            voice: components.voice,
            commands: None,
            pipeline: None,
            workers: Vec::new(),
            started_at: Instant::now(),
            report: None,
            config,
        })
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Shorthand for `stop_handle().request_stop()`.
    pub fn request_stop(&self) -> bool {
        self.stop.request_stop()
    }

    pub async fn wait_for_stop(&self) {
        self.stop.stopped().await;
    }

    /// Names of the worker tasks currently running.
    pub fn active_workers(&self) -> Vec<&'static str> {
        self.workers.iter().map(|(name, _)| *name).collect()
    }

    fn transition(&mut self, to: OrchestratorState) -> Result<(), GesturaError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(GesturaError::InvalidTransition { from, to });
        }
        self.state = to;
        info!(%from, %to, "orchestrator state changed");
        self.bus.publish(
            Event::new(EventKind::StateChanged, EVENT_SOURCE)
                .with("from", from.as_str())
                .with("to", to.as_str()),
        );
        Ok(())
    }

    /// Run the startup sequence.
    ///
    /// Returns once `RUNNING` is reached.  Returns `Ok` without reaching
    /// `RUNNING` when a stop was requested before or during startup; the
    /// orchestrator is then already `STOPPED`.
    ///
    /// # Errors
    ///
    /// - [`GesturaError::InvalidTransition`] when called twice.
    /// - [`GesturaError::AuthenticationFailed`] when the attempt budget is
    ///   exhausted.  Shutdown has completed by the time this is returned.
    pub async fn start(&mut self) -> Result<(), GesturaError> {
        if self.state != OrchestratorState::Init {
            return Err(GesturaError::InvalidTransition {
                from: self.state,
                to: OrchestratorState::Running,
            });
        }

        self.started_at = Instant::now();
        EventLogger::new(&self.config.security).attach(&self.bus);
        self.bus.start();
        self.metrics.start_periodic_flush(self.config.metrics.interval());
        self.bus.publish(
            Event::new(EventKind::Startup, EVENT_SOURCE)
                .with("version", env!("CARGO_PKG_VERSION"))
                .with("auth_enabled", self.auth.is_enabled()),
        );

        if self.stop.is_stop_requested() {
            info!("stop requested before start");
            self.shutdown().await;
            return Ok(());
        }

        if self.auth.is_enabled() {
            self.transition(OrchestratorState::Authenticating)?;
            let stop = self.stop.clone();
            let outcome = tokio::select! {
                outcome = self.auth.authenticate() => Some(outcome),
                _ = stop.stopped() => None,
            };
            let Some(outcome) = outcome else {
                info!("stop requested during authentication");
                self.shutdown().await;
                return Ok(());
            };
            match outcome {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => {
                    return Err(self.fail_authentication(outcome.attempts_used).await);
                }
                Err(e) => {
                    error!(error = %e, "authentication could not run");
                    self.shutdown().await;
                    return Err(e);
                }
            }
        }

        self.spawn_pipeline();
        self.spawn_workers().await;
        self.transition(OrchestratorState::Running)?;
        info!(workers = ?self.active_workers(), "orchestrator running");
        Ok(())
    }

    async fn fail_authentication(&mut self, attempts: u32) -> GesturaError {
        error!(attempts, "authentication failed; shutting down");
        self.bus.publish(
            Event::new(EventKind::Error, EVENT_SOURCE)
                .with("reason", "authentication_failed")
                .with("attempts", attempts),
        );
        self.shutdown().await;
        GesturaError::AuthenticationFailed { attempts }
    }

    fn spawn_pipeline(&mut self) {
        let Some(adapter) = self.adapter.take() else {
            return;
        };
        let (tx, rx) = mpsc::channel(self.config.workers.queue_capacity);
        let executor = CommandExecutor::new(adapter);
        info!(adapter = executor.adapter_name(), "command pipeline starting");
        let pipeline = CommandPipeline::new(
            SecurityGate::from_config(&self.config.security),
            executor,
            self.bus.clone(),
        );
        self.pipeline = Some(pipeline.spawn(rx));
        self.commands = Some(tx);
    }

    fn worker_context(&self, commands: mpsc::Sender<Command>) -> WorkerContext {
        WorkerContext {
            token: self.stop.token.clone(),
            watchdog: Arc::clone(&self.watchdog),
            bus: self.bus.clone(),
            commands,
            poll_interval: self.config.workers.poll_interval(),
            stale_after: self.config.workers.stale_after(),
        }
    }

    /// Start a source; on failure publish `integration.unavailable` and
    /// report `false` so its worker stays disabled.
    async fn open_source<T, S>(&self, worker: &'static str, source: &mut S) -> bool
    where
        T: Send,
        S: SignalSource<T> + ?Sized,
    {
        match source.start().await {
            Ok(()) => true,
            Err(e) => {
                warn!(worker, error = %e, "integration unavailable; worker disabled");
                self.bus.publish(
                    Event::new(EventKind::IntegrationUnavailable, EVENT_SOURCE)
                        .with("integration", worker)
                        .with("reason", e.to_string()),
                );
                false
            }
        }
    }

    async fn spawn_workers(&mut self) {
        let Some(commands) = self.commands.clone() else {
            return;
        };
        let translator = SignalTranslator::from_config(&self.config);

        match self.gesture.take() {
            Some(mut source) if self.config.gesture.enabled => {
                if self.open_source::<Gesture, _>(workers::GESTURE_WORKER, source.as_mut()).await {
                    let ctx = self.worker_context(commands.clone());
                    let handle = tokio::spawn(workers::gesture_loop(source, ctx, translator.clone()));
                    self.workers.push((workers::GESTURE_WORKER, handle));
                }
            }
            Some(_) => debug!("gesture disabled by configuration"),
            None => debug!("no gesture source configured"),
        }

        match self.voice.take() {
            Some(mut source) if self.config.voice.enabled => {
                if self.open_source::<VoicePhrase, _>(workers::VOICE_WORKER, source.as_mut()).await {
                    let ctx = self.worker_context(commands.clone());
                    let handle = tokio::spawn(workers::voice_loop(source, ctx, translator));
                    self.workers.push((workers::VOICE_WORKER, handle));
                }
            }
            Some(_) => debug!("voice disabled by configuration"),
            None => debug!("no voice source configured"),
        }

        let ctx = self.worker_context(commands);
        let handle = tokio::spawn(workers::heartbeat_loop(
            ctx,
            Arc::clone(&self.metrics),
            self.started_at,
            self.config.workers.heartbeat_interval(),
        ));
        self.workers.push((workers::HEARTBEAT_WORKER, handle));
    }

    /// Run the graceful shutdown sequence.  Idempotent: a second call
    /// returns the first call's report.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.stop.request_stop();
        if let Err(e) = self.transition(OrchestratorState::Stopping) {
            warn!(error = %e, "unexpected state at shutdown");
        }

        let join_timeout = self.config.workers.join_timeout();
        let mut timed_out = Vec::new();

        for (worker, mut handle) in self.workers.drain(..) {
            match tokio::time::timeout(join_timeout, &mut handle).await {
                Ok(Ok(())) => debug!(worker, "worker joined"),
                Ok(Err(e)) => {
                    error!(worker, error = %e, "worker task ended abnormally");
                    self.bus.publish(
                        Event::new(EventKind::Error, EVENT_SOURCE)
                            .with("worker", worker)
                            .with("reason", e.to_string()),
                    );
                }
                Err(_) => {
                    handle.abort();
                    warn!(worker, timeout = ?join_timeout, "worker missed join timeout; aborted");
                    self.bus.publish(
                        Event::new(EventKind::Warning, EVENT_SOURCE)
                            .with("worker", worker)
                            .with("reason", "join_timeout"),
                    );
                    timed_out.push(worker.to_string());
                }
            }
        }

        // Workers hold the other senders; with them gone the pipeline drains
        // what is queued and exits.
        drop(self.commands.take());
        let pipeline = match self.pipeline.take() {
            Some(handle) => join_pipeline(handle, join_timeout, &mut timed_out).await,
            None => None,
        };

        if let Err(e) = self.transition(OrchestratorState::Stopped) {
            warn!(error = %e, "unexpected state at shutdown");
        }
        self.bus.publish(
            Event::new(EventKind::Shutdown, EVENT_SOURCE)
                .with("uptime_seconds", self.started_at.elapsed().as_secs())
                .with("timed_out_workers", timed_out.clone()),
        );

        let final_snapshot = self.metrics.stop().await;
        self.bus.stop().await;
        info!(timed_out = timed_out.len(), "orchestrator stopped");

        let report = ShutdownReport {
            timed_out_workers: timed_out,
            pipeline,
            final_snapshot,
        };
        self.report = Some(report.clone());
        report
    }

    /// Start, wait for a stop request, shut down.
    ///
    /// # Errors
    ///
    /// Whatever [`Orchestrator::start`] returns.
    pub async fn run(&mut self) -> Result<ShutdownReport, GesturaError> {
        self.start().await?;
        if self.state == OrchestratorState::Running {
            self.wait_for_stop().await;
        }
        Ok(self.shutdown().await)
    }
}

async fn join_pipeline(
    handle: JoinHandle<PipelineStats>,
    timeout: Duration,
    timed_out: &mut Vec<String>,
) -> Option<PipelineStats> {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(stats)) => Some(stats),
        Ok(Err(e)) => {
            error!(error = %e, "command pipeline ended abnormally");
            None
        }
        Err(_) => {
            warn!(timeout = ?timeout, "command pipeline missed join timeout");
            timed_out.push("pipeline".to_string());
            None
        }
    }
}
