//! End-to-end runs of the orchestrator with channel producers, the dry-run
//! adapter and scripted recognizers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gestura_hal::{ActionAdapter, ActionLog, AdapterError, DryRunAdapter};
use gestura_kernel::{Recognizer, RecognizerError};
use gestura_middleware::EventTap;
use gestura_perception::{
    ChannelGestureSource, ChannelSource, ChannelVoiceSource, SignalSender, SignalSource,
    SourceError,
};
use gestura_runtime::{Components, Orchestrator};
use gestura_types::config::RuntimeConfig;
use gestura_types::{
    Event, EventKind, GesturaError, Gesture, MetricsSnapshot, OrchestratorState, ScrollDirection,
    VoicePhrase,
};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Records every event the bus accepts, in publish order.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl EventTap for Recorder {
    fn on_publish(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn of(&self, kind: EventKind) -> Vec<Event> {
        self.all().into_iter().filter(|e| e.kind == kind).collect()
    }

    fn transitions(&self) -> Vec<(String, String)> {
        self.of(EventKind::StateChanged)
            .into_iter()
            .map(|e| {
                (
                    e.payload["from"].as_str().unwrap().to_string(),
                    e.payload["to"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }
}

/// Answers from a fixed script; counts calls.
struct ScriptedRecognizer {
    answers: Mutex<VecDeque<Result<bool, RecognizerError>>>,
    calls: AtomicU32,
}

impl ScriptedRecognizer {
    fn new(answers: Vec<Result<bool, RecognizerError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self) -> Result<bool, RecognizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }
}

/// Never answers, like a camera waiting for a face.
struct SilentRecognizer;

#[async_trait]
impl Recognizer for SilentRecognizer {
    fn name(&self) -> &str {
        "silent"
    }

    async fn recognize(&self) -> Result<bool, RecognizerError> {
        std::future::pending().await
    }
}

/// A producer whose `stop` never returns.
struct HangingSource;

#[async_trait]
impl SignalSource<Gesture> for HangingSource {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn next(&mut self, wait: Duration) -> Result<Option<Gesture>, SourceError> {
        tokio::time::sleep(wait).await;
        Ok(None)
    }

    async fn stop(&mut self) {
        std::future::pending::<()>().await;
    }
}

/// Pointer moves block the calling thread for `hold`; everything else is
/// instant.
struct StuckPointer {
    hold: Duration,
}

impl ActionAdapter for StuckPointer {
    fn name(&self) -> &str {
        "stuck-pointer"
    }

    fn move_pointer(&mut self, _x: f64, _y: f64) -> Result<(), AdapterError> {
        std::thread::sleep(self.hold);
        Ok(())
    }

    fn click_left(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn click_right(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn double_click(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn scroll(&mut self, _direction: ScrollDirection, _amount: f64) -> Result<(), AdapterError> {
        Ok(())
    }

    fn volume_up(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn volume_down(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn toggle_mute(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn lock_screen(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }
}

fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.metrics.enabled = false;
    config.workers.poll_interval_ms = 10;
    config.workers.join_timeout_ms = 500;
    config
}

struct Harness {
    orch: Orchestrator,
    recorder: Arc<Recorder>,
    log: ActionLog,
    gestures: SignalSender<Gesture>,
    voice: SignalSender<VoicePhrase>,
}

fn harness(config: RuntimeConfig) -> Harness {
    let adapter = DryRunAdapter::new();
    let log = adapter.log();
    let (gestures, gesture_source) = ChannelGestureSource::channel("gesture", 64);
    let (voice, voice_source) = ChannelVoiceSource::channel("voice", 64);
    let components = Components::new(Box::new(adapter))
        .with_gesture(Box::new(gesture_source))
        .with_voice(Box::new(voice_source));
    let orch = Orchestrator::new(config, components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());
    Harness {
        orch,
        recorder,
        log,
        gestures,
        voice,
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pointer_gesture_moves_pointer_once() {
    let mut h = harness(test_config());
    h.orch.start().await.unwrap();
    assert_eq!(h.orch.state(), OrchestratorState::Running);

    assert!(h.gestures.send(Gesture::Point { x: 0.5, y: 0.5 }).await);
    let recorder = h.recorder.clone();
    wait_until("command.executed", || !recorder.of(EventKind::CommandExecuted).is_empty()).await;

    h.orch.shutdown().await;
    assert_eq!(h.log.entries(), vec!["move:0.500,0.500"]);
    let executed = h.recorder.of(EventKind::CommandExecuted);
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].payload["command"], "mouse.move");
}

#[tokio::test]
async fn command_outside_allow_list_is_denied_without_adapter_call() {
    let mut config = test_config();
    config.security.allowed_commands.retain(|c| c != "system.lock");
    let mut h = harness(config);
    h.orch.start().await.unwrap();

    assert!(h.voice.send(VoicePhrase::new("lock computer")).await);
    let recorder = h.recorder.clone();
    wait_until("command.denied", || !recorder.of(EventKind::CommandDenied).is_empty()).await;
    h.orch.shutdown().await;

    let denied = h.recorder.of(EventKind::CommandDenied);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].payload["reason"], "not_allowed");
    assert!(h.log.is_empty());
    assert!(h.recorder.of(EventKind::CommandExecuted).is_empty());
}

#[tokio::test]
async fn scroll_amount_outside_bounds_is_invalid_payload() {
    let mut config = test_config();
    config.security.bounds.scroll_min = 0.0;
    config.security.bounds.scroll_max = 1.0;
    config.workers.scroll_step = 5.0;
    let mut h = harness(config);
    h.orch.start().await.unwrap();

    assert!(h.gestures.send(Gesture::Scroll { direction: ScrollDirection::Up }).await);
    let recorder = h.recorder.clone();
    wait_until("command.denied", || !recorder.of(EventKind::CommandDenied).is_empty()).await;
    h.orch.shutdown().await;

    let denied = h.recorder.of(EventKind::CommandDenied);
    assert_eq!(denied[0].payload["reason"], "invalid_payload");
    assert_eq!(denied[0].payload["command"], "mouse.scroll.up");
    assert!(h.log.is_empty());
}

#[tokio::test]
async fn exhausted_authentication_never_reaches_running() {
    let mut config = test_config();
    config.auth.enabled = true;
    config.auth.max_attempts = 2;
    let recognizer = ScriptedRecognizer::new(vec![
        Ok(false),
        Err(RecognizerError::Failed("camera busy".into())),
    ]);
    let components =
        Components::new(Box::new(DryRunAdapter::new())).with_recognizer(recognizer.clone());
    let mut orch = Orchestrator::new(config, components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, GesturaError::AuthenticationFailed { attempts: 2 }));
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(orch.state(), OrchestratorState::Stopped);

    let transitions = recorder.transitions();
    assert_eq!(
        transitions,
        vec![
            ("INIT".to_string(), "AUTHENTICATING".to_string()),
            ("AUTHENTICATING".to_string(), "STOPPING".to_string()),
            ("STOPPING".to_string(), "STOPPED".to_string()),
        ]
    );
    assert!(transitions.iter().all(|(_, to)| to != "RUNNING"));
    assert_eq!(recorder.of(EventKind::AuthFailure).len(), 2);
    assert_eq!(recorder.of(EventKind::Error).len(), 1);
    assert_eq!(recorder.of(EventKind::Shutdown).len(), 1);
    assert!(orch.active_workers().is_empty());
}

#[tokio::test]
async fn successful_authentication_then_running() {
    let mut config = test_config();
    config.auth.enabled = true;
    config.auth.max_attempts = 3;
    let recognizer = ScriptedRecognizer::new(vec![Ok(false), Ok(true)]);
    let components =
        Components::new(Box::new(DryRunAdapter::new())).with_recognizer(recognizer.clone());
    let mut orch = Orchestrator::new(config, components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());

    orch.start().await.unwrap();
    assert_eq!(orch.state(), OrchestratorState::Running);
    let success = recorder.of(EventKind::AuthSuccess);
    assert_eq!(success.len(), 1);
    assert_eq!(success[0].payload["attempts"], 2);
    orch.shutdown().await;
}

#[tokio::test]
async fn flushed_snapshot_counts_executed_and_denied() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("metrics.json");
    let mut config = test_config();
    config.metrics.enabled = true;
    config.metrics.interval_ms = 60_000;
    config.metrics.output_path = path.clone();
    config.security.allowed_commands.retain(|c| c != "mouse.click.left");
    let mut h = harness(config);
    h.orch.start().await?;

    for i in 0..10 {
        let x = f64::from(i) / 10.0;
        assert!(h.gestures.send(Gesture::Point { x, y: 0.5 }).await);
    }
    for _ in 0..5 {
        assert!(h.gestures.send(Gesture::Click).await);
    }
    let log = h.log.clone();
    let recorder = h.recorder.clone();
    wait_until("15 decisions", || {
        log.len() == 10 && recorder.of(EventKind::CommandDenied).len() == 5
    })
    .await;

    let report = h.orch.shutdown().await;
    let written: MetricsSnapshot = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(written.get(EventKind::CommandExecuted), 10);
    assert_eq!(written.get(EventKind::CommandDenied), 5);
    assert_eq!(written.get(EventKind::CommandAllowed), 10);
    assert_eq!(report.final_snapshot.get(EventKind::CommandExecuted), 10);
    let stats = report.pipeline.unwrap();
    assert_eq!((stats.processed, stats.executed, stats.denied), (15, 10, 5));
    Ok(())
}

#[tokio::test]
async fn concurrent_stop_requests_run_one_shutdown() {
    let mut h = harness(test_config());
    h.orch.start().await.unwrap();

    let a = h.orch.stop_handle();
    let b = h.orch.stop_handle();
    let t1 = std::thread::spawn(move || a.request_stop());
    let t2 = std::thread::spawn(move || b.request_stop());
    let won = [t1.join().unwrap(), t2.join().unwrap()];
    assert_eq!(won.iter().filter(|w| **w).count(), 1);

    h.orch.wait_for_stop().await;
    let report = h.orch.shutdown().await;
    assert!(report.timed_out_workers.is_empty());
    assert!(!h.orch.request_stop());
    // A repeated shutdown replays the first report.
    assert!(h.orch.shutdown().await.timed_out_workers.is_empty());

    let to_stopping = h
        .recorder
        .transitions()
        .into_iter()
        .filter(|(_, to)| to == "STOPPING")
        .count();
    assert_eq!(to_stopping, 1);
    assert_eq!(h.recorder.of(EventKind::Shutdown).len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn decision_precedes_outcome_for_every_allowed_command() {
    let mut h = harness(test_config());
    h.orch.start().await.unwrap();

    for phrase in ["volume up", "mute", "scroll down", "right click"] {
        assert!(h.voice.send(VoicePhrase::new(phrase)).await);
    }
    for gesture in [Gesture::Click, Gesture::DoubleClick, Gesture::Point { x: 0.3, y: 0.7 }] {
        assert!(h.gestures.send(gesture).await);
    }
    let log = h.log.clone();
    wait_until("7 actions", || log.len() == 7).await;
    h.orch.shutdown().await;

    let events = h.recorder.all();
    let allowed: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::CommandAllowed)
        .collect();
    assert_eq!(allowed.len(), 7);
    for decision in allowed {
        let id = decision.correlation_id.unwrap();
        let related: Vec<_> = events
            .iter()
            .filter(|e| e.correlation_id == Some(id))
            .map(|e| e.kind)
            .collect();
        assert_eq!(related, vec![EventKind::CommandAllowed, EventKind::CommandExecuted]);
    }
}

#[tokio::test]
async fn final_snapshot_matches_published_events() {
    let mut config = test_config();
    config.workers.heartbeat_interval_ms = 20;
    let mut h = harness(config);
    h.orch.start().await.unwrap();

    assert!(h.gestures.send(Gesture::Click).await);
    assert!(h.voice.send(VoicePhrase::new("gibberish")).await);
    let recorder = h.recorder.clone();
    wait_until("heartbeat", || recorder.of(EventKind::Heartbeat).len() >= 2).await;

    let report = h.orch.shutdown().await;
    for kind in EventKind::ALL {
        assert_eq!(
            report.final_snapshot.get(kind),
            h.recorder.of(kind).len() as u64,
            "counter mismatch for {kind}"
        );
    }
    assert_eq!(report.final_snapshot.get(EventKind::Warning), 1);
    assert_eq!(report.final_snapshot.get(EventKind::VoiceCommand), 0);
}

#[tokio::test]
async fn shutdown_completes_for_any_worker_count() {
    for (gesture, voice) in [(false, false), (true, false), (false, true), (true, true)] {
        let mut config = test_config();
        config.gesture.enabled = gesture;
        config.voice.enabled = voice;
        let mut h = harness(config);
        h.orch.start().await.unwrap();
        assert_eq!(
            h.orch.active_workers().len(),
            1 + usize::from(gesture) + usize::from(voice)
        );

        h.orch.request_stop();
        let report = tokio::time::timeout(Duration::from_secs(2), h.orch.shutdown())
            .await
            .expect("shutdown overran");
        assert!(report.timed_out_workers.is_empty());
        assert_eq!(h.orch.state(), OrchestratorState::Stopped);
    }
}

#[tokio::test]
async fn unavailable_voice_source_leaves_gesture_running() {
    let adapter = DryRunAdapter::new();
    let log = adapter.log();
    let (gestures, gesture_source) = ChannelGestureSource::channel("gesture", 8);
    let voice_source: ChannelSource<VoicePhrase> =
        ChannelSource::unavailable("voice", "no microphone");
    let components = Components::new(Box::new(adapter))
        .with_gesture(Box::new(gesture_source))
        .with_voice(Box::new(voice_source));
    let mut orch = Orchestrator::new(test_config(), components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());

    orch.start().await.unwrap();
    assert_eq!(orch.state(), OrchestratorState::Running);
    assert!(!orch.active_workers().contains(&"voice"));

    let unavailable = recorder.of(EventKind::IntegrationUnavailable);
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].payload["integration"], "voice");

    assert!(gestures.send(Gesture::RightClick).await);
    let log2 = log.clone();
    wait_until("right click", || log2.len() == 1).await;
    orch.shutdown().await;
    assert_eq!(log.entries(), vec!["click:right"]);
}

#[tokio::test]
async fn stuck_worker_is_reported_not_waited_on() {
    let mut config = test_config();
    config.workers.join_timeout_ms = 100;
    let components =
        Components::new(Box::new(DryRunAdapter::new())).with_gesture(Box::new(HangingSource));
    let mut orch = Orchestrator::new(config, components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());
    orch.start().await.unwrap();

    orch.request_stop();
    let report = tokio::time::timeout(Duration::from_secs(2), orch.shutdown())
        .await
        .expect("shutdown blocked on a stuck worker");
    assert!(report.timed_out_workers.contains(&"gesture".to_string()));
    assert_eq!(orch.state(), OrchestratorState::Stopped);
    let warnings = recorder.of(EventKind::Warning);
    assert!(warnings.iter().any(|w| w.payload["reason"] == "join_timeout"));
}

#[tokio::test]
async fn stop_during_authentication_returns_ok_but_not_running() {
    let mut config = test_config();
    config.auth.enabled = true;
    config.auth.attempt_timeout_ms = 60_000;
    let components =
        Components::new(Box::new(DryRunAdapter::new())).with_recognizer(Arc::new(SilentRecognizer));
    let mut orch = Orchestrator::new(config, components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());

    let stop = orch.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.request_stop();
    });

    orch.start().await.unwrap();
    // Callers must check the state before announcing a running system.
    assert_eq!(orch.state(), OrchestratorState::Stopped);
    assert!(recorder.transitions().iter().all(|(_, to)| to != "RUNNING"));
    assert_eq!(recorder.of(EventKind::Shutdown).len(), 1);
    assert!(orch.active_workers().is_empty());
}

#[tokio::test]
async fn stop_before_start_goes_straight_to_stopped() {
    let mut h = harness(test_config());
    assert!(h.orch.request_stop());
    h.orch.start().await.unwrap();
    assert_eq!(h.orch.state(), OrchestratorState::Stopped);
    assert_eq!(
        h.recorder.transitions(),
        vec![
            ("INIT".to_string(), "STOPPING".to_string()),
            ("STOPPING".to_string(), "STOPPED".to_string()),
        ]
    );
    assert!(h.orch.active_workers().is_empty());
}

#[tokio::test]
async fn adapter_failure_does_not_stop_the_pipeline() {
    let adapter = DryRunAdapter::new().failing_on("toggle_mute");
    let log = adapter.log();
    let (voice, voice_source) = ChannelVoiceSource::channel("voice", 8);
    let components = Components::new(Box::new(adapter)).with_voice(Box::new(voice_source));
    let mut orch = Orchestrator::new(test_config(), components).unwrap();
    let recorder = Arc::new(Recorder::default());
    orch.bus().add_tap(recorder.clone());
    orch.start().await.unwrap();

    assert!(voice.send(VoicePhrase::new("mute")).await);
    assert!(voice.send(VoicePhrase::new("volume down")).await);
    let log2 = log.clone();
    wait_until("volume down", || log2.len() == 1).await;
    orch.shutdown().await;

    let failed = recorder.of(EventKind::CommandFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload["error"], "adapter_failure");
    assert_eq!(log.entries(), vec!["key:volumedown"]);
    assert_eq!(orch.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn recognised_phrase_publishes_voice_command() {
    let mut h = harness(test_config());
    h.orch.start().await.unwrap();

    assert!(h.voice.send(VoicePhrase::new("Volume up please")).await);
    let log = h.log.clone();
    wait_until("volume up", || log.len() == 1).await;
    h.orch.shutdown().await;

    let heard = h.recorder.of(EventKind::VoiceCommand);
    assert_eq!(heard.len(), 1);
    assert_eq!(heard[0].payload["command"], "system.volume.up");
    assert_eq!(heard[0].payload["text"], "Volume up please");
    let executed = h.recorder.of(EventKind::CommandExecuted);
    assert_eq!(heard[0].correlation_id, executed[0].correlation_id);
}

#[test]
fn blocked_adapter_call_does_not_hold_runtime_exit() {
    let mut config = test_config();
    config.workers.join_timeout_ms = 200;
    let grace = config.workers.join_timeout();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let started = Instant::now();
    let report = runtime.block_on(async {
        let (gestures, source) = ChannelGestureSource::channel("gesture", 8);
        let adapter = StuckPointer {
            hold: Duration::from_secs(20),
        };
        let components = Components::new(Box::new(adapter)).with_gesture(Box::new(source));
        let mut orch = Orchestrator::new(config, components).unwrap();
        let recorder = Arc::new(Recorder::default());
        orch.bus().add_tap(recorder.clone());
        orch.start().await.unwrap();

        assert!(gestures.send(Gesture::Point { x: 0.5, y: 0.5 }).await);
        wait_until("pointer move allowed", || {
            recorder.of(EventKind::CommandAllowed).len() == 1
        })
        .await;
        orch.shutdown().await
    });
    runtime.shutdown_timeout(grace);

    assert!(report.timed_out_workers.contains(&"pipeline".to_string()));
    assert!(started.elapsed() < Duration::from_secs(5));
}
