//! [`MetricsCollector`] – per-event-kind counters with periodic snapshots.
//!
//! The collector is registered on the [`EventBus`][gestura_middleware::EventBus]
//! as an [`EventTap`], so every accepted event bumps its kind's counter
//! synchronously inside `publish`.  Counters are plain atomics: many
//! publishers increment concurrently and no counter ever decreases.
//!
//! Snapshots are written as JSON to `metrics.output_path` by
//! [`MetricsCollector::flush`], periodically once
//! [`MetricsCollector::start_periodic_flush`] is running, and one last time
//! from [`MetricsCollector::stop`].  The write goes to a sibling temp file
//! that is then renamed over the target, so readers never see a torn file.
//! From async code the write runs on the blocking pool
//! ([`MetricsCollector::flush_async`]) so a slow disk never stalls a runtime
//! worker thread.
//! A failed write is logged and retried on the next tick.
//!
//! With `metrics.enabled = false` counting continues (the heartbeat reports
//! counters) but nothing is written to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use gestura_middleware::EventTap;
use gestura_types::config::MetricsConfig;
use gestura_types::{Event, EventKind, GesturaError, MetricsSnapshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct FlushTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct MetricsCollector {
    counters: [AtomicU64; EventKind::COUNT],
    enabled: bool,
    output_path: PathBuf,
    flush_failures: AtomicU64,
    task: Mutex<Option<FlushTask>>,
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            enabled: config.enabled,
            output_path: config.output_path.clone(),
            flush_failures: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    pub fn increment(&self, kind: EventKind) {
        self.counters[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    /// Current counters; every kind is present, zero included.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters: BTreeMap<String, u64> = EventKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), self.count(*k)))
            .collect();
        MetricsSnapshot {
            generated_at: Utc::now(),
            counters,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Number of snapshot writes that failed so far.
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    /// Take a snapshot and persist it (when enabled).
    ///
    /// # Errors
    ///
    /// [`GesturaError::Io`] / [`GesturaError::Serialization`] when the
    /// snapshot cannot be written.  The counters are unaffected.
    pub fn flush(&self) -> Result<MetricsSnapshot, GesturaError> {
        let snapshot = self.snapshot();
        if self.enabled {
            if let Err(e) = write_atomically(&self.output_path, &snapshot) {
                self.flush_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
            debug!(path = %self.output_path.display(), "metrics snapshot written");
        }
        Ok(snapshot)
    }

    /// [`flush`](Self::flush) on the blocking pool.
    pub async fn flush_async(self: &Arc<Self>) -> Result<MetricsSnapshot, GesturaError> {
        let collector = Arc::clone(self);
        tokio::task::spawn_blocking(move || collector.flush())
            .await
            .map_err(|e| GesturaError::Io(std::io::Error::other(e)))?
    }

    /// Spawn the periodic flush task.  Returns `false` when metrics are
    /// disabled or the task is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_periodic_flush(self: &Arc<Self>, interval: Duration) -> bool {
        if !self.enabled || interval.is_zero() {
            return false;
        }
        let mut slot = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let collector = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = collector.flush_async().await {
                            warn!(error = %e, "metrics flush failed; retrying next interval");
                        }
                    }
                }
            }
        });
        *slot = Some(FlushTask { cancel, handle });
        true
    }

    /// Stop the periodic task and write a final snapshot.
    ///
    /// A failed final write is logged; the in-memory snapshot is still
    /// returned.
    pub async fn stop(self: &Arc<Self>) -> MetricsSnapshot {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "metrics flush task ended abnormally");
            }
        }
        match self.flush_async().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "final metrics flush failed");
                self.snapshot()
            }
        }
    }
}

impl EventTap for MetricsCollector {
    fn on_publish(&self, event: &Event) {
        self.increment(event.kind);
    }
}

fn write_atomically(path: &Path, snapshot: &MetricsSnapshot) -> Result<(), GesturaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
