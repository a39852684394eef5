//! [`Watchdog`] – worker liveness monitor.
//!
//! Each worker loop calls [`Watchdog::beat`] once per iteration.  The
//! heartbeat loop calls [`Watchdog::stale_workers`] to list workers that have
//! not beaten within their deadline; a stuck producer shows up there long
//! before anyone notices missing clicks.
//!
//! The watchdog is internally synchronized and meant to be shared behind an
//! `Arc` between the worker tasks.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use gestura_kernel::watchdog::{Watchdog, WorkerHealth};
//!
//! let wd = Watchdog::new();
//! wd.register("gesture", Duration::from_secs(1));
//! wd.beat("gesture");
//!
//! assert_eq!(wd.health("gesture"), WorkerHealth::Healthy);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    /// Beat within its deadline.
    Healthy,
    /// Silent past its deadline, or never registered.
    Stale,
}

struct WorkerEntry {
    last_beat: Instant,
    deadline: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Watchdog {
    workers: Mutex<HashMap<String, WorkerEntry>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorkerEntry>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `worker` with a beat `deadline`.  It starts healthy.
    ///
    /// Re-registering resets the deadline.
    pub fn register(&self, worker: &str, deadline: Duration) {
        self.lock().insert(
            worker.to_string(),
            WorkerEntry {
                last_beat: Instant::now(),
                deadline,
            },
        );
    }

    /// Drop `worker` from monitoring, e.g. once it exited on purpose.
    pub fn deregister(&self, worker: &str) {
        self.lock().remove(worker);
    }

    /// Record a beat.  No-op for unregistered workers.
    pub fn beat(&self, worker: &str) {
        if let Some(entry) = self.lock().get_mut(worker) {
            entry.last_beat = Instant::now();
        }
    }

    pub fn health(&self, worker: &str) -> WorkerHealth {
        match self.lock().get(worker) {
            Some(entry) if entry.last_beat.elapsed() <= entry.deadline => WorkerHealth::Healthy,
            _ => WorkerHealth::Stale,
        }
    }

    /// Names of workers past their deadline, sorted.
    pub fn stale_workers(&self) -> Vec<String> {
        let mut stale: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| entry.last_beat.elapsed() > entry.deadline)
            .map(|(name, _)| name.clone())
            .collect();
        stale.sort();
        stale
    }

    pub fn registered(&self) -> usize {
        self.lock().len()
    }
}
