//! In-process publish/subscribe event bus.
//!
//! Every subscriber owns a bounded [`tokio::sync::mpsc`] queue.  Publishing is
//! a non-blocking `try_send` into each matching queue, so a slow subscriber
//! loses events (counted in [`EventBus::dropped_events`]) instead of stalling
//! the publisher.
//!
//! # Ordering
//!
//! Events published by one caller reach each subscriber in publish order.
//! Nothing is guaranteed across concurrent publishers.
//!
//! # Lifecycle
//!
//! | State | `publish` |
//! |---|---|
//! | before [`EventBus::start`] | dropped silently |
//! | running | delivered |
//! | after [`EventBus::stop`] | dropped silently |
//!
//! [`EventBus::stop`] closes every subscriber queue and waits (bounded) for
//! handler tasks to drain what was already queued, so the last events
//! published before `stop` are still delivered.
//!
//! # Taps
//!
//! An [`EventTap`] is invoked synchronously inside `publish` for every
//! accepted event.  The metrics collector uses this hook so its counters
//! always equal the number of events actually published.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use gestura_types::{Event, EventKind};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default per-subscriber queue capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Upper bound on how long [`EventBus::stop`] waits for handlers to drain.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_millis(1500);

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Synchronous publish hook.
pub trait EventTap: Send + Sync {
    fn on_publish(&self, event: &Event);
}

/// Selects which events a subscriber receives.
#[derive(Clone)]
pub enum EventFilter {
    All,
    Kind(EventKind),
    Kinds(Vec<EventKind>),
    Predicate(Arc<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl EventFilter {
    pub fn predicate(f: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        EventFilter::Predicate(Arc::new(f))
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kind(kind) => event.kind == *kind,
            EventFilter::Kinds(kinds) => kinds.contains(&event.kind),
            EventFilter::Predicate(f) => f(event),
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFilter::All => f.write_str("All"),
            EventFilter::Kind(k) => write!(f, "Kind({k})"),
            EventFilter::Kinds(ks) => write!(f, "Kinds({ks:?})"),
            EventFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Handle returned by the subscribe calls, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

struct BusInner {
    capacity: usize,
    state: AtomicU8,
    subscribers: RwLock<Vec<Subscriber>>,
    taps: RwLock<Vec<Arc<dyn EventTap>>>,
    handlers: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
    next_id: AtomicU64,
}

/// Shared event bus.  Clone it cheaply – all clones share the same
/// subscriber registry and lifecycle.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a stopped-until-started bus whose subscriber queues each hold
    /// `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                state: AtomicU8::new(STATE_IDLE),
                subscribers: RwLock::new(Vec::new()),
                taps: RwLock::new(Vec::new()),
                handlers: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin accepting events.  Returns `false` if the bus was already
    /// running or has been stopped (a stopped bus stays stopped).
    pub fn start(&self) -> bool {
        let started = self
            .inner
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if started {
            debug!("event bus started");
        }
        started
    }

    /// Stop accepting events, close all subscriber queues, and wait for
    /// handler tasks to deliver what was already queued.
    ///
    /// Idempotent: calls after the first return immediately.
    pub async fn stop(&self) {
        let previous = self.inner.state.swap(STATE_STOPPED, Ordering::AcqRel);
        if previous == STATE_STOPPED {
            return;
        }

        // Dropping the senders lets each handler drain its queue and exit.
        let closed = {
            let mut subs = write_lock(&self.inner.subscribers);
            std::mem::take(&mut *subs)
        };
        drop(closed);

        let handlers = {
            let mut guard = self
                .inner
                .handlers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for handle in handlers {
            if tokio::time::timeout(STOP_DRAIN_TIMEOUT, handle).await.is_err() {
                warn!("event bus handler did not drain within {:?}", STOP_DRAIN_TIMEOUT);
            }
        }

        let dropped = self.dropped_events();
        debug!(dropped, "event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish `event` to every matching subscriber.
    ///
    /// Never blocks and never fails: outside the running state the event is
    /// discarded, and a full subscriber queue drops the event for that
    /// subscriber only.  Returns the number of queues that accepted it.
    pub fn publish(&self, event: Event) -> usize {
        if !self.is_running() {
            debug!(kind = %event.kind, "event bus not running; event discarded");
            return 0;
        }

        for tap in read_lock(&self.inner.taps).iter() {
            tap.on_publish(&event);
        }

        let subs = read_lock(&self.inner.subscribers);
        let mut delivered = 0;
        for sub in subs.iter().filter(|s| s.filter.matches(&event)) {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(subscription = sub.id.0, kind = %event.kind, "subscriber queue full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Subscribing
    // -----------------------------------------------------------------------

    /// Run `handler` on a dedicated Tokio task for every matching event.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) + Send + 'static,
    {
        let (id, mut rx) = self.register(filter.into());
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
        });
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
        id
    }

    /// Subscribe with a pull-style receiver instead of a handler.
    pub fn subscribe_channel(&self, filter: impl Into<EventFilter>) -> EventReceiver {
        let (id, rx) = self.register(filter.into());
        EventReceiver { id, rx }
    }

    /// Remove a subscription.  Its queue is closed; already-queued events
    /// are still delivered.  No-op for unknown ids.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        write_lock(&self.inner.subscribers).retain(|s| s.id != id);
    }

    /// Register a synchronous publish hook.
    pub fn add_tap(&self, tap: Arc<dyn EventTap>) {
        write_lock(&self.inner.taps).push(tap);
    }

    pub fn subscriber_count(&self) -> usize {
        read_lock(&self.inner.subscribers).len()
    }

    /// Total events discarded because a subscriber queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn register(&self, filter: EventFilter) -> (SubscriptionId, mpsc::Receiver<Event>) {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        if self.inner.state.load(Ordering::Acquire) == STATE_STOPPED {
            // The sender is dropped right away so the receiver sees a closed
            // queue instead of waiting forever.
            return (id, rx);
        }
        write_lock(&self.inner.subscribers).push(Subscriber { id, filter, tx });
        (id, rx)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Pull-style receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to one subscription.
///
/// Obtained via [`EventBus::subscribe_channel`].
pub struct EventReceiver {
    id: SubscriptionId,
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event.  Returns `None` once the bus has stopped (or
    /// the subscription was removed) and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}
