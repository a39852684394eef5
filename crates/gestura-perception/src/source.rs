//! Signal producer traits and channel-backed producers.
//!
//! A worker loop sees a producer only through [`SignalSource`]: start it
//! once, pull the next signal with a bounded wait, stop it at shutdown.
//! [`GestureSource`] and [`VoiceSource`] are the two concrete flavours the
//! orchestrator wires up.
//!
//! [`ChannelSource`] is backed by a bounded tokio channel.  Whatever feeds the
//! paired [`SignalSender`] (a camera thread, the replay driver, a test) is
//! the real producer.

use std::time::Duration;

use async_trait::async_trait;
use gestura_types::{Gesture, VoicePhrase};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The producer could not be initialized; its worker stays disabled.
    #[error("source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    /// The producer has no further signals.
    #[error("source '{0}' closed")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("replay line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// A producer of signals of type `T`.
#[async_trait]
pub trait SignalSource<T: Send>: Send {
    fn name(&self) -> &str;

    /// Initialize the producer.
    ///
    /// # Errors
    ///
    /// [`SourceError::Unavailable`] when the underlying device or service
    /// cannot be opened.
    async fn start(&mut self) -> Result<(), SourceError>;

    /// Wait at most `wait` for the next signal.  `Ok(None)` means the wait
    /// elapsed with nothing to report.
    ///
    /// # Errors
    ///
    /// [`SourceError::Closed`] once the producer is exhausted.
    async fn next(&mut self, wait: Duration) -> Result<Option<T>, SourceError>;

    async fn stop(&mut self);
}

pub trait GestureSource: SignalSource<Gesture> {}
impl<S: SignalSource<Gesture> + ?Sized> GestureSource for S {}

pub trait VoiceSource: SignalSource<VoicePhrase> {}
impl<S: SignalSource<VoicePhrase> + ?Sized> VoiceSource for S {}

// ────────────────────────────────────────────────────────────────────────────
// Channel-backed producer
// ────────────────────────────────────────────────────────────────────────────

/// Producer half of a [`ChannelSource`].
#[derive(Debug)]
pub struct SignalSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for SignalSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Send> SignalSender<T> {
    /// Wait for queue space.  Returns `false` once the source is stopped.
    pub async fn send(&self, signal: T) -> bool {
        self.tx.send(signal).await.is_ok()
    }

    /// Non-blocking send.  Returns `false` when full or stopped.
    pub fn try_send(&self, signal: T) -> bool {
        self.tx.try_send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct ChannelSource<T> {
    name: String,
    rx: mpsc::Receiver<T>,
    fail_start: Option<String>,
}

impl<T: Send> ChannelSource<T> {
    /// Bounded channel pair with `capacity` slots.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (SignalSender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            SignalSender { tx },
            Self {
                name: name.into(),
                rx,
                fail_start: None,
            },
        )
    }

    /// A source whose `start` always fails with `reason`.  Stands in for a
    /// missing device.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self {
            name: name.into(),
            rx,
            fail_start: Some(reason.into()),
        }
    }
}

#[async_trait]
impl<T: Send> SignalSource<T> for ChannelSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<(), SourceError> {
        if let Some(reason) = &self.fail_start {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                reason: reason.clone(),
            });
        }
        debug!(source = %self.name, "channel source started");
        Ok(())
    }

    async fn next(&mut self, wait: Duration) -> Result<Option<T>, SourceError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(signal)) => Ok(Some(signal)),
            Ok(None) => Err(SourceError::Closed(self.name.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.rx.close();
        debug!(source = %self.name, "channel source stopped");
    }
}

pub type ChannelGestureSource = ChannelSource<Gesture>;
pub type ChannelVoiceSource = ChannelSource<VoicePhrase>;
