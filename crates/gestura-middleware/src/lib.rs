//! `gestura-middleware` – The Nervous System
//!
//! Carries lifecycle and command-decision [`Event`][gestura_types::Event]s
//! from their publishers to any number of subscribers (the event logger, the
//! metrics collector, tests) without letting a slow consumer stall the
//! command pipeline.
//!
//! # Modules
//!
//! - [`bus`] – in-process publish/subscribe bus with one bounded Tokio queue
//!   per subscriber and synchronous publish taps.

pub mod bus;

pub use bus::{EventBus, EventFilter, EventReceiver, EventTap, SubscriptionId};
