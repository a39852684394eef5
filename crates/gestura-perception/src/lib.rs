//! `gestura-perception` – Signal producers.
//!
//! Turns what the sensors see and hear into [`Signal`][gestura_types::Signal]
//! values the runtime can translate into commands.  Recognition engines
//! themselves live outside this crate; they plug in behind the producer
//! traits.
//!
//! # Modules
//!
//! - [`gesture`] – [`GestureInterpreter`][gesture::GestureInterpreter]: hand
//!   landmarks → discrete gestures (pointer, clicks, scroll).
//! - [`source`] – the [`SignalSource`][source::SignalSource] producer trait
//!   and bounded-channel producers.
//! - [`replay`] – [`ReplayScript`][replay::ReplayScript]: feeds a recorded
//!   JSON-lines session into channel producers.

pub mod gesture;
pub mod replay;
pub mod source;

pub use gesture::{GestureInterpreter, HandLandmarks, HandReading, Landmark, PointerSmoother};
pub use replay::{ReplayEntry, ReplayItem, ReplayScript};
pub use source::{
    ChannelGestureSource, ChannelSource, ChannelVoiceSource, GestureSource, SignalSender,
    SignalSource, SourceError, VoiceSource,
};
