//! Hand-landmark interpretation.
//!
//! [`GestureInterpreter`] turns one frame of hand landmarks (normalized image
//! coordinates, as produced by common hand trackers) into zero or more
//! discrete [`Gesture`]s.  It is pure apart from its own debounce state and
//! takes the frame time explicitly, so it behaves identically under replay.
//!
//! | Gesture        | Condition                                                     |
//! |----------------|---------------------------------------------------------------|
//! | `Point`        | index tip, mirrored if configured, smoothed; only on change   |
//! | `Click`        | index/thumb pinch `< click_distance`, debounced 150 ms        |
//! | `DoubleClick`  | a click within `double_click_window` of the previous click    |
//! | `RightClick`   | middle/thumb pinch `< right_click_distance`, debounced 500 ms |
//! | `Scroll{Up}`   | `index_tip.y - wrist.y < -scroll_threshold`                   |
//! | `Scroll{Down}` | `index_tip.y - wrist.y > scroll_threshold`                    |
//!
//! The pointer filter is an exponential moving average with a per-axis
//! deadzone:
//! ```text
//! d      = sample − last          (zeroed per axis when |d| ≤ deadzone)
//! last' = last + α · d
//! ```

use std::time::{Duration, Instant};

use gestura_types::config::GestureConfig;
use gestura_types::{Gesture, ScrollDirection};
use serde::{Deserialize, Serialize};

const CLICK_DEBOUNCE: Duration = Duration::from_millis(150);
const RIGHT_CLICK_DEBOUNCE: Duration = Duration::from_millis(500);

// ────────────────────────────────────────────────────────────────────────────
// Input types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance; depth is ignored.
    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// The subset of hand landmarks the interpreter needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub thumb_tip: Landmark,
    pub index_tip: Landmark,
    pub index_pip: Landmark,
    pub middle_tip: Landmark,
    pub middle_pip: Landmark,
    pub ring_tip: Landmark,
    pub ring_pip: Landmark,
    pub pinky_tip: Landmark,
    pub pinky_pip: Landmark,
    pub wrist: Landmark,
}

impl HandLandmarks {
    /// Three or more of the four fingers folded (tip below its PIP joint).
    pub fn is_fist(&self) -> bool {
        [
            (self.index_tip, self.index_pip),
            (self.middle_tip, self.middle_pip),
            (self.ring_tip, self.ring_pip),
            (self.pinky_tip, self.pinky_pip),
        ]
        .iter()
        .filter(|(tip, pip)| tip.y > pip.y)
        .count()
            >= 3
    }
}

/// Raw measurements from the most recent frame with a hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandReading {
    pub click_distance: f64,
    pub right_click_distance: f64,
    pub vertical: f64,
    pub fist: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// PointerSmoother
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PointerSmoother {
    alpha: f64,
    deadzone: f64,
    last: Option<(f64, f64)>,
}

impl PointerSmoother {
    pub fn new(alpha: f64, deadzone: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            deadzone: deadzone.max(0.0),
            last: None,
        }
    }

    /// Feed one sample; returns the filtered position.  The first sample
    /// passes through unchanged.
    pub fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        let next = match self.last {
            None => (x, y),
            Some((lx, ly)) => {
                let dx = if (x - lx).abs() <= self.deadzone { 0.0 } else { x - lx };
                let dy = if (y - ly).abs() <= self.deadzone { 0.0 } else { y - ly };
                (lx + dx * self.alpha, ly + dy * self.alpha)
            }
        };
        self.last = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GestureInterpreter
// ────────────────────────────────────────────────────────────────────────────

pub struct GestureInterpreter {
    config: GestureConfig,
    smoother: PointerSmoother,
    last_pointer: Option<(f64, f64)>,
    last_click: Option<Instant>,
    last_right_click: Option<Instant>,
    last_reading: Option<HandReading>,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            smoother: PointerSmoother::new(config.smoothing_alpha, config.deadzone),
            config,
            last_pointer: None,
            last_click: None,
            last_right_click: None,
            last_reading: None,
        }
    }

    pub fn last_reading(&self) -> Option<HandReading> {
        self.last_reading
    }

    /// Interpret a frame captured now.
    pub fn process(&mut self, hand: Option<&HandLandmarks>) -> Vec<Gesture> {
        self.interpret(hand, Instant::now())
    }

    /// Interpret a frame captured at `at`.
    pub fn interpret(&mut self, hand: Option<&HandLandmarks>, at: Instant) -> Vec<Gesture> {
        let Some(hand) = hand else {
            self.last_reading = None;
            return Vec::new();
        };

        let mut gestures = Vec::with_capacity(2);

        let raw_x = if self.config.mirrored {
            1.0 - hand.index_tip.x
        } else {
            hand.index_tip.x
        };
        let (x, y) = self.smoother.apply(raw_x, hand.index_tip.y);
        let pointer = (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0));
        if self.last_pointer != Some(pointer) {
            self.last_pointer = Some(pointer);
            gestures.push(Gesture::Point {
                x: pointer.0,
                y: pointer.1,
            });
        }

        let reading = HandReading {
            click_distance: hand.index_tip.distance(&hand.thumb_tip),
            right_click_distance: hand.middle_tip.distance(&hand.thumb_tip),
            vertical: hand.index_tip.y - hand.wrist.y,
            fist: hand.is_fist(),
        };
        self.last_reading = Some(reading);

        if reading.click_distance < self.config.click_distance {
            let since = self.last_click.map(|t| at.saturating_duration_since(t));
            if since.is_none_or(|d| d > CLICK_DEBOUNCE) {
                let window = Duration::from_millis(self.config.double_click_window_ms);
                if since.is_some_and(|d| d < window) {
                    gestures.push(Gesture::DoubleClick);
                } else {
                    gestures.push(Gesture::Click);
                }
                self.last_click = Some(at);
            }
        }

        if reading.right_click_distance < self.config.right_click_distance {
            let since = self.last_right_click.map(|t| at.saturating_duration_since(t));
            if since.is_none_or(|d| d > RIGHT_CLICK_DEBOUNCE) {
                gestures.push(Gesture::RightClick);
                self.last_right_click = Some(at);
            }
        }

        if reading.vertical < -self.config.scroll_threshold {
            gestures.push(Gesture::Scroll {
                direction: ScrollDirection::Up,
            });
        } else if reading.vertical > self.config.scroll_threshold {
            gestures.push(Gesture::Scroll {
                direction: ScrollDirection::Down,
            });
        }

        gestures
    }
}
