//! Signal → [`Command`] translation.
//!
//! Every gesture maps to exactly one command.  A voice phrase maps to at
//! most one: it is trimmed and lower-cased, then matched against
//! [`VOICE_COMMANDS`] in order, and the first key contained in the phrase
//! wins ("please turn the volume up" → `system.volume.up`).
//!
//! Scroll commands, from either source, carry `amount = workers.scroll_step`.

use gestura_types::config::RuntimeConfig;
use gestura_types::{Command, CommandKind, CommandSource, Gesture, ScrollDirection, VoicePhrase};
use thiserror::Error;

/// Voice phrase table, matched in order by substring.
pub const VOICE_COMMANDS: &[(&str, CommandKind)] = &[
    ("volume up", CommandKind::VolumeUp),
    ("volume down", CommandKind::VolumeDown),
    ("mute", CommandKind::MuteToggle),
    ("left click", CommandKind::ClickLeft),
    ("right click", CommandKind::ClickRight),
    ("double click", CommandKind::DoubleClick),
    ("scroll up", CommandKind::ScrollUp),
    ("scroll down", CommandKind::ScrollDown),
    ("lock computer", CommandKind::Lock),
];

/// Why a voice phrase produced no command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unrecognized {
    #[error("confidence {confidence:.2} below {minimum:.2}")]
    LowConfidence { confidence: f32, minimum: f32 },
    #[error("no command matches phrase")]
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct SignalTranslator {
    scroll_step: f64,
    min_confidence: f32,
}

impl SignalTranslator {
    pub fn new(scroll_step: f64, min_confidence: f32) -> Self {
        Self {
            scroll_step,
            min_confidence,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.workers.scroll_step, config.voice.min_confidence)
    }

    fn command(&self, kind: CommandKind, source: CommandSource) -> Command {
        let command = Command::of(kind, source);
        match kind {
            CommandKind::ScrollUp | CommandKind::ScrollDown => {
                command.with_field("amount", self.scroll_step)
            }
            _ => command,
        }
    }

    pub fn gesture(&self, gesture: &Gesture) -> Command {
        let source = CommandSource::Gesture;
        match *gesture {
            Gesture::Point { x, y } => Command::of(CommandKind::MouseMove, source)
                .with_field("x", x)
                .with_field("y", y),
            Gesture::Click => self.command(CommandKind::ClickLeft, source),
            Gesture::DoubleClick => self.command(CommandKind::DoubleClick, source),
            Gesture::RightClick => self.command(CommandKind::ClickRight, source),
            Gesture::Scroll {
                direction: ScrollDirection::Up,
            } => self.command(CommandKind::ScrollUp, source),
            Gesture::Scroll {
                direction: ScrollDirection::Down,
            } => self.command(CommandKind::ScrollDown, source),
        }
    }

    pub fn voice(&self, phrase: &VoicePhrase) -> Result<Command, Unrecognized> {
        if phrase.confidence < self.min_confidence {
            return Err(Unrecognized::LowConfidence {
                confidence: phrase.confidence,
                minimum: self.min_confidence,
            });
        }
        let text = phrase.text.trim().to_lowercase();
        VOICE_COMMANDS
            .iter()
            .find(|(key, _)| text.contains(key))
            .map(|(_, kind)| self.command(*kind, CommandSource::Voice))
            .ok_or(Unrecognized::NoMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> SignalTranslator {
        SignalTranslator::new(3.0, 0.5)
    }

    #[test]
    fn point_becomes_mouse_move() {
        let cmd = translator().gesture(&Gesture::Point { x: 0.2, y: 0.8 });
        assert_eq!(cmd.kind(), Some(CommandKind::MouseMove));
        assert_eq!(cmd.number("x"), Some(0.2));
        assert_eq!(cmd.number("y"), Some(0.8));
        assert_eq!(cmd.source(), CommandSource::Gesture);
    }

    #[test]
    fn every_gesture_maps_to_one_command() {
        let t = translator();
        let cases = [
            (Gesture::Click, CommandKind::ClickLeft),
            (Gesture::DoubleClick, CommandKind::DoubleClick),
            (Gesture::RightClick, CommandKind::ClickRight),
            (
                Gesture::Scroll {
                    direction: ScrollDirection::Up,
                },
                CommandKind::ScrollUp,
            ),
            (
                Gesture::Scroll {
                    direction: ScrollDirection::Down,
                },
                CommandKind::ScrollDown,
            ),
        ];
        for (gesture, kind) in cases {
            assert_eq!(t.gesture(&gesture).kind(), Some(kind));
        }
        let scroll = t.gesture(&Gesture::Scroll {
            direction: ScrollDirection::Down,
        });
        assert_eq!(scroll.number("amount"), Some(3.0));
    }

    #[test]
    fn voice_matches_by_substring_case_insensitive() {
        let t = translator();
        let cmd = t.voice(&VoicePhrase::new("  Please turn the VOLUME UP ")).unwrap();
        assert_eq!(cmd.kind(), Some(CommandKind::VolumeUp));
        assert_eq!(cmd.source(), CommandSource::Voice);

        let cmd = t.voice(&VoicePhrase::new("scroll up a bit")).unwrap();
        assert_eq!(cmd.number("amount"), Some(3.0));

        let cmd = t.voice(&VoicePhrase::new("lock computer now")).unwrap();
        assert_eq!(cmd.kind(), Some(CommandKind::Lock));
    }

    #[test]
    fn table_order_breaks_ties() {
        // Contains both "mute" and "left click"; "mute" comes first.
        let cmd = translator()
            .voice(&VoicePhrase::new("mute then left click"))
            .unwrap();
        assert_eq!(cmd.kind(), Some(CommandKind::MuteToggle));
    }

    #[test]
    fn unmatched_and_quiet_phrases_are_rejected() {
        let t = translator();
        assert_eq!(
            t.voice(&VoicePhrase::new("open the pod bay doors")).unwrap_err(),
            Unrecognized::NoMatch
        );
        let quiet = VoicePhrase {
            text: "volume up".into(),
            confidence: 0.2,
        };
        assert!(matches!(
            t.voice(&quiet),
            Err(Unrecognized::LowConfidence { .. })
        ));
    }
}
