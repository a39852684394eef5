//! Scripted signal replay.
//!
//! A replay script is a JSON-lines file; each line is one record with an
//! offset in milliseconds from the start of the replay:
//!
//! ```text
//! {"at_ms": 0,    "gesture": "point", "x": 0.5, "y": 0.5}
//! {"at_ms": 120,  "gesture": "click"}
//! {"at_ms": 200,  "hand": {"thumb_tip": {"x": 0.4, "y": 0.5}, ...}}
//! {"at_ms": 900,  "hand": null}
//! {"at_ms": 1500, "voice": "volume up"}
//! {"at_ms": 1800, "voice": {"text": "lock computer", "confidence": 0.9}}
//! ```
//!
//! `hand` records are run through a [`GestureInterpreter`] at their scripted
//! time, so debounce windows behave as they would live.  Blank lines and
//! lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use gestura_types::{Gesture, VoicePhrase};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::gesture::{GestureInterpreter, HandLandmarks};
use crate::source::{SignalSender, SourceError};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayItem {
    Gesture(Gesture),
    Hand(Option<HandLandmarks>),
    Voice(VoicePhrase),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    pub at: Duration,
    pub item: ReplayItem,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    entries: Vec<ReplayEntry>,
}

fn parse_error(line: usize, reason: impl ToString) -> SourceError {
    SourceError::Parse {
        line,
        reason: reason.to_string(),
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<ReplayEntry, SourceError> {
    let value: Value = serde_json::from_str(line).map_err(|e| parse_error(line_no, e))?;
    let at_ms = value
        .get("at_ms")
        .and_then(Value::as_u64)
        .ok_or_else(|| parse_error(line_no, "missing non-negative integer 'at_ms'"))?;

    let item = if value.get("gesture").is_some() {
        let gesture: Gesture =
            serde_json::from_value(value).map_err(|e| parse_error(line_no, e))?;
        ReplayItem::Gesture(gesture)
    } else if let Some(hand) = value.get("hand") {
        let hand: Option<HandLandmarks> =
            serde_json::from_value(hand.clone()).map_err(|e| parse_error(line_no, e))?;
        ReplayItem::Hand(hand)
    } else if let Some(voice) = value.get("voice") {
        let phrase = match voice {
            Value::String(text) => VoicePhrase::new(text.clone()),
            other => serde_json::from_value(other.clone()).map_err(|e| parse_error(line_no, e))?,
        };
        ReplayItem::Voice(phrase)
    } else {
        return Err(parse_error(
            line_no,
            "record needs one of 'gesture', 'hand' or 'voice'",
        ));
    };

    Ok(ReplayEntry {
        at: Duration::from_millis(at_ms),
        item,
    })
}

impl ReplayScript {
    /// Parse a script.  Entries are ordered by offset; ties keep file order.
    ///
    /// # Errors
    ///
    /// [`SourceError::Parse`] naming the first bad line (1-based).
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(parse_line(idx + 1, line)?);
        }
        entries.sort_by_key(|e| e.at);
        Ok(Self { entries })
    }

    /// # Errors
    ///
    /// [`SourceError::Io`] when the file cannot be read, or a parse error.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn entries(&self) -> &[ReplayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Feed the script into the given senders at its offsets.
    ///
    /// The task ends after the last entry (dropping the senders, which closes
    /// the sources) or as soon as a source stops accepting signals.
    pub fn spawn(
        self,
        gestures: SignalSender<Gesture>,
        voice: SignalSender<VoicePhrase>,
        mut interpreter: GestureInterpreter,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now();
            let total = self.entries.len();
            for entry in self.entries {
                tokio::time::sleep_until(start + entry.at).await;
                let delivered = match entry.item {
                    ReplayItem::Gesture(g) => gestures.send(g).await,
                    ReplayItem::Voice(v) => voice.send(v).await,
                    ReplayItem::Hand(hand) => {
                        let at = (start + entry.at).into_std();
                        let mut ok = true;
                        for g in interpreter.interpret(hand.as_ref(), at) {
                            ok &= gestures.send(g).await;
                        }
                        ok
                    }
                };
                if !delivered {
                    debug!("replay target closed; stopping replay");
                    return;
                }
            }
            info!(entries = total, "replay finished");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChannelGestureSource, ChannelVoiceSource, SignalSource};
    use gestura_types::config::GestureConfig;
    use gestura_types::ScrollDirection;

    const SCRIPT: &str = r#"
# comment
{"at_ms": 30, "voice": "volume up"}
{"at_ms": 0, "gesture": "point", "x": 0.5, "y": 0.25}
{"at_ms": 10, "gesture": "scroll", "direction": "down"}
{"at_ms": 20, "gesture": "click"}
{"at_ms": 40, "voice": {"text": "mute", "confidence": 0.4}}
{"at_ms": 50, "hand": null}
"#;

    #[test]
    fn parses_and_orders_records() {
        let script = ReplayScript::parse(SCRIPT).unwrap();
        assert_eq!(script.len(), 6);
        let items: Vec<_> = script.entries().iter().map(|e| e.item.clone()).collect();
        assert_eq!(
            items,
            vec![
                ReplayItem::Gesture(Gesture::Point { x: 0.5, y: 0.25 }),
                ReplayItem::Gesture(Gesture::Scroll {
                    direction: ScrollDirection::Down
                }),
                ReplayItem::Gesture(Gesture::Click),
                ReplayItem::Voice(VoicePhrase::new("volume up")),
                ReplayItem::Voice(VoicePhrase {
                    text: "mute".into(),
                    confidence: 0.4
                }),
                ReplayItem::Hand(None),
            ]
        );
    }

    #[test]
    fn bad_line_reports_line_number() {
        let err = ReplayScript::parse("{\"at_ms\": 0, \"gesture\": \"click\"}\n{\"at_ms\": 1}")
            .unwrap_err();
        match err {
            SourceError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected: {other}"),
        }
        assert!(ReplayScript::parse("{\"gesture\": \"click\"}").is_err());
        assert!(ReplayScript::parse("not json").is_err());
    }

    #[test]
    fn load_reads_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.jsonl");
        std::fs::write(&path, SCRIPT)?;
        assert_eq!(ReplayScript::load(&path)?.len(), 6);
        assert!(ReplayScript::load(&dir.path().join("missing.jsonl")).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn spawn_feeds_both_sources() {
        let script = ReplayScript::parse(SCRIPT).unwrap();
        let (gtx, mut gestures) = ChannelGestureSource::channel("gesture", 16);
        let (vtx, mut voice) = ChannelVoiceSource::channel("voice", 16);
        let handle = script.spawn(gtx, vtx, GestureInterpreter::new(GestureConfig::default()));
        handle.await.unwrap();

        let wait = Duration::from_millis(10);
        let mut got = Vec::new();
        while let Ok(Some(g)) = gestures.next(wait).await {
            got.push(g);
        }
        assert_eq!(got.len(), 3);
        assert_eq!(got[2], Gesture::Click);

        assert_eq!(voice.next(wait).await.unwrap().unwrap().text, "volume up");
        assert_eq!(voice.next(wait).await.unwrap().unwrap().text, "mute");
        assert!(matches!(voice.next(wait).await, Err(SourceError::Closed(_))));
    }
}
