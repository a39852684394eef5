//! Event-stream logger.
//!
//! [`EventLogger`] subscribes to every event and writes one `tracing` record
//! per event.  The level follows the kind:
//!
//! | Kind | Level |
//! |---|---|
//! | `error`, `auth.failure` | error |
//! | `warning`, `command.denied`, `command.failed`, `integration.unavailable` | warn |
//! | `heartbeat`, `gesture.frame`, `voice.command` | debug |
//! | everything else | info |
//!
//! Configured sensitive fields are masked at any depth of the payload before
//! the record is written.

use std::collections::{BTreeMap, HashSet};

use gestura_middleware::{EventBus, EventFilter, SubscriptionId};
use gestura_types::config::SecurityConfig;
use gestura_types::{Event, EventKind};
use serde_json::Value;
use tracing::{debug, error, info, warn};

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Default)]
pub struct EventLogger {
    sensitive: HashSet<String>,
}

impl EventLogger {
    pub fn new(config: &SecurityConfig) -> Self {
        let sensitive = if config.redact_sensitive_logs {
            config.sensitive_fields.iter().cloned().collect()
        } else {
            HashSet::new()
        };
        Self { sensitive }
    }

    /// Start logging every event published on `bus`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(self, bus: &EventBus) -> SubscriptionId {
        bus.subscribe(EventFilter::All, move |event| self.log(&event))
    }

    fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let v = if self.sensitive.contains(k) {
                            Value::from(REDACTED)
                        } else {
                            self.redact_value(v)
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }

    /// The payload as it will be logged.
    pub fn redacted(&self, payload: &BTreeMap<String, Value>) -> Value {
        let map = payload
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        self.redact_value(&Value::Object(map))
    }

    pub fn log(&self, event: &Event) {
        let payload = self.redacted(&event.payload);
        let kind = event.kind.as_str();
        let correlation = event.correlation_id.map(|id| id.to_string()).unwrap_or_default();

        match event.kind {
            EventKind::Error | EventKind::AuthFailure => {
                error!(kind, source = %event.source, correlation = %correlation, %payload, "event")
            }
            EventKind::Warning
            | EventKind::CommandDenied
            | EventKind::CommandFailed
            | EventKind::IntegrationUnavailable => {
                warn!(kind, source = %event.source, correlation = %correlation, %payload, "event")
            }
            EventKind::Heartbeat | EventKind::GestureFrame | EventKind::VoiceCommand => {
                debug!(kind, source = %event.source, correlation = %correlation, %payload, "event")
            }
            _ => info!(kind, source = %event.source, correlation = %correlation, %payload, "event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logger(fields: &[&str], enabled: bool) -> EventLogger {
        let config = SecurityConfig {
            redact_sensitive_logs: enabled,
            sensitive_fields: fields.iter().map(|s| s.to_string()).collect(),
            ..SecurityConfig::default()
        };
        EventLogger::new(&config)
    }

    #[test]
    fn masks_sensitive_fields_at_any_depth() {
        let event = Event::new(EventKind::CommandAllowed, "test")
            .with("token", "abc")
            .with("payload", json!({"token": "xyz", "x": 0.5}));
        let logged = logger(&["token"], true).redacted(&event.payload);
        assert_eq!(logged["token"], REDACTED);
        assert_eq!(logged["payload"]["token"], REDACTED);
        assert_eq!(logged["payload"]["x"], 0.5);
        // The event itself is untouched.
        assert_eq!(event.payload["token"], "abc");
    }

    #[test]
    fn redaction_can_be_disabled() {
        let event = Event::new(EventKind::Warning, "test").with("token", "abc");
        let logged = logger(&["token"], false).redacted(&event.payload);
        assert_eq!(logged["token"], "abc");
    }

    #[tokio::test]
    async fn attached_logger_consumes_events() {
        let bus = EventBus::new(8);
        let _id = logger(&[], true).attach(&bus);
        bus.start();
        assert_eq!(bus.publish(Event::new(EventKind::Startup, "test")), 1);
        assert_eq!(bus.publish(Event::new(EventKind::Error, "test")), 1);
        bus.stop().await;
        assert_eq!(bus.dropped_events(), 0);
    }
}
