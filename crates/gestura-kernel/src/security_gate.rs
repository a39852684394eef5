//! [`SecurityGate`] – admission check between signal translation and the
//! executor.
//!
//! [`SecurityGate::validate`] runs three checks in order and stops at the
//! first that fails:
//!
//! 1. **Allow-list**: the command name must appear in
//!    `security.allowed_commands`.  Otherwise → `not_allowed`.  This applies
//!    regardless of the fail-closed flag.
//! 2. **Schema presence**: with `fail_closed` set, an allow-listed name that
//!    has no registered payload schema → `unknown_command_fail_closed`.
//!    With it cleared, the command is allowed without a payload check.
//! 3. **Payload**: the schema rejects missing, non-numeric or out-of-bounds
//!    fields → `invalid_payload`.
//!
//! The gate has no side effects.  Callers publish the decision and must pass
//! the payload through [`SecurityGate::redacted`] before logging it.
//!
//! # Example
//!
//! ```
//! use gestura_kernel::SecurityGate;
//! use gestura_types::config::SecurityConfig;
//! use gestura_types::{Command, CommandSource, DenyReason};
//!
//! let gate = SecurityGate::from_config(&SecurityConfig::default());
//!
//! let shutdown = Command::new("system.shutdown", CommandSource::Voice);
//! let decision = gate.validate(&shutdown);
//! assert!(!decision.allow);
//! assert_eq!(decision.reason, Some(DenyReason::NotAllowed));
//! ```

use std::collections::HashSet;

use gestura_types::config::SecurityConfig;
use gestura_types::{Command, DenyReason, Payload, PayloadValue, SecurityDecision};
use tracing::trace;

use crate::payload_schema::SchemaRegistry;

const REDACTED: &str = "<redacted>";

pub struct SecurityGate {
    allowed: HashSet<String>,
    schemas: SchemaRegistry,
    fail_closed: bool,
    redact: bool,
    sensitive_fields: HashSet<String>,
}

impl SecurityGate {
    /// Gate over the standard schema registry built from `config.bounds`.
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config, SchemaRegistry::standard(&config.bounds))
    }

    /// Gate over a caller-supplied schema registry.
    pub fn new(config: &SecurityConfig, schemas: SchemaRegistry) -> Self {
        Self {
            allowed: config
                .allowed_commands
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            schemas,
            fail_closed: config.fail_closed,
            redact: config.redact_sensitive_logs,
            sensitive_fields: config.sensitive_fields.iter().cloned().collect(),
        }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        !name.is_empty() && self.allowed.contains(name)
    }

    pub fn validate(&self, command: &Command) -> SecurityDecision {
        let name = command.name();

        if !self.is_allowed(name) {
            return SecurityDecision::deny(
                DenyReason::NotAllowed,
                format!("'{name}' is not in the allow-list"),
            );
        }

        let Some(schema) = self.schemas.get(name) else {
            if self.fail_closed {
                return SecurityDecision::deny(
                    DenyReason::UnknownCommandFailClosed,
                    format!("no payload schema registered for '{name}'"),
                );
            }
            trace!(command = name, "allowed without schema (fail_closed=false)");
            return SecurityDecision::allow();
        };

        match schema.check(command.payload()) {
            Ok(()) => SecurityDecision::allow(),
            Err(detail) => SecurityDecision::deny(DenyReason::InvalidPayload, detail),
        }
    }

    /// Copy of the command payload with sensitive fields masked, for logging.
    pub fn redacted(&self, command: &Command) -> Payload {
        self.redact_payload(command.payload())
    }

    pub fn redact_payload(&self, payload: &Payload) -> Payload {
        if !self.redact || self.sensitive_fields.is_empty() {
            return payload.clone();
        }
        payload
            .iter()
            .map(|(k, v)| {
                if self.sensitive_fields.contains(k) {
                    (k.clone(), PayloadValue::from(REDACTED))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }

    /// Whether `field` is masked in logs.
    pub fn is_sensitive(&self, field: &str) -> bool {
        self.redact && self.sensitive_fields.contains(field)
    }
}
