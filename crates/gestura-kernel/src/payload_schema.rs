//! [`SchemaRegistry`] – payload shape rules keyed by command name.
//!
//! A [`PayloadSchema`] is an ordered list of [`FieldRule`]s.  Each rule names
//! a required numeric field and its inclusive bounds.  Checking stops at the
//! first violated rule.  Fields not named by any rule are ignored, so newer
//! producers may attach extra data without being rejected.
//!
//! The standard registry covers every [`CommandKind`]: `mouse.move` needs
//! `x` and `y` within the pointer bounds, the scroll commands need `amount`
//! within the scroll bounds, and the rest take an empty payload.
//!
//! # Example
//!
//! ```
//! use gestura_kernel::payload_schema::SchemaRegistry;
//! use gestura_types::config::PayloadBounds;
//! use gestura_types::{Command, CommandKind, CommandSource};
//!
//! let registry = SchemaRegistry::standard(&PayloadBounds::default());
//! let schema = registry.get("mouse.move").unwrap();
//!
//! let ok = Command::of(CommandKind::MouseMove, CommandSource::Gesture)
//!     .with_field("x", 0.5)
//!     .with_field("y", 0.5);
//! assert!(schema.check(ok.payload()).is_ok());
//!
//! let off_screen = Command::of(CommandKind::MouseMove, CommandSource::Gesture)
//!     .with_field("x", 1.5)
//!     .with_field("y", 0.5);
//! assert!(schema.check(off_screen.payload()).is_err());
//! ```

use std::collections::HashMap;

use gestura_types::config::PayloadBounds;
use gestura_types::{CommandKind, Payload, PayloadValue};

// ────────────────────────────────────────────────────────────────────────────
// FieldRule
// ────────────────────────────────────────────────────────────────────────────

/// A required numeric field with inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }

    /// `Err` carries a diagnostic naming the field.
    pub fn check(&self, payload: &Payload) -> Result<(), String> {
        let value = match payload.get(&self.field) {
            None => return Err(format!("missing field '{}'", self.field)),
            Some(PayloadValue::Text(_)) => {
                return Err(format!("field '{}' must be numeric", self.field));
            }
            Some(PayloadValue::Number(n)) => *n,
        };
        // NaN fails both comparisons, so test containment rather than exclusion.
        if (self.min..=self.max).contains(&value) {
            Ok(())
        } else {
            Err(format!(
                "field '{}'={value} outside [{}, {}]",
                self.field, self.min, self.max
            ))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PayloadSchema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadSchema {
    rules: Vec<FieldRule>,
}

impl PayloadSchema {
    /// Schema accepting any payload (commands that take no arguments).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Evaluate every rule in order; the first violation is returned.
    pub fn check(&self, payload: &Payload) -> Result<(), String> {
        for rule in &self.rules {
            rule.check(payload)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SchemaRegistry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, PayloadSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One schema per [`CommandKind`], using `bounds`.
    pub fn standard(bounds: &PayloadBounds) -> Self {
        let mut registry = Self::new();
        for kind in CommandKind::ALL {
            let schema = match kind {
                CommandKind::MouseMove => PayloadSchema::empty()
                    .with_rule(FieldRule::new("x", bounds.pointer_min, bounds.pointer_max))
                    .with_rule(FieldRule::new("y", bounds.pointer_min, bounds.pointer_max)),
                CommandKind::ScrollUp | CommandKind::ScrollDown => PayloadSchema::empty()
                    .with_rule(FieldRule::new("amount", bounds.scroll_min, bounds.scroll_max)),
                CommandKind::ClickLeft
                | CommandKind::ClickRight
                | CommandKind::DoubleClick
                | CommandKind::VolumeUp
                | CommandKind::VolumeDown
                | CommandKind::MuteToggle
                | CommandKind::Lock => PayloadSchema::empty(),
            };
            registry.register(kind.name(), schema);
        }
        registry
    }

    /// Register (or replace) the schema for `name`.
    pub fn register(&mut self, name: impl Into<String>, schema: PayloadSchema) {
        self.schemas.insert(name.into(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&PayloadSchema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(fields: &[(&str, PayloadValue)]) -> Payload {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn bounds_are_inclusive() {
        let rule = FieldRule::new("x", 0.0, 1.0);
        assert!(rule.check(&payload(&[("x", 0.0.into())])).is_ok());
        assert!(rule.check(&payload(&[("x", 1.0.into())])).is_ok());
        assert!(rule.check(&payload(&[("x", 1.0001.into())])).is_err());
        assert!(rule.check(&payload(&[("x", (-0.1).into())])).is_err());
    }

    #[test]
    fn nan_and_infinity_are_rejected() {
        let rule = FieldRule::new("x", 0.0, 1.0);
        assert!(rule.check(&payload(&[("x", f64::NAN.into())])).is_err());
        assert!(rule.check(&payload(&[("x", f64::INFINITY.into())])).is_err());
    }

    #[test]
    fn missing_and_text_fields_are_rejected() {
        let rule = FieldRule::new("amount", 1.0, 15.0);
        let err = rule.check(&Payload::new()).unwrap_err();
        assert!(err.contains("missing"));
        let err = rule.check(&payload(&[("amount", "lots".into())])).unwrap_err();
        assert!(err.contains("numeric"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let schema = PayloadSchema::empty().with_rule(FieldRule::new("x", 0.0, 1.0));
        let p = payload(&[("x", 0.3.into()), ("pressure", 42.0.into())]);
        assert!(schema.check(&p).is_ok());
    }

    #[test]
    fn first_violation_is_reported() {
        let schema = PayloadSchema::empty()
            .with_rule(FieldRule::new("x", 0.0, 1.0))
            .with_rule(FieldRule::new("y", 0.0, 1.0));
        let err = schema.check(&payload(&[("x", 2.0.into())])).unwrap_err();
        assert!(err.contains("'x'"));
    }

    #[test]
    fn standard_registry_covers_every_kind() {
        let registry = SchemaRegistry::standard(&PayloadBounds::default());
        assert_eq!(registry.len(), CommandKind::ALL.len());
        for kind in CommandKind::ALL {
            assert!(registry.get(kind.name()).is_some(), "{kind} has no schema");
        }
        assert!(registry.get("system.shutdown").is_none());
        assert!(registry.get("system.lock").unwrap().rules().is_empty());
    }

    #[test]
    fn standard_registry_uses_configured_scroll_bounds() {
        let bounds = PayloadBounds {
            scroll_min: 0.0,
            scroll_max: 1.0,
            ..PayloadBounds::default()
        };
        let registry = SchemaRegistry::standard(&bounds);
        let schema = registry.get("mouse.scroll.up").unwrap();
        assert!(schema.check(&payload(&[("amount", 5.0.into())])).is_err());
        assert!(schema.check(&payload(&[("amount", 0.5.into())])).is_ok());
    }
}
