//! Per-field input constraints
//!
//! A static table checked on every keystroke, independent of rule
//! evaluation. Violations become `InputError`s and never block rules.

use crate::types::{fields, CircuitRecord, FieldValue, InputError};
use serde::Serialize;

/// Declared domain of a field
#[derive(Debug, Clone, Copy)]
pub enum FieldConstraint {
    /// Numeric range; `min_exclusive` rejects the lower bound itself
    Range {
        min: f64,
        max: f64,
        min_exclusive: bool,
        unit: &'static str,
    },
    /// Enumerated set, compared case-insensitively on the text form
    OneOf(&'static [&'static str]),
}

const DEVICE_TYPES: &[&str] = &["B", "C", "D", "K", "Z", "gG", "gL"];

const fn positive(max: f64, unit: &'static str) -> FieldConstraint {
    FieldConstraint::Range {
        min: 0.0,
        max,
        min_exclusive: true,
        unit,
    }
}

const CONSTRAINTS: &[(&str, FieldConstraint)] = &[
    (fields::VOLTAGE, positive(1000.0, "V")),
    (fields::CURRENT, positive(630.0, "A")),
    (
        fields::CABLE_GAUGE,
        FieldConstraint::Range {
            min: 0.5,
            max: 300.0,
            min_exclusive: false,
            unit: "mm²",
        },
    ),
    (fields::DISTANCE, positive(1000.0, "m")),
    (fields::PROTECTION_CURRENT, positive(630.0, "A")),
    (fields::UPSTREAM_PROTECTION_CURRENT, positive(630.0, "A")),
    (fields::LOOP_IMPEDANCE, positive(100.0, "Ω")),
    (fields::POWER_FACTOR, positive(1.0, "")),
    (fields::PHASES_COUNT, FieldConstraint::OneOf(&["1", "3"])),
    (fields::PROTECTION_DEVICE_TYPE, FieldConstraint::OneOf(DEVICE_TYPES)),
    (
        fields::UPSTREAM_PROTECTION_DEVICE_TYPE,
        FieldConstraint::OneOf(DEVICE_TYPES),
    ),
];

/// Constraint declared for `field`, if any
pub fn constraint_for(field: &str) -> Option<FieldConstraint> {
    CONSTRAINTS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, c)| *c)
}

/// Result of a single-field check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InputCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(msg: String) -> Self {
        Self {
            valid: false,
            error: Some(msg),
        }
    }
}

/// Check one value against the constraint table
///
/// Unconstrained fields and blank values are always valid.
pub fn validate_input_value(field: &str, value: &FieldValue) -> InputCheck {
    let Some(constraint) = constraint_for(field) else {
        return InputCheck::ok();
    };
    if !value.is_present() {
        return InputCheck::ok();
    }

    match constraint {
        FieldConstraint::Range {
            min,
            max,
            min_exclusive,
            unit,
        } => {
            let Some(n) = value.as_f64() else {
                return InputCheck::invalid(format!("{} must be a number", field));
            };
            let below = if min_exclusive { n <= min } else { n < min };
            if below || n > max {
                let lower = if min_exclusive { "(" } else { "[" };
                InputCheck::invalid(format!(
                    "{} = {} outside {}{}, {}] {}",
                    field, n, lower, min, max, unit
                ))
            } else {
                InputCheck::ok()
            }
        },
        FieldConstraint::OneOf(choices) => {
            // canonical() folds "3" and 3.0 to the same text
            let text = value.canonical().unwrap_or_default();
            if choices.iter().any(|c| c.eq_ignore_ascii_case(&text)) {
                InputCheck::ok()
            } else {
                InputCheck::invalid(format!(
                    "{} = {} not one of [{}]",
                    field,
                    text,
                    choices.join(", ")
                ))
            }
        },
    }
}

/// Check every present field of a record
pub fn validate_record(data: &CircuitRecord) -> Vec<InputError> {
    data.fields
        .iter()
        .filter_map(|(field, value)| {
            let check = validate_input_value(field, value);
            check.error.map(|message| InputError {
                field: field.clone(),
                value: value.clone(),
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert!(validate_input_value(fields::VOLTAGE, &FieldValue::from(230.0)).valid);
        assert!(!validate_input_value(fields::VOLTAGE, &FieldValue::from(0.0)).valid);
        assert!(!validate_input_value(fields::VOLTAGE, &FieldValue::from(1200.0)).valid);
        assert!(validate_input_value(fields::CABLE_GAUGE, &FieldValue::from(0.5)).valid);
    }

    #[test]
    fn test_numeric_text_accepted() {
        assert!(validate_input_value(fields::CABLE_GAUGE, &FieldValue::from("2,5")).valid);
        let check = validate_input_value(fields::CURRENT, &FieldValue::from("abc"));
        assert_eq!(check.error.as_deref(), Some("current must be a number"));
    }

    #[test]
    fn test_enumerations() {
        assert!(validate_input_value(fields::PHASES_COUNT, &FieldValue::from(3)).valid);
        assert!(validate_input_value(fields::PHASES_COUNT, &FieldValue::from("1")).valid);
        assert!(!validate_input_value(fields::PHASES_COUNT, &FieldValue::from(2)).valid);
        assert!(validate_input_value(fields::PROTECTION_DEVICE_TYPE, &FieldValue::from("gg")).valid);
        assert!(!validate_input_value(fields::PROTECTION_DEVICE_TYPE, &FieldValue::from("X")).valid);
    }

    #[test]
    fn test_unconstrained_and_blank_fields() {
        assert!(validate_input_value("notes", &FieldValue::from("anything")).valid);
        assert!(validate_input_value(fields::CURRENT, &FieldValue::from("")).valid);
        assert!(validate_input_value(fields::CURRENT, &FieldValue::Null).valid);
    }

    #[test]
    fn test_validate_record_collects_all() {
        let record = CircuitRecord::new("SK-1")
            .with(fields::CURRENT, -5.0)
            .with(fields::PHASES_COUNT, 2)
            .with(fields::VOLTAGE, 230);
        let errors = validate_record(&record);
        let names: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(names, vec![fields::CURRENT, fields::PHASES_COUNT]);
    }
}
