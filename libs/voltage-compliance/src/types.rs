//! Compliance data model
//!
//! Core types flowing through the engine:
//! - CircuitRecord: one branch circuit as a flat map of UI fields
//! - RuleOutcome / Violation: what a single rule concluded
//! - NonConformity: immutable report entry synthesized by the engine
//! - ValidationResult / BatchResult: per-call and per-table results

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field names used by the circuit table UI
pub mod fields {
    pub const VOLTAGE: &str = "voltage";
    pub const CURRENT: &str = "current";
    pub const CABLE_GAUGE: &str = "cableGauge";
    pub const CABLE_TYPE: &str = "cableType";
    pub const DISTANCE: &str = "distance";
    pub const PROTECTION_CURRENT: &str = "protectionCurrent";
    pub const PROTECTION_DEVICE_TYPE: &str = "protectionDeviceType";
    pub const PHASES_COUNT: &str = "phasesCount";
    pub const LOOP_IMPEDANCE: &str = "loopImpedance";
    pub const POWER_FACTOR: &str = "powerFactor";
    pub const UPSTREAM_PROTECTION_CURRENT: &str = "upstreamProtectionCurrent";
    pub const UPSTREAM_PROTECTION_DEVICE_TYPE: &str = "upstreamProtectionDeviceType";

    /// Fields the built-in rules read with `CircuitRecord::number`
    pub(crate) const NUMERIC: &[&str] = &[
        VOLTAGE,
        CURRENT,
        CABLE_GAUGE,
        DISTANCE,
        PROTECTION_CURRENT,
        PHASES_COUNT,
        LOOP_IMPEDANCE,
        POWER_FACTOR,
        UPSTREAM_PROTECTION_CURRENT,
    ];

    /// Fields the built-in rules read with `CircuitRecord::text`
    pub(crate) const TEXT: &[&str] =
        &[CABLE_TYPE, PROTECTION_DEVICE_TYPE, UPSTREAM_PROTECTION_DEVICE_TYPE];
}

/// Code used for synthetic entries produced by rule errors and faults
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

// ============================================================================
// Circuit Record
// ============================================================================

/// A single field value as entered in the circuit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Null,
}

impl FieldValue {
    /// Numeric view of the value
    ///
    /// Text is parsed after trimming, accepting a decimal comma ("2,5").
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Text(s) => {
                let parsed = s.trim().replace(',', ".").parse::<f64>().ok()?;
                parsed.is_finite().then_some(parsed)
            },
            _ => None,
        }
    }

    /// Trimmed text view; numbers and flags are rendered
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            },
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Flag(b) => Some(b.to_string()),
            FieldValue::Null => None,
        }
    }

    /// Null and blank text count as absent
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Number(_) | FieldValue::Flag(_) => true,
        }
    }

    /// Canonical form used for option matching: numeric text collapses to the number
    pub(crate) fn canonical(&self) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        match self.as_f64() {
            Some(n) => Some(n.to_string()),
            None => self.as_text(),
        }
    }

    /// Type-tagged form of the value as `field` is read by rules
    ///
    /// Numeric fields collapse to the parsed number, text fields to the
    /// trimmed text. Any other field keeps its variant, so two values share
    /// a form only when every accessor returns the same for both.
    pub(crate) fn key_form(&self, field: &str) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        if fields::NUMERIC.contains(&field) {
            if let Some(n) = self.as_f64() {
                return Some(format!("n{}", n));
            }
        } else if fields::TEXT.contains(&field) {
            return self.as_text().map(|t| format!("t{}", t));
        }
        match self {
            FieldValue::Number(n) => Some(format!("n{}", n)),
            FieldValue::Flag(b) => Some(format!("b{}", b)),
            FieldValue::Text(s) => Some(format!("t{}", s.trim())),
            FieldValue::Null => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Flag(b) => write!(f, "{}", b),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Electrical parameters of one branch circuit
///
/// Serialized as a flat object: `{"id": "SK-1", "current": 16, "cableGauge": 2.5}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitRecord {
    /// Circuit identifier (accepts string or integer in input files)
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    /// Field name -> value
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl CircuitRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Field present and non-null
    pub fn has(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(FieldValue::is_present)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).and_then(FieldValue::as_text)
    }

    /// Number of phases, defaulting to single-phase when absent or unusable
    pub fn phases(&self) -> u8 {
        match self.number(fields::PHASES_COUNT) {
            Some(n) if n >= 2.0 => 3,
            _ => 1,
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    match RawId::deserialize(deserializer) {
        Ok(RawId::Text(s)) => Ok(s),
        Ok(RawId::Int(n)) => Ok(n.to_string()),
        Err(_) => Err(de::Error::custom("circuit id must be a string or integer")),
    }
}

// ============================================================================
// Rule Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    CableSizing,
    VoltageDrop,
    Protection,
    Supply,
    Coordination,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleCategory::CableSizing => "cable_sizing",
            RuleCategory::VoltageDrop => "voltage_drop",
            RuleCategory::Protection => "protection",
            RuleCategory::Supply => "supply",
            RuleCategory::Coordination => "coordination",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Rule Outcome
// ============================================================================

/// What a single rule concluded for a circuit
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Compliant,
    NonCompliant(Violation),
    /// Valid but uncatalogued input; reported as INFO
    Error(String),
}

impl RuleOutcome {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    pub(crate) fn not_numeric(field: &str) -> Self {
        Self::Error(format!("Field '{}' is not a number", field))
    }

    /// Compliant when `actual <= limit`, otherwise a violation built by `violation`
    pub(crate) fn check_max(actual: f64, limit: f64, violation: impl FnOnce() -> Violation) -> Self {
        if actual <= limit {
            Self::Compliant
        } else {
            Self::NonCompliant(violation())
        }
    }
}

/// Measured value against its normative limit
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub actual: f64,
    pub limit: f64,
    pub unit: &'static str,
    pub message: String,
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Violation {
    pub fn new(actual: f64, limit: f64, unit: &'static str, message: impl Into<String>) -> Self {
        Self {
            actual,
            limit,
            unit,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// Report entry for a failed or unevaluable rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonConformity {
    /// Rule code, or `VALIDATION_ERROR` for synthetic entries
    pub code: String,
    /// Offending rule for synthetic entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_code: Option<String>,
    pub name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub norm_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub message: String,
    #[serde(default)]
    pub remedy_options: Vec<String>,
    #[serde(default)]
    pub calculation_details: serde_json::Value,
}

impl NonConformity {
    pub fn is_validation_error(&self) -> bool {
        self.code == VALIDATION_ERROR
    }
}

/// Input value outside its declared domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputError {
    pub field: String,
    pub value: FieldValue,
    pub message: String,
}

/// Rule not executed because required fields are missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    pub code: String,
    pub missing_fields: Vec<String>,
    /// Share of required fields present, 0-100
    pub percent_complete: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub rules_applicable: usize,
    pub rules_executed: usize,
    pub compliant: Vec<String>,
    pub non_compliant: Vec<String>,
    /// Rules that returned a domain error or faulted
    #[serde(default)]
    pub errored: Vec<String>,
    pub skipped: Vec<SkippedRule>,
}

impl ValidationSummary {
    pub fn skipped_rule(&self, code: &str) -> Option<&SkippedRule> {
        self.skipped.iter().find(|s| s.code == code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceInfo {
    pub duration_us: u64,
    pub rules_executed: usize,
    pub from_cache: bool,
}

/// Outcome of one `validate_circuit` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub circuit_id: String,
    pub timestamp: DateTime<Utc>,
    pub non_conformities: Vec<NonConformity>,
    pub input_errors: Vec<InputError>,
    pub summary: ValidationSummary,
    pub is_valid: bool,
    pub has_warnings: bool,
    pub performance: PerformanceInfo,
}

impl ValidationResult {
    pub fn from_cache(&self) -> bool {
        self.performance.from_cache
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.non_conformities
            .iter()
            .filter(|nc| nc.severity == severity)
            .count()
    }

    /// Entries produced by a rule, including synthetic entries naming it
    pub fn issues_for<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a NonConformity> + 'a {
        self.non_conformities
            .iter()
            .filter(move |nc| nc.code == code || nc.rule_code.as_deref() == Some(code))
    }
}

/// Outcome of `validate_all_circuits`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<ValidationResult>,
    pub total_circuits: usize,
    pub valid_circuits: usize,
    pub circuits_with_issues: usize,
    pub critical_issues: usize,
    pub warnings: usize,
    pub total_time_ms: f64,
    pub avg_time_per_circuit_ms: f64,
}

// ============================================================================
// Introspection
// ============================================================================

/// Static description of a registered rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptor {
    pub code: String,
    pub name: String,
    pub category: RuleCategory,
    pub severity: Severity,
    pub required_fields: Vec<String>,
    pub norm_reference: String,
}

/// Rule with some, but not all, required fields filled in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRule {
    pub rule: RuleDescriptor,
    pub missing_fields: Vec<String>,
    pub percent_complete: u8,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_field_value_numeric_text() {
        assert_eq!(FieldValue::from("2,5").as_f64(), Some(2.5));
        assert_eq!(FieldValue::from(" 16 ").as_f64(), Some(16.0));
        assert_eq!(FieldValue::from("NYM-J").as_f64(), None);
        assert_eq!(FieldValue::Null.as_f64(), None);
    }

    #[test]
    fn test_blank_and_null_are_absent() {
        let record = CircuitRecord::new("SK-1")
            .with(fields::CURRENT, 16.0)
            .with(fields::CABLE_TYPE, "  ")
            .with(fields::VOLTAGE, FieldValue::Null);

        assert!(record.has(fields::CURRENT));
        assert!(!record.has(fields::CABLE_TYPE));
        assert!(!record.has(fields::VOLTAGE));
        assert!(!record.has(fields::DISTANCE));
    }

    #[test]
    fn test_canonical_collapses_numeric_text() {
        assert_eq!(FieldValue::from("6").canonical(), FieldValue::from(6.0).canonical());
        assert_eq!(FieldValue::from(" ").canonical(), None);
    }

    #[test]
    fn test_key_form_follows_field_reading() {
        // Numeric fields: "2,5" and 2.5 read the same
        assert_eq!(
            FieldValue::from("2,5").key_form(fields::CABLE_GAUGE),
            FieldValue::from(2.5).key_form(fields::CABLE_GAUGE)
        );
        // Non-numeric text in a numeric field never matches a number
        assert_ne!(
            FieldValue::from("n6").key_form(fields::CABLE_GAUGE),
            FieldValue::from(6.0).key_form(fields::CABLE_GAUGE)
        );
        // Text fields keep the text as typed
        assert_ne!(
            FieldValue::from("6.0").key_form(fields::CABLE_TYPE),
            FieldValue::from("6").key_form(fields::CABLE_TYPE)
        );
        assert_eq!(
            FieldValue::from(" NYM-J ").key_form(fields::CABLE_TYPE),
            Some("tNYM-J".to_string())
        );
        // Unknown fields keep the variant
        assert_ne!(
            FieldValue::from("6").key_form("custom"),
            FieldValue::from(6.0).key_form("custom")
        );
        assert_eq!(FieldValue::Null.key_form(fields::CURRENT), None);
    }

    #[test]
    fn test_record_flat_json() {
        let json = r#"{"id": 7, "current": 16, "cableGauge": "2,5", "cableType": "NYM-J", "distance": null}"#;
        let record: CircuitRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, "7");
        assert_eq!(record.number(fields::CURRENT), Some(16.0));
        assert_eq!(record.number(fields::CABLE_GAUGE), Some(2.5));
        assert_eq!(record.text(fields::CABLE_TYPE).as_deref(), Some("NYM-J"));
        assert!(!record.has(fields::DISTANCE));
    }

    #[test]
    fn test_phases_default_single() {
        let record = CircuitRecord::new("SK-2");
        assert_eq!(record.phases(), 1);
        assert_eq!(record.with(fields::PHASES_COUNT, 3).phases(), 3);
    }

    #[test]
    fn test_severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
    }
}
