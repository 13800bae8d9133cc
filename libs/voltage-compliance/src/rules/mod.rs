//! Normative rules and the rule registry
//!
//! Every rule is a pure, synchronous unit behind the [`Rule`] trait. The
//! registry is an immutable ordered collection built once; the engine walks
//! it in order for every validation.
//!
//! Rule contract:
//! - `calculate` only runs when every required field is present.
//! - Uncatalogued or non-numeric inputs return `RuleOutcome::Error`.
//! - `Err(RuleFault)` (or a panic) signals a programming fault.
//! - Identical inputs and reference data always yield identical outcomes.

mod cable;
mod protection;
mod supply;

pub use cable::{CableAmpacityRule, CableVoltageRatingRule, VoltageDropRule};
pub use protection::{LoopImpedanceRule, ProtectionSizingRule, SelectivityRule};
pub use supply::VoltageRangeRule;

use crate::error::{ComplianceError, Result, RuleFault};
use crate::reference::ReferenceData;
use crate::types::{CircuitRecord, RuleCategory, RuleDescriptor, RuleOutcome, Severity, Violation};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Capability interface shared by all rules
pub trait Rule: Send + Sync {
    /// Unique rule code (e.g. "CABLE_AMPACITY")
    fn code(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn category(&self) -> RuleCategory;

    /// Severity of a violation of this rule
    fn severity(&self) -> Severity;

    /// Fields that must all be present before the rule runs
    fn required_fields(&self) -> &'static [&'static str];

    /// Fields read when present; they still change the outcome
    fn optional_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn norm_reference(&self) -> &'static str;

    fn calculate(
        &self,
        data: &CircuitRecord,
        refs: &ReferenceData,
    ) -> std::result::Result<RuleOutcome, RuleFault>;

    /// Remediation text for a violation
    fn remedy_options(
        &self,
        _violation: &Violation,
        _data: &CircuitRecord,
        _refs: &ReferenceData,
    ) -> Vec<String> {
        Vec::new()
    }
}

/// Static description of a rule for introspection
pub fn describe(rule: &dyn Rule) -> RuleDescriptor {
    RuleDescriptor {
        code: rule.code().to_string(),
        name: rule.name().to_string(),
        category: rule.category(),
        severity: rule.severity(),
        required_fields: rule.required_fields().iter().map(|f| f.to_string()).collect(),
        norm_reference: rule.norm_reference().to_string(),
    }
}

/// The standard rule set in registry order
pub fn standard_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(CableAmpacityRule),
        Arc::new(VoltageDropRule),
        Arc::new(ProtectionSizingRule),
        Arc::new(LoopImpedanceRule),
        Arc::new(VoltageRangeRule),
        Arc::new(CableVoltageRatingRule),
        Arc::new(SelectivityRule),
    ]
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable, ordered rule collection
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    /// Union of required and optional fields, sorted; drives the cache fingerprint
    cache_fields: Vec<&'static str>,
}

impl RuleRegistry {
    /// Build a registry, rejecting duplicate rule codes
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Result<Self> {
        let mut seen = FxHashSet::default();
        for rule in &rules {
            if !seen.insert(rule.code()) {
                return Err(ComplianceError::DuplicateRule(rule.code().to_string()));
            }
        }
        Ok(Self::build(rules))
    }

    /// Registry holding [`standard_rules`]
    pub fn standard() -> Self {
        Self::build(standard_rules())
    }

    fn build(rules: Vec<Arc<dyn Rule>>) -> Self {
        let cache_fields: BTreeSet<&'static str> = rules
            .iter()
            .flat_map(|r| r.required_fields().iter().chain(r.optional_fields()))
            .copied()
            .collect();

        Self {
            rules,
            cache_fields: cache_fields.into_iter().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.iter().find(|r| r.code() == code)
    }

    pub fn cache_fields(&self) -> &[&'static str] {
        &self.cache_fields
    }

    pub fn descriptors(&self) -> Vec<RuleDescriptor> {
        self.rules.iter().map(|r| describe(r.as_ref())).collect()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.iter().map(|r| r.code()).collect::<Vec<_>>())
            .field("cache_fields", &self.cache_fields)
            .finish()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Smallest catalogued value >= `target`
pub(crate) fn smallest_at_least(values: &[f64], target: f64) -> Option<f64> {
    values.iter().copied().find(|v| *v >= target - 1e-9)
}

/// Largest catalogued value <= `target`
pub(crate) fn largest_at_most(values: &[f64], target: f64) -> Option<f64> {
    values.iter().rev().copied().find(|v| *v <= target + 1e-9)
}

/// Smallest gauge whose ampacity carries `current`
pub(crate) fn gauge_for_current(refs: &ReferenceData, current: f64, loaded: u8) -> Option<f64> {
    refs.cables
        .gauges()
        .into_iter()
        .find(|g| refs.cables.ampacity(*g, loaded).is_some_and(|iz| iz >= current))
}

/// Loaded conductors used for ampacity: 3 for three-phase, 2 otherwise
pub(crate) fn loaded_conductors(data: &CircuitRecord) -> u8 {
    if data.phases() == 3 {
        3
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fields;

    struct Named(&'static str);

    impl Rule for Named {
        fn code(&self) -> &'static str {
            self.0
        }
        fn name(&self) -> &'static str {
            "named"
        }
        fn category(&self) -> RuleCategory {
            RuleCategory::Supply
        }
        fn severity(&self) -> Severity {
            Severity::Info
        }
        fn required_fields(&self) -> &'static [&'static str] {
            &[fields::VOLTAGE]
        }
        fn norm_reference(&self) -> &'static str {
            "-"
        }
        fn calculate(
            &self,
            _data: &CircuitRecord,
            _refs: &ReferenceData,
        ) -> std::result::Result<RuleOutcome, RuleFault> {
            Ok(RuleOutcome::Compliant)
        }
    }

    #[test]
    fn test_standard_registry_order() {
        let registry = RuleRegistry::standard();
        let codes: Vec<_> = registry.iter().map(|r| r.code()).collect();
        assert_eq!(
            codes,
            vec![
                "CABLE_AMPACITY",
                "VOLTAGE_DROP",
                "PROTECTION_SIZING",
                "LOOP_IMPEDANCE",
                "VOLTAGE_RANGE",
                "CABLE_VOLTAGE_RATING",
                "SELECTIVITY",
            ]
        );
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let rules: Vec<Arc<dyn Rule>> = vec![Arc::new(Named("A")), Arc::new(Named("A"))];
        match RuleRegistry::new(rules) {
            Err(ComplianceError::DuplicateRule(code)) => assert_eq!(code, "A"),
            other => panic!("Expected duplicate rule error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_cache_fields_union_sorted() {
        let registry = RuleRegistry::standard();
        let fields = registry.cache_fields();
        assert!(fields.windows(2).all(|w| w[0] < w[1]));
        assert!(fields.contains(&fields::PHASES_COUNT));
        assert!(fields.contains(&fields::UPSTREAM_PROTECTION_DEVICE_TYPE));
        assert!(!fields.contains(&"notes"));
    }

    #[test]
    fn test_catalog_helpers() {
        let values = [6.0, 10.0, 16.0, 20.0];
        assert_eq!(smallest_at_least(&values, 13.0), Some(16.0));
        assert_eq!(largest_at_most(&values, 13.0), Some(10.0));
        assert_eq!(smallest_at_least(&values, 25.0), None);
        assert_eq!(round2(1.23456), 1.23);
    }
}
