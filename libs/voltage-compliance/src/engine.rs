//! Validation engine
//!
//! Orchestrates one validation pass:
//!
//! ```text
//!   CircuitRecord
//!        │
//!        ├─► input constraints ──────────────► input_errors
//!        │
//!        ├─► fingerprint ─► ResultCache ─hit─► cached result (fromCache)
//!        │                       │miss
//!        ▼                       ▼
//!   applicability gating ─► rules (isolated) ─► NonConformity list
//!                                   │
//!                                   ▼
//!                      aggregate ─► metrics ─► cache store
//! ```
//!
//! A rule that panics or returns a `RuleFault` becomes a CRITICAL
//! `VALIDATION_ERROR` entry; the remaining rules still run.

use crate::cache::{fingerprint, CacheStats, ResultCache};
use crate::config::ComplianceConfig;
use crate::error::RuleFault;
use crate::input::{self, InputCheck};
use crate::metrics::{ExecutionMetrics, MetricsSnapshot};
use crate::reference::ReferenceData;
use crate::rules::{describe, Rule, RuleRegistry};
use crate::types::{
    BatchResult, CircuitRecord, FieldValue, NonConformity, PendingRule, PerformanceInfo,
    RuleDescriptor, RuleOutcome, Severity, SkippedRule, ValidationResult, ValidationSummary,
    VALIDATION_ERROR,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-call switches for `validate_circuit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOptions {
    pub use_cache: bool,
    pub validate_inputs: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            validate_inputs: true,
        }
    }
}

impl ValidateOptions {
    /// Bypass the cache, keep input checks
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }
}

/// What one isolated rule execution produced
enum RuleExecution {
    Compliant,
    NonCompliant(NonConformity),
    DomainError(String),
    Fault(RuleFault),
}

/// Reference catalogs and the number of reloads so far
struct ReferenceState {
    data: ReferenceData,
    generation: u64,
}

/// Compliance validation engine
///
/// Owns its rule registry, result cache and metrics. Shareable across
/// threads behind an `Arc`.
pub struct ValidationEngine {
    registry: RuleRegistry,
    refs: RwLock<ReferenceState>,
    cache: ResultCache,
    metrics: ExecutionMetrics,
    defaults: ValidateOptions,
}

impl ValidationEngine {
    pub fn new(registry: RuleRegistry, refs: ReferenceData, config: &ComplianceConfig) -> Self {
        info!(
            "Compliance engine: {} rules, cache capacity {}",
            registry.len(),
            config.cache.capacity
        );
        Self {
            registry,
            refs: RwLock::new(ReferenceState {
                data: refs,
                generation: 0,
            }),
            cache: ResultCache::new(config.cache.capacity),
            metrics: ExecutionMetrics::new(
                config.metrics.slow_threshold(),
                config.metrics.slow_log_capacity,
                config.metrics.fault_log_capacity,
            ),
            defaults: ValidateOptions {
                use_cache: config.validation.use_cache,
                validate_inputs: config.validation.validate_inputs,
            },
        }
    }

    /// Standard rules, built-in catalogs, default configuration
    pub fn with_defaults() -> Self {
        Self::new(
            RuleRegistry::standard(),
            ReferenceData::default(),
            &ComplianceConfig::default(),
        )
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Options taken from the `validation` config section
    pub fn default_options(&self) -> ValidateOptions {
        self.defaults
    }

    pub fn reference_data(&self) -> ReferenceData {
        self.refs.read().data.clone()
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate one circuit; always returns a fully populated result
    pub fn validate_circuit(&self, data: &CircuitRecord, options: ValidateOptions) -> ValidationResult {
        let start = Instant::now();

        let input_errors = if options.validate_inputs {
            input::validate_record(data)
        } else {
            Vec::new()
        };

        let key = options
            .use_cache
            .then(|| fingerprint(data, self.registry.cache_fields()));

        if let Some(key) = &key {
            if let Some(mut cached) = self.cache.get(key) {
                debug!("Cache hit for {}", data.id);
                cached.circuit_id = data.id.clone();
                cached.timestamp = Utc::now();
                cached.input_errors = input_errors;
                cached.performance.from_cache = true;
                cached.performance.duration_us = elapsed_us(start);
                return cached;
            }
        }

        let (refs, generation) = {
            let state = self.refs.read();
            (state.data.clone(), state.generation)
        };
        let mut summary = ValidationSummary::default();
        let mut non_conformities = Vec::new();

        for rule in self.registry.iter() {
            let missing = missing_fields(rule.as_ref(), data);
            if !missing.is_empty() {
                summary.skipped.push(SkippedRule {
                    code: rule.code().to_string(),
                    percent_complete: percent_complete(rule.required_fields().len(), missing.len()),
                    missing_fields: missing,
                });
                continue;
            }

            summary.rules_applicable += 1;
            summary.rules_executed += 1;
            let code = rule.code().to_string();

            match execute_rule(rule.as_ref(), data, &refs) {
                RuleExecution::Compliant => summary.compliant.push(code),
                RuleExecution::NonCompliant(nc) => {
                    non_conformities.push(nc);
                    summary.non_compliant.push(code);
                },
                RuleExecution::DomainError(message) => {
                    non_conformities.push(validation_error(rule.as_ref(), Severity::Info, message));
                    summary.errored.push(code);
                },
                RuleExecution::Fault(fault) => {
                    let message = fault.to_string();
                    warn!("Rule {} faulted on {}: {}", code, data.id, message);
                    self.metrics.record_fault(&data.id, &code, &message);
                    non_conformities.push(validation_error(
                        rule.as_ref(),
                        Severity::Critical,
                        format!("Rule {} failed: {}", code, message),
                    ));
                    summary.errored.push(code);
                },
            }
        }

        let is_valid = !non_conformities.iter().any(|nc| nc.severity == Severity::Critical);
        let has_warnings = non_conformities.iter().any(|nc| nc.severity == Severity::Warning);
        let duration = start.elapsed();
        let rules_executed = summary.rules_executed;

        self.metrics.record_execution(&data.id, duration, rules_executed);
        debug!(
            "Validated {}: {} rules, {} issues in {}us",
            data.id,
            rules_executed,
            non_conformities.len(),
            duration.as_micros()
        );

        let result = ValidationResult {
            circuit_id: data.id.clone(),
            timestamp: Utc::now(),
            non_conformities,
            input_errors,
            summary,
            is_valid,
            has_warnings,
            performance: PerformanceInfo {
                duration_us: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
                rules_executed,
                from_cache: false,
            },
        };

        if let Some(key) = key {
            // Held across the insert so a reload cannot clear in between
            let state = self.refs.read();
            if state.generation == generation {
                // Input errors are recomputed per call, so they are not cached
                let mut stored = result.clone();
                stored.input_errors.clear();
                self.cache.insert(key, stored);
            } else {
                debug!(
                    "Reference data reloaded while validating {}, result not cached",
                    data.id
                );
            }
        }

        result
    }

    /// Validate every circuit with the configured default options
    pub fn validate_all_circuits(&self, circuits: &[CircuitRecord]) -> BatchResult {
        self.validate_all_circuits_with(circuits, self.defaults)
    }

    pub fn validate_all_circuits_with(
        &self,
        circuits: &[CircuitRecord],
        options: ValidateOptions,
    ) -> BatchResult {
        let start = Instant::now();
        let results: Vec<ValidationResult> = circuits
            .iter()
            .map(|c| self.validate_circuit(c, options))
            .collect();
        let total_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let total_circuits = results.len();
        let batch = BatchResult {
            total_circuits,
            valid_circuits: results.iter().filter(|r| r.is_valid).count(),
            circuits_with_issues: results.iter().filter(|r| !r.non_conformities.is_empty()).count(),
            critical_issues: results.iter().map(|r| r.count(Severity::Critical)).sum(),
            warnings: results.iter().map(|r| r.count(Severity::Warning)).sum(),
            total_time_ms,
            avg_time_per_circuit_ms: if total_circuits == 0 {
                0.0
            } else {
                total_time_ms / total_circuits as f64
            },
            results,
        };

        info!(
            "Batch validated: {} circuits, {} valid, {} critical, {} warnings in {:.2}ms",
            batch.total_circuits,
            batch.valid_circuits,
            batch.critical_issues,
            batch.warnings,
            batch.total_time_ms
        );
        batch
    }

    /// Immediate single-field check against the constraint table
    pub fn validate_input_value(&self, field: &str, value: &FieldValue) -> InputCheck {
        input::validate_input_value(field, value)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Rules whose required fields are all present
    pub fn applicable_rules(&self, data: &CircuitRecord) -> Vec<RuleDescriptor> {
        self.registry
            .iter()
            .filter(|r| missing_fields(r.as_ref(), data).is_empty())
            .map(|r| describe(r.as_ref()))
            .collect()
    }

    /// Rules with some, but not all, required fields present
    pub fn pending_rules(&self, data: &CircuitRecord) -> Vec<PendingRule> {
        self.registry
            .iter()
            .filter_map(|r| {
                let total = r.required_fields().len();
                let missing = missing_fields(r.as_ref(), data);
                if missing.is_empty() || missing.len() == total {
                    return None;
                }
                Some(PendingRule {
                    rule: describe(r.as_ref()),
                    percent_complete: percent_complete(total, missing.len()),
                    missing_fields: missing,
                })
            })
            .collect()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.cache.stats())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Reset execution counters and cache hit statistics
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.cache.reset_stats();
    }

    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        info!("Result cache cleared ({} entries)", dropped);
    }

    /// Swap the reference catalogs; cached conclusions are discarded
    ///
    /// Passes still running on the old catalogs finish normally but do not
    /// store their results.
    pub fn reload_reference_data(&self, refs: ReferenceData) {
        let generation = {
            let mut state = self.refs.write();
            state.data = refs;
            state.generation += 1;
            self.cache.clear();
            state.generation
        };
        info!("Reference data reloaded (generation {}), result cache cleared", generation);
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("defaults", &self.defaults)
            .finish()
    }
}

// ============================================================================
// Rule execution
// ============================================================================

/// Run one rule inside a panic boundary
fn execute_rule(rule: &dyn Rule, data: &CircuitRecord, refs: &ReferenceData) -> RuleExecution {
    let run = panic::catch_unwind(AssertUnwindSafe(|| match rule.calculate(data, refs) {
        Ok(RuleOutcome::Compliant) => RuleExecution::Compliant,
        Ok(RuleOutcome::NonCompliant(violation)) => {
            let remedy_options = rule.remedy_options(&violation, data, refs);
            RuleExecution::NonCompliant(NonConformity {
                code: rule.code().to_string(),
                rule_code: None,
                name: rule.name().to_string(),
                category: rule.category(),
                severity: rule.severity(),
                norm_reference: rule.norm_reference().to_string(),
                actual: Some(violation.actual),
                limit: Some(violation.limit),
                unit: Some(violation.unit.to_string()),
                message: violation.message,
                remedy_options,
                calculation_details: serde_json::Value::Object(violation.details),
            })
        },
        Ok(RuleOutcome::Error(message)) => RuleExecution::DomainError(message),
        Err(fault) => RuleExecution::Fault(fault),
    }));

    match run {
        Ok(execution) => execution,
        Err(payload) => RuleExecution::Fault(RuleFault::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Synthetic entry for a rule that could not produce a verdict
fn validation_error(rule: &dyn Rule, severity: Severity, message: String) -> NonConformity {
    NonConformity {
        code: VALIDATION_ERROR.to_string(),
        rule_code: Some(rule.code().to_string()),
        name: rule.name().to_string(),
        category: rule.category(),
        severity,
        norm_reference: rule.norm_reference().to_string(),
        actual: None,
        limit: None,
        unit: None,
        message,
        remedy_options: Vec::new(),
        calculation_details: serde_json::json!({ "rule": rule.code() }),
    }
}

fn missing_fields(rule: &dyn Rule, data: &CircuitRecord) -> Vec<String> {
    rule.required_fields()
        .iter()
        .filter(|f| !data.has(f))
        .map(|f| f.to_string())
        .collect()
}

fn percent_complete(total: usize, missing: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let present = total.saturating_sub(missing);
    ((present as f64 / total as f64) * 100.0).round() as u8
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fields;

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(2, 1), 50);
        assert_eq!(percent_complete(3, 1), 67);
        assert_eq!(percent_complete(4, 4), 0);
        assert_eq!(percent_complete(0, 0), 100);
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let s: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(s.as_ref()), "bang");
        let s: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_empty_record_runs_nothing() {
        let engine = ValidationEngine::with_defaults();
        let result = engine.validate_circuit(&CircuitRecord::new("SK-0"), ValidateOptions::default());
        assert!(result.is_valid);
        assert!(!result.has_warnings);
        assert_eq!(result.summary.rules_executed, 0);
        assert_eq!(result.summary.skipped.len(), engine.registry().len());
        assert!(result.non_conformities.is_empty());
    }

    #[test]
    fn test_domain_error_becomes_info_entry() {
        let engine = ValidationEngine::with_defaults();
        let data = CircuitRecord::new("SK-1")
            .with(fields::CURRENT, 10)
            .with(fields::CABLE_GAUGE, 7);
        let result = engine.validate_circuit(&data, ValidateOptions::uncached());

        let entries: Vec<_> = result.issues_for("CABLE_AMPACITY").collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_validation_error());
        assert_eq!(entries[0].severity, Severity::Info);
        assert!(result.is_valid);
        assert_eq!(result.summary.errored, vec!["CABLE_AMPACITY".to_string()]);
    }

    #[test]
    fn test_input_errors_do_not_block_rules() {
        let engine = ValidationEngine::with_defaults();
        let data = CircuitRecord::new("SK-2")
            .with(fields::CURRENT, 700)
            .with(fields::CABLE_GAUGE, 6);
        let result = engine.validate_circuit(&data, ValidateOptions::default());

        assert_eq!(result.input_errors.len(), 1);
        assert_eq!(result.input_errors[0].field, fields::CURRENT);
        assert_eq!(result.summary.non_compliant, vec!["CABLE_AMPACITY".to_string()]);
    }

    #[test]
    fn test_pending_rules_partial_only() {
        let engine = ValidationEngine::with_defaults();
        let data = CircuitRecord::new("SK-3").with(fields::CURRENT, 16);
        let pending = engine.pending_rules(&data);

        let ampacity = pending
            .iter()
            .find(|p| p.rule.code == "CABLE_AMPACITY")
            .map(|p| (p.missing_fields.clone(), p.percent_complete));
        assert_eq!(ampacity, Some((vec![fields::CABLE_GAUGE.to_string()], 50)));
        // VOLTAGE_RANGE has no required field present
        assert!(pending.iter().all(|p| p.rule.code != "VOLTAGE_RANGE"));
    }

    #[test]
    fn test_reload_clears_cache() {
        let engine = ValidationEngine::with_defaults();
        let data = CircuitRecord::new("SK-4").with(fields::VOLTAGE, 230);
        engine.validate_circuit(&data, ValidateOptions::default());
        assert_eq!(engine.cache_stats().size, 1);

        engine.reload_reference_data(ReferenceData::default());
        assert_eq!(engine.cache_stats().size, 0);
        let again = engine.validate_circuit(&data, ValidateOptions::default());
        assert!(!again.from_cache());
    }
}
