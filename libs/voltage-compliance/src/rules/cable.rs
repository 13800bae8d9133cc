//! Cable rules: ampacity, voltage drop, rated voltage

use super::{gauge_for_current, loaded_conductors, round2, smallest_at_least, Rule};
use crate::error::{ensure_finite, RuleFault};
use crate::reference::ReferenceData;
use crate::types::{fields, CircuitRecord, RuleCategory, RuleOutcome, Severity, Violation};

// ============================================================================
// CABLE_AMPACITY
// ============================================================================

/// Operating current must not exceed the cable's current-carrying capacity
pub struct CableAmpacityRule;

impl Rule for CableAmpacityRule {
    fn code(&self) -> &'static str {
        "CABLE_AMPACITY"
    }

    fn name(&self) -> &'static str {
        "Cable ampacity"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::CableSizing
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::CURRENT, fields::CABLE_GAUGE]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0298-4 / IEC 60364-5-52"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(current) = data.number(fields::CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::CURRENT));
        };
        let Some(gauge) = data.number(fields::CABLE_GAUGE) else {
            return Ok(RuleOutcome::not_numeric(fields::CABLE_GAUGE));
        };

        let loaded = loaded_conductors(data);
        let Some(ampacity) = refs.cables.ampacity(gauge, loaded) else {
            return Ok(RuleOutcome::error(format!(
                "Cable gauge {} mm² not found in ampacity catalog",
                gauge
            )));
        };

        Ok(RuleOutcome::check_max(current, ampacity, || {
            Violation::new(
                current,
                ampacity,
                "A",
                format!(
                    "Operating current {} A exceeds ampacity {} A of {} mm² cable",
                    current, ampacity, gauge
                ),
            )
            .detail("cableGauge", gauge)
            .detail("loadedConductors", loaded)
            .detail("installationMethod", "C")
        }))
    }

    fn remedy_options(&self, violation: &Violation, data: &CircuitRecord, refs: &ReferenceData) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(gauge) = gauge_for_current(refs, violation.actual, loaded_conductors(data)) {
            options.push(format!("Increase cable cross-section to at least {} mm²", gauge));
        }
        options.push(format!("Reduce operating current to at most {} A", violation.limit));
        options.push("Split the load across several circuits".to_string());
        options
    }
}

// ============================================================================
// VOLTAGE_DROP
// ============================================================================

/// Voltage drop along the cable must stay within the permitted percentage
///
/// Single-phase: dU = 2 * L * I * cos(phi) / (kappa * A)
/// Three-phase:  dU = sqrt(3) * L * I * cos(phi) / (kappa * A)
pub struct VoltageDropRule;

impl VoltageDropRule {
    fn path_factor(data: &CircuitRecord) -> f64 {
        if data.phases() == 3 {
            3f64.sqrt()
        } else {
            2.0
        }
    }
}

impl Rule for VoltageDropRule {
    fn code(&self) -> &'static str {
        "VOLTAGE_DROP"
    }

    fn name(&self) -> &'static str {
        "Voltage drop"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::VoltageDrop
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::CURRENT, fields::CABLE_GAUGE, fields::DISTANCE, fields::VOLTAGE]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT, fields::POWER_FACTOR]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0100-520 / DIN 18015-1"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(current) = data.number(fields::CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::CURRENT));
        };
        let Some(gauge) = data.number(fields::CABLE_GAUGE) else {
            return Ok(RuleOutcome::not_numeric(fields::CABLE_GAUGE));
        };
        let Some(distance) = data.number(fields::DISTANCE) else {
            return Ok(RuleOutcome::not_numeric(fields::DISTANCE));
        };
        let Some(voltage) = data.number(fields::VOLTAGE) else {
            return Ok(RuleOutcome::not_numeric(fields::VOLTAGE));
        };
        if gauge <= 0.0 || voltage <= 0.0 {
            return Ok(RuleOutcome::error(
                "Cable gauge and voltage must be positive for voltage drop",
            ));
        }

        let power_factor = data.number(fields::POWER_FACTOR).unwrap_or(1.0);
        if power_factor <= 0.0 || power_factor > 1.0 {
            return Ok(RuleOutcome::error(format!(
                "Power factor {} outside (0, 1]",
                power_factor
            )));
        }

        let conductivity = refs.standards.conductivity();
        let drop_volts = ensure_finite(
            Self::path_factor(data) * distance * current * power_factor / (conductivity * gauge),
            "voltage drop",
        )?;
        let drop_percent = round2(drop_volts / voltage * 100.0);
        let limit = refs.standards.max_voltage_drop_percent();

        Ok(RuleOutcome::check_max(drop_percent, limit, || {
            Violation::new(
                drop_percent,
                limit,
                "%",
                format!(
                    "Voltage drop {}% over {} m exceeds {}%",
                    drop_percent, distance, limit
                ),
            )
            .detail("dropVolts", round2(drop_volts))
            .detail("distance", distance)
            .detail("powerFactor", power_factor)
            .detail("conductivity", conductivity)
        }))
    }

    fn remedy_options(&self, violation: &Violation, data: &CircuitRecord, refs: &ReferenceData) -> Vec<String> {
        let mut options = Vec::new();
        let gauge = data.number(fields::CABLE_GAUGE).unwrap_or_default();
        let distance = data.number(fields::DISTANCE).unwrap_or_default();

        // Drop scales with 1/A, so the required gauge is A * actual / limit
        if violation.limit > 0.0 {
            let required = gauge * violation.actual / violation.limit;
            if let Some(next) = smallest_at_least(&refs.cables.gauges(), required) {
                options.push(format!("Increase cable cross-section to at least {} mm²", next));
            }
        }
        if violation.actual > 0.0 {
            let max_length = distance * violation.limit / violation.actual;
            options.push(format!("Reduce cable length to at most {:.1} m", max_length));
        }
        options.push("Move the distribution point closer to the load".to_string());
        options
    }
}

// ============================================================================
// CABLE_VOLTAGE_RATING
// ============================================================================

/// System voltage must not exceed the cable's rated voltage
///
/// Single-phase circuits compare against U0, three-phase against U.
pub struct CableVoltageRatingRule;

impl Rule for CableVoltageRatingRule {
    fn code(&self) -> &'static str {
        "CABLE_VOLTAGE_RATING"
    }

    fn name(&self) -> &'static str {
        "Cable voltage rating"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::CableSizing
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::VOLTAGE, fields::CABLE_TYPE]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0298-3 / DIN VDE 0100-520"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(voltage) = data.number(fields::VOLTAGE) else {
            return Ok(RuleOutcome::not_numeric(fields::VOLTAGE));
        };
        let cable_type = data.text(fields::CABLE_TYPE).unwrap_or_default();
        let Some(rating) = refs.cables.voltage_rating(&cable_type) else {
            return Ok(RuleOutcome::error(format!(
                "Cable type '{}' not found in catalog",
                cable_type
            )));
        };

        let three_phase = data.phases() == 3;
        let limit = if three_phase { rating.u } else { rating.u0 };

        Ok(RuleOutcome::check_max(voltage, limit, || {
            Violation::new(
                voltage,
                limit,
                "V",
                format!(
                    "System voltage {} V exceeds rating {}/{} V of {}",
                    voltage, rating.u0, rating.u, cable_type
                ),
            )
            .detail("cableType", cable_type.clone())
            .detail("ratedU0", rating.u0)
            .detail("ratedU", rating.u)
            .detail("comparedAgainst", if three_phase { "U" } else { "U0" })
        }))
    }

    fn remedy_options(&self, violation: &Violation, _data: &CircuitRecord, _refs: &ReferenceData) -> Vec<String> {
        vec![
            format!("Use a cable type rated for at least {} V", violation.actual),
            "For 400 V systems use 0.6/1 kV cable (e.g. NYY-J)".to_string(),
        ]
    }
}
