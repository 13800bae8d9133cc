//! Supply voltage range rule

use super::{round2, Rule};
use crate::error::RuleFault;
use crate::reference::ReferenceData;
use crate::types::{fields, CircuitRecord, RuleCategory, RuleOutcome, Severity, Violation};

/// Supply voltage within the permitted band around nominal (EN 50160)
///
/// With `phasesCount` given the matching nominal voltage is used, otherwise
/// the nearest catalogued nominal.
pub struct VoltageRangeRule;

impl VoltageRangeRule {
    fn nominal(data: &CircuitRecord, refs: &ReferenceData, voltage: f64) -> Option<f64> {
        if data.has(fields::PHASES_COUNT) {
            return refs.standards.nominal_voltage(data.phases());
        }
        [1u8, 3]
            .iter()
            .filter_map(|p| refs.standards.nominal_voltage(*p))
            .min_by(|a, b| (a - voltage).abs().total_cmp(&(b - voltage).abs()))
    }
}

impl Rule for VoltageRangeRule {
    fn code(&self) -> &'static str {
        "VOLTAGE_RANGE"
    }

    fn name(&self) -> &'static str {
        "Supply voltage range"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Supply
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::VOLTAGE]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT]
    }

    fn norm_reference(&self) -> &'static str {
        "EN 50160 / DIN IEC 60038"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(voltage) = data.number(fields::VOLTAGE) else {
            return Ok(RuleOutcome::not_numeric(fields::VOLTAGE));
        };
        let Some(nominal) = Self::nominal(data, refs, voltage) else {
            return Ok(RuleOutcome::error("No nominal voltage catalogued for this phase count"));
        };

        let tolerance = refs.standards.voltage_tolerance_percent();
        let deviation = round2((voltage - nominal) / nominal * 100.0);
        if deviation.abs() <= tolerance {
            return Ok(RuleOutcome::Compliant);
        }

        let bound = if deviation > 0.0 {
            nominal * (1.0 + tolerance / 100.0)
        } else {
            nominal * (1.0 - tolerance / 100.0)
        };

        Ok(RuleOutcome::NonCompliant(
            Violation::new(
                voltage,
                round2(bound),
                "V",
                format!(
                    "Voltage {} V deviates {}% from nominal {} V (tolerance ±{}%)",
                    voltage, deviation, nominal, tolerance
                ),
            )
            .detail("nominal", nominal)
            .detail("deviationPercent", deviation)
            .detail("tolerancePercent", tolerance),
        ))
    }

    fn remedy_options(&self, _violation: &Violation, _data: &CircuitRecord, _refs: &ReferenceData) -> Vec<String> {
        vec![
            "Verify the measured supply voltage".to_string(),
            "Check that the entered phase count matches the circuit".to_string(),
            "Report persistent deviations to the network operator".to_string(),
        ]
    }
}
