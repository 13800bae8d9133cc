//! Protection rules: device sizing, loop impedance, selectivity

use super::{gauge_for_current, largest_at_most, loaded_conductors, round2, smallest_at_least, Rule};
use crate::error::{ensure_finite, RuleFault};
use crate::reference::ReferenceData;
use crate::types::{fields, CircuitRecord, RuleCategory, RuleOutcome, Severity, Violation};

/// Conventional trip factor assumed when no device type is given (MCB)
const DEFAULT_TRIP_FACTOR: f64 = 1.45;

const CONDITION_IB_IN: &str = "Ib <= In";
const CONDITION_IN_IZ: &str = "In <= Iz, I2 <= 1.45 * Iz";

// ============================================================================
// PROTECTION_SIZING
// ============================================================================

/// Overload protection coordination: Ib <= In <= Iz and I2 <= 1.45 * Iz
pub struct ProtectionSizingRule;

impl Rule for ProtectionSizingRule {
    fn code(&self) -> &'static str {
        "PROTECTION_SIZING"
    }

    fn name(&self) -> &'static str {
        "Protection device sizing"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Protection
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::CURRENT, fields::PROTECTION_CURRENT, fields::CABLE_GAUGE]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT, fields::PROTECTION_DEVICE_TYPE]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0100-430 / IEC 60364-4-43"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(current) = data.number(fields::CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::CURRENT));
        };
        let Some(rating) = data.number(fields::PROTECTION_CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::PROTECTION_CURRENT));
        };
        let Some(gauge) = data.number(fields::CABLE_GAUGE) else {
            return Ok(RuleOutcome::not_numeric(fields::CABLE_GAUGE));
        };
        if !refs.protection.is_standard_rating(rating) {
            return Ok(RuleOutcome::error(format!(
                "Protection rating {} A is not a standard device rating",
                rating
            )));
        }

        let trip_factor = match data.text(fields::PROTECTION_DEVICE_TYPE) {
            Some(device_type) => match refs.protection.device(&device_type) {
                Some(device) => device.conventional_trip_factor,
                None => {
                    return Ok(RuleOutcome::error(format!(
                        "Unknown protection device type '{}'",
                        device_type
                    )))
                },
            },
            None => DEFAULT_TRIP_FACTOR,
        };

        let loaded = loaded_conductors(data);
        let Some(ampacity) = refs.cables.ampacity(gauge, loaded) else {
            return Ok(RuleOutcome::error(format!(
                "Cable gauge {} mm² not found in ampacity catalog",
                gauge
            )));
        };

        if current > rating {
            return Ok(RuleOutcome::NonCompliant(
                Violation::new(
                    current,
                    rating,
                    "A",
                    format!(
                        "Operating current {} A exceeds protective device rating {} A",
                        current, rating
                    ),
                )
                .detail("condition", CONDITION_IB_IN)
                .detail("ampacity", ampacity),
            ));
        }

        let max_rating = ensure_finite(
            round2(ampacity.min(1.45 * ampacity / trip_factor)),
            "maximum protective device rating",
        )?;

        Ok(RuleOutcome::check_max(rating, max_rating, || {
            Violation::new(
                rating,
                max_rating,
                "A",
                format!(
                    "Protective device rating {} A does not protect {} mm² cable (max {} A)",
                    rating, gauge, max_rating
                ),
            )
            .detail("condition", CONDITION_IN_IZ)
            .detail("ampacity", ampacity)
            .detail("conventionalTripFactor", trip_factor)
        }))
    }

    fn remedy_options(&self, violation: &Violation, data: &CircuitRecord, refs: &ReferenceData) -> Vec<String> {
        let ratings = refs.protection.ratings();
        let current = data.number(fields::CURRENT).unwrap_or_default();
        let mut options = Vec::new();

        let condition = violation.details.get("condition").and_then(|c| c.as_str());
        if condition == Some(CONDITION_IB_IN) {
            if let Some(next) = smallest_at_least(&ratings, current) {
                options.push(format!("Select a protective device rated at least {} A", next));
            }
            if let Some(gauge) = gauge_for_current(refs, current, loaded_conductors(data)) {
                options.push(format!(
                    "Verify the cable carries the new rating (at least {} mm²)",
                    gauge
                ));
            }
        } else {
            if let Some(lower) = largest_at_most(&ratings, violation.limit).filter(|r| *r >= current) {
                options.push(format!("Reduce protective device rating to {} A", lower));
            }
            if let Some(gauge) = gauge_for_current(refs, violation.actual, loaded_conductors(data)) {
                options.push(format!("Increase cable cross-section to at least {} mm²", gauge));
            }
        }
        options
    }
}

// ============================================================================
// LOOP_IMPEDANCE
// ============================================================================

/// Automatic disconnection: Zs <= c_min * U0 / Ia
pub struct LoopImpedanceRule;

impl Rule for LoopImpedanceRule {
    fn code(&self) -> &'static str {
        "LOOP_IMPEDANCE"
    }

    fn name(&self) -> &'static str {
        "Loop impedance"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Protection
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::LOOP_IMPEDANCE,
            fields::PROTECTION_CURRENT,
            fields::PROTECTION_DEVICE_TYPE,
            fields::VOLTAGE,
        ]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PHASES_COUNT]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0100-410 / IEC 60364-4-41"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(impedance) = data.number(fields::LOOP_IMPEDANCE) else {
            return Ok(RuleOutcome::not_numeric(fields::LOOP_IMPEDANCE));
        };
        let Some(rating) = data.number(fields::PROTECTION_CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::PROTECTION_CURRENT));
        };
        let Some(voltage) = data.number(fields::VOLTAGE) else {
            return Ok(RuleOutcome::not_numeric(fields::VOLTAGE));
        };
        let device_type = data.text(fields::PROTECTION_DEVICE_TYPE).unwrap_or_default();
        let Some(device) = refs.protection.device(&device_type) else {
            return Ok(RuleOutcome::error(format!(
                "Unknown protection device type '{}'",
                device_type
            )));
        };
        if rating <= 0.0 {
            return Ok(RuleOutcome::error("Protection rating must be positive"));
        }

        let u0 = if data.phases() == 3 {
            voltage / 3f64.sqrt()
        } else {
            voltage
        };
        let trip_current = device.instantaneous_trip_multiple * rating;
        let c_min = refs.standards.min_voltage_factor();
        let max_impedance = ensure_finite(round2(c_min * u0 / trip_current), "maximum loop impedance")?;

        Ok(RuleOutcome::check_max(impedance, max_impedance, || {
            Violation::new(
                impedance,
                max_impedance,
                "Ω",
                format!(
                    "Loop impedance {} Ω exceeds {} Ω for {} {} A (Ia = {} A)",
                    impedance, max_impedance, device_type, rating, trip_current
                ),
            )
            .detail("u0", round2(u0))
            .detail("tripCurrent", trip_current)
            .detail("tripMultiple", device.instantaneous_trip_multiple)
            .detail("voltageFactor", c_min)
        }))
    }

    fn remedy_options(&self, _violation: &Violation, data: &CircuitRecord, _refs: &ReferenceData) -> Vec<String> {
        let mut options = Vec::new();
        let device_type = data.text(fields::PROTECTION_DEVICE_TYPE).unwrap_or_default();
        if !device_type.eq_ignore_ascii_case("B") {
            options.push("Use a device with a lower instantaneous trip current (type B)".to_string());
        }
        options.push("Increase conductor cross-section to reduce loop impedance".to_string());
        options.push("Provide additional protection with a 30 mA RCD".to_string());
        options
    }
}

// ============================================================================
// SELECTIVITY
// ============================================================================

/// Upstream device must be sufficiently larger than the downstream device
pub struct SelectivityRule;

impl Rule for SelectivityRule {
    fn code(&self) -> &'static str {
        "SELECTIVITY"
    }

    fn name(&self) -> &'static str {
        "Device selectivity"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Coordination
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[fields::PROTECTION_CURRENT, fields::UPSTREAM_PROTECTION_CURRENT]
    }

    fn optional_fields(&self) -> &'static [&'static str] {
        &[fields::PROTECTION_DEVICE_TYPE, fields::UPSTREAM_PROTECTION_DEVICE_TYPE]
    }

    fn norm_reference(&self) -> &'static str {
        "DIN VDE 0100-530 / IEC 60269-1"
    }

    fn calculate(&self, data: &CircuitRecord, refs: &ReferenceData) -> Result<RuleOutcome, RuleFault> {
        let Some(downstream) = data.number(fields::PROTECTION_CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::PROTECTION_CURRENT));
        };
        let Some(upstream) = data.number(fields::UPSTREAM_PROTECTION_CURRENT) else {
            return Ok(RuleOutcome::not_numeric(fields::UPSTREAM_PROTECTION_CURRENT));
        };
        if downstream <= 0.0 {
            return Ok(RuleOutcome::error("Protection rating must be positive"));
        }

        let downstream_type = data.text(fields::PROTECTION_DEVICE_TYPE);
        let upstream_type = data.text(fields::UPSTREAM_PROTECTION_DEVICE_TYPE);
        let Some(required) = refs
            .protection
            .selectivity_ratio(upstream_type.as_deref(), downstream_type.as_deref())
        else {
            return Ok(RuleOutcome::error("Unknown protection device type for selectivity"));
        };

        let ratio = round2(upstream / downstream);
        if ratio >= required {
            return Ok(RuleOutcome::Compliant);
        }

        Ok(RuleOutcome::NonCompliant(
            Violation::new(
                ratio,
                required,
                "ratio",
                format!(
                    "Upstream {} A / downstream {} A = {} is below selectivity ratio {}",
                    upstream, downstream, ratio, required
                ),
            )
            .detail("upstreamRating", upstream)
            .detail("downstreamRating", downstream)
            .detail("upstreamType", upstream_type.unwrap_or_default())
            .detail("downstreamType", downstream_type.unwrap_or_default()),
        ))
    }

    fn remedy_options(&self, violation: &Violation, data: &CircuitRecord, refs: &ReferenceData) -> Vec<String> {
        let ratings = refs.protection.ratings();
        let downstream = data.number(fields::PROTECTION_CURRENT).unwrap_or_default();
        let upstream = data
            .number(fields::UPSTREAM_PROTECTION_CURRENT)
            .unwrap_or_default();
        let mut options = Vec::new();

        if let Some(up) = smallest_at_least(&ratings, downstream * violation.limit) {
            options.push(format!("Increase upstream device rating to at least {} A", up));
        }
        if violation.limit > 0.0 {
            if let Some(down) = largest_at_most(&ratings, upstream / violation.limit) {
                options.push(format!("Reduce downstream device rating to at most {} A", down));
            }
        }
        options.push("Verify selectivity with the manufacturer's tables".to_string());
        options
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn refs() -> ReferenceData {
        ReferenceData::default()
    }

    fn violation(outcome: RuleOutcome) -> Violation {
        match outcome {
            RuleOutcome::NonCompliant(v) => v,
            other => panic!("Expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_protection_below_operating_current() {
        let data = CircuitRecord::new("SK-1")
            .with(fields::CURRENT, 20)
            .with(fields::PROTECTION_CURRENT, 16)
            .with(fields::CABLE_GAUGE, 2.5);
        let v = violation(ProtectionSizingRule.calculate(&data, &refs()).unwrap());
        assert_eq!(v.actual, 20.0);
        assert_eq!(v.limit, 16.0);

        let remedies = ProtectionSizingRule.remedy_options(&v, &data, &refs());
        assert_eq!(remedies[0], "Select a protective device rated at least 20 A");
    }

    #[test]
    fn test_protection_exceeds_cable() {
        // 1.5 mm2 carries 19.5 A, a 25 A breaker does not protect it
        let data = CircuitRecord::new("SK-2")
            .with(fields::CURRENT, 10)
            .with(fields::PROTECTION_CURRENT, 25)
            .with(fields::CABLE_GAUGE, 1.5);
        let v = violation(ProtectionSizingRule.calculate(&data, &refs()).unwrap());
        assert_eq!(v.limit, 19.5);

        let remedies = ProtectionSizingRule.remedy_options(&v, &data, &refs());
        assert_eq!(remedies[0], "Reduce protective device rating to 16 A");
    }

    #[test]
    fn test_fuse_tightens_limit() {
        // gG fuse: 1.45 * 27 / 1.6 = 24.47 A, so 25 A fails on 2.5 mm2
        let data = CircuitRecord::new("SK-3")
            .with(fields::CURRENT, 16)
            .with(fields::PROTECTION_CURRENT, 25)
            .with(fields::PROTECTION_DEVICE_TYPE, "gG")
            .with(fields::CABLE_GAUGE, 2.5);
        let v = violation(ProtectionSizingRule.calculate(&data, &refs()).unwrap());
        assert_eq!(v.limit, 24.47);
    }

    #[test]
    fn test_protection_nonstandard_rating_is_domain_error() {
        let data = CircuitRecord::new("SK-4")
            .with(fields::CURRENT, 10)
            .with(fields::PROTECTION_CURRENT, 17)
            .with(fields::CABLE_GAUGE, 2.5);
        let outcome = ProtectionSizingRule.calculate(&data, &refs()).unwrap();
        assert!(matches!(outcome, RuleOutcome::Error(_)));
    }

    #[test]
    fn test_loop_impedance_b16() {
        // 0.95 * 230 / (5 * 16) = 2.73 Ohm
        let ok = CircuitRecord::new("SK-5")
            .with(fields::LOOP_IMPEDANCE, 1.2)
            .with(fields::PROTECTION_CURRENT, 16)
            .with(fields::PROTECTION_DEVICE_TYPE, "B")
            .with(fields::VOLTAGE, 230);
        assert_eq!(LoopImpedanceRule.calculate(&ok, &refs()).unwrap(), RuleOutcome::Compliant);

        let high = ok.clone().with(fields::LOOP_IMPEDANCE, 3.1);
        let v = violation(LoopImpedanceRule.calculate(&high, &refs()).unwrap());
        assert_eq!(v.limit, 2.73);
    }

    #[test]
    fn test_selectivity_ratio() {
        let data = CircuitRecord::new("SK-6")
            .with(fields::PROTECTION_CURRENT, 16)
            .with(fields::PROTECTION_DEVICE_TYPE, "B")
            .with(fields::UPSTREAM_PROTECTION_CURRENT, 25)
            .with(fields::UPSTREAM_PROTECTION_DEVICE_TYPE, "gG");
        let v = violation(SelectivityRule.calculate(&data, &refs()).unwrap());
        assert_eq!(v.limit, 2.0);

        let remedies = SelectivityRule.remedy_options(&v, &data, &refs());
        assert_eq!(remedies[0], "Increase upstream device rating to at least 32 A");

        let fine = data.with(fields::UPSTREAM_PROTECTION_CURRENT, 35);
        // 35 A is not a catalogue value but selectivity only compares ratios
        assert_eq!(SelectivityRule.calculate(&fine, &refs()).unwrap(), RuleOutcome::Compliant);
    }
}
