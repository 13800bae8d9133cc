//! Reference data providers
//!
//! Read-only catalogs consulted by rules: cable ampacity and rated voltage,
//! protection device characteristics, and normative thresholds. Lookups are
//! synchronous and pure; a miss returns `None` and the calling rule reports
//! it as a domain error.
//!
//! The built-in catalogs hold copper/PVC values for installation method C
//! (IEC 60364-5-52 Table B.52.4/B.52.5, DIN VDE 0298-4).

use std::sync::Arc;

// ============================================================================
// Provider Traits
// ============================================================================

/// Rated voltage of a cable type, U0/U in volts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CableVoltageRating {
    /// Conductor to earth
    pub u0: f64,
    /// Conductor to conductor
    pub u: f64,
}

/// Cable catalog: ampacity per gauge and rated voltage per cable type
pub trait CableProvider: Send + Sync {
    /// Current-carrying capacity in A for `loaded_conductors` (2 or 3)
    fn ampacity(&self, gauge_mm2: f64, loaded_conductors: u8) -> Option<f64>;

    /// Catalogued gauges in ascending order
    fn gauges(&self) -> Vec<f64>;

    /// Rated voltage for a cable type designation (e.g. "NYM-J 3x2,5")
    fn voltage_rating(&self, cable_type: &str) -> Option<CableVoltageRating>;
}

/// Tripping characteristics of a protection device family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCharacteristics {
    /// Multiple of In that guarantees disconnection within the required time
    pub instantaneous_trip_multiple: f64,
    /// Conventional tripping current I2 as a multiple of In
    pub conventional_trip_factor: f64,
    pub is_fuse: bool,
}

/// Protection device catalog
pub trait ProtectionProvider: Send + Sync {
    fn is_standard_rating(&self, rating_a: f64) -> bool;

    /// Catalogued ratings in ascending order
    fn ratings(&self) -> Vec<f64>;

    fn device(&self, device_type: &str) -> Option<DeviceCharacteristics>;

    /// Minimum upstream/downstream rating ratio for selectivity
    ///
    /// Device types may be absent; the catalog then returns its generic ratio.
    fn selectivity_ratio(&self, upstream: Option<&str>, downstream: Option<&str>) -> Option<f64>;
}

/// Normative thresholds
pub trait StandardsProvider: Send + Sync {
    /// Maximum voltage drop for final circuits, percent of nominal
    fn max_voltage_drop_percent(&self) -> f64;

    /// Nominal system voltage for a phase count
    fn nominal_voltage(&self, phases: u8) -> Option<f64>;

    /// Permitted supply deviation from nominal, percent
    fn voltage_tolerance_percent(&self) -> f64;

    /// Conductor conductivity in m/(Ohm*mm2)
    fn conductivity(&self) -> f64;

    /// Voltage factor applied to U0 in the loop impedance check
    fn min_voltage_factor(&self) -> f64;
}

/// The three providers handed to every rule
#[derive(Clone)]
pub struct ReferenceData {
    pub cables: Arc<dyn CableProvider>,
    pub protection: Arc<dyn ProtectionProvider>,
    pub standards: Arc<dyn StandardsProvider>,
}

impl ReferenceData {
    pub fn new(
        cables: Arc<dyn CableProvider>,
        protection: Arc<dyn ProtectionProvider>,
        standards: Arc<dyn StandardsProvider>,
    ) -> Self {
        Self {
            cables,
            protection,
            standards,
        }
    }
}

impl Default for ReferenceData {
    fn default() -> Self {
        Self::new(
            Arc::new(CableCatalog::default()),
            Arc::new(ProtectionCatalog::default()),
            Arc::new(StandardsCatalog::default()),
        )
    }
}

impl std::fmt::Debug for ReferenceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceData")
            .field("cables", &"<provider>")
            .field("protection", &"<provider>")
            .field("standards", &"<provider>")
            .finish()
    }
}

// ============================================================================
// Cable Catalog
// ============================================================================

/// One ampacity row: gauge, 2 loaded conductors, 3 loaded conductors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmpacityRow {
    pub gauge_mm2: f64,
    pub two_loaded: f64,
    pub three_loaded: f64,
}

#[derive(Debug, Clone)]
pub struct CableCatalog {
    rows: Vec<AmpacityRow>,
    /// (designation prefix, rating), longest prefix wins
    ratings: Vec<(String, CableVoltageRating)>,
}

const DEFAULT_AMPACITY: &[(f64, f64, f64)] = &[
    (1.5, 19.5, 17.5),
    (2.5, 27.0, 24.0),
    (4.0, 36.0, 32.0),
    (6.0, 46.0, 41.0),
    (10.0, 63.0, 57.0),
    (16.0, 85.0, 76.0),
    (25.0, 112.0, 96.0),
    (35.0, 138.0, 119.0),
    (50.0, 168.0, 144.0),
    (70.0, 213.0, 184.0),
    (95.0, 258.0, 223.0),
    (120.0, 299.0, 259.0),
];

const DEFAULT_CABLE_RATINGS: &[(&str, f64, f64)] = &[
    ("NYM", 300.0, 500.0),
    ("H05VV", 300.0, 500.0),
    ("H07V", 450.0, 750.0),
    ("H07RN", 450.0, 750.0),
    ("NYY", 600.0, 1000.0),
    ("NYCWY", 600.0, 1000.0),
    ("NAYY", 600.0, 1000.0),
    ("N2XH", 600.0, 1000.0),
];

impl CableCatalog {
    pub fn new(mut rows: Vec<AmpacityRow>, ratings: Vec<(String, CableVoltageRating)>) -> Self {
        rows.sort_by(|a, b| a.gauge_mm2.total_cmp(&b.gauge_mm2));
        Self { rows, ratings }
    }
}

impl Default for CableCatalog {
    fn default() -> Self {
        let rows = DEFAULT_AMPACITY
            .iter()
            .map(|&(gauge_mm2, two_loaded, three_loaded)| AmpacityRow {
                gauge_mm2,
                two_loaded,
                three_loaded,
            })
            .collect();
        let ratings = DEFAULT_CABLE_RATINGS
            .iter()
            .map(|&(prefix, u0, u)| (prefix.to_string(), CableVoltageRating { u0, u }))
            .collect();
        Self::new(rows, ratings)
    }
}

impl CableProvider for CableCatalog {
    fn ampacity(&self, gauge_mm2: f64, loaded_conductors: u8) -> Option<f64> {
        let row = self
            .rows
            .iter()
            .find(|r| (r.gauge_mm2 - gauge_mm2).abs() < 1e-6)?;
        Some(if loaded_conductors >= 3 {
            row.three_loaded
        } else {
            row.two_loaded
        })
    }

    fn gauges(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.gauge_mm2).collect()
    }

    fn voltage_rating(&self, cable_type: &str) -> Option<CableVoltageRating> {
        let designation = cable_type.trim().to_ascii_uppercase();
        self.ratings
            .iter()
            .filter(|(prefix, _)| designation.starts_with(&prefix.to_ascii_uppercase()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, rating)| *rating)
    }
}

// ============================================================================
// Protection Catalog
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProtectionCatalog {
    ratings: Vec<f64>,
    devices: Vec<(String, DeviceCharacteristics)>,
    fuse_over_fuse_ratio: f64,
    over_breaker_ratio: f64,
    generic_ratio: f64,
}

const DEFAULT_RATINGS: &[f64] = &[
    6.0, 10.0, 13.0, 16.0, 20.0, 25.0, 32.0, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0,
    250.0,
];

fn breaker(multiple: f64) -> DeviceCharacteristics {
    DeviceCharacteristics {
        instantaneous_trip_multiple: multiple,
        conventional_trip_factor: 1.45,
        is_fuse: false,
    }
}

fn fuse() -> DeviceCharacteristics {
    DeviceCharacteristics {
        instantaneous_trip_multiple: 8.0,
        conventional_trip_factor: 1.6,
        is_fuse: true,
    }
}

impl Default for ProtectionCatalog {
    fn default() -> Self {
        Self {
            ratings: DEFAULT_RATINGS.to_vec(),
            devices: vec![
                ("B".to_string(), breaker(5.0)),
                ("C".to_string(), breaker(10.0)),
                ("D".to_string(), breaker(20.0)),
                ("K".to_string(), breaker(14.0)),
                ("Z".to_string(), breaker(3.0)),
                ("GG".to_string(), fuse()),
                ("GL".to_string(), fuse()),
            ],
            fuse_over_fuse_ratio: 1.6,
            over_breaker_ratio: 2.0,
            generic_ratio: 1.6,
        }
    }
}

impl ProtectionProvider for ProtectionCatalog {
    fn is_standard_rating(&self, rating_a: f64) -> bool {
        self.ratings.iter().any(|r| (r - rating_a).abs() < 1e-6)
    }

    fn ratings(&self) -> Vec<f64> {
        self.ratings.clone()
    }

    fn device(&self, device_type: &str) -> Option<DeviceCharacteristics> {
        let key = device_type.trim().to_ascii_uppercase();
        self.devices
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, d)| *d)
    }

    fn selectivity_ratio(&self, upstream: Option<&str>, downstream: Option<&str>) -> Option<f64> {
        let upstream = match upstream {
            Some(t) => Some(self.device(t)?),
            None => None,
        };
        let downstream = match downstream {
            Some(t) => Some(self.device(t)?),
            None => None,
        };
        let ratio = match (upstream, downstream) {
            (Some(up), Some(down)) if up.is_fuse && down.is_fuse => self.fuse_over_fuse_ratio,
            (_, Some(down)) if !down.is_fuse => self.over_breaker_ratio,
            _ => self.generic_ratio,
        };
        Some(ratio)
    }
}

// ============================================================================
// Standards Catalog
// ============================================================================

#[derive(Debug, Clone)]
pub struct StandardsCatalog {
    pub max_voltage_drop_percent: f64,
    pub voltage_tolerance_percent: f64,
    pub nominal_single_phase: f64,
    pub nominal_three_phase: f64,
    pub conductivity: f64,
    pub min_voltage_factor: f64,
}

impl Default for StandardsCatalog {
    fn default() -> Self {
        Self {
            max_voltage_drop_percent: 3.0,
            voltage_tolerance_percent: 10.0,
            nominal_single_phase: 230.0,
            nominal_three_phase: 400.0,
            conductivity: 56.0,
            min_voltage_factor: 0.95,
        }
    }
}

impl StandardsProvider for StandardsCatalog {
    fn max_voltage_drop_percent(&self) -> f64 {
        self.max_voltage_drop_percent
    }

    fn nominal_voltage(&self, phases: u8) -> Option<f64> {
        match phases {
            1 => Some(self.nominal_single_phase),
            3 => Some(self.nominal_three_phase),
            _ => None,
        }
    }

    fn voltage_tolerance_percent(&self) -> f64 {
        self.voltage_tolerance_percent
    }

    fn conductivity(&self) -> f64 {
        self.conductivity
    }

    fn min_voltage_factor(&self) -> f64 {
        self.min_voltage_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ampacity_lookup() {
        let catalog = CableCatalog::default();
        assert_eq!(catalog.ampacity(6.0, 2), Some(46.0));
        assert_eq!(catalog.ampacity(6.0, 3), Some(41.0));
        assert_eq!(catalog.ampacity(7.0, 2), None);
    }

    #[test]
    fn test_cable_rating_longest_prefix() {
        let catalog = CableCatalog::default();
        let nym = catalog.voltage_rating("nym-j 3x2,5").map(|r| r.u);
        assert_eq!(nym, Some(500.0));
        let h07 = catalog.voltage_rating("H07RN-F 5G2,5").map(|r| r.u);
        assert_eq!(h07, Some(750.0));
        assert!(catalog.voltage_rating("XYZ").is_none());
    }

    #[test]
    fn test_selectivity_ratios() {
        let catalog = ProtectionCatalog::default();
        assert_eq!(catalog.selectivity_ratio(Some("gG"), Some("gG")), Some(1.6));
        assert_eq!(catalog.selectivity_ratio(Some("gG"), Some("B")), Some(2.0));
        assert_eq!(catalog.selectivity_ratio(None, None), Some(1.6));
        assert_eq!(catalog.selectivity_ratio(Some("Q"), None), None);
    }

    #[test]
    fn test_standard_ratings() {
        let catalog = ProtectionCatalog::default();
        assert!(catalog.is_standard_rating(16.0));
        assert!(!catalog.is_standard_rating(17.0));
    }
}
