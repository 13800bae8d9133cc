//! Voltage Compliance - Circuit Compliance Validation Library
//!
//! Real-time normative validation of branch circuits for VoltageEMS:
//! - Normative rules (cable ampacity, voltage drop, protection sizing,
//!   loop impedance, supply range, cable rating, selectivity)
//! - Per-field input constraints for keystroke feedback
//! - Bounded LRU result cache keyed by a fingerprint of rule inputs
//! - Debounced per-entity scheduling with push notifications
//! - Execution metrics and health classification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Scheduler  │────▶│    Engine    │────▶│ RuleRegistry │
//! │ (debounce)  │     │  (validate)  │     │   (7 rules)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!        │               │         │               │
//!        ▼               ▼         ▼               ▼
//! ┌─────────────┐ ┌───────────┐ ┌─────────┐ ┌───────────────┐
//! │  broadcast  │ │ResultCache│ │ Metrics │ │ ReferenceData │
//! │   events    │ │   (LRU)   │ │ (rings) │ │  (catalogs)   │
//! └─────────────┘ └───────────┘ └─────────┘ └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use voltage_compliance::{fields, CircuitRecord, ValidateOptions, ValidationEngine};
//!
//! let engine = ValidationEngine::with_defaults();
//! let circuit = CircuitRecord::new("SK-1")
//!     .with(fields::CURRENT, 63)
//!     .with(fields::CABLE_GAUGE, 6);
//!
//! let result = engine.validate_circuit(&circuit, ValidateOptions::default());
//! assert!(!result.is_valid);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod metrics;
pub mod reference;
pub mod rules;
pub mod scheduler;
pub mod types;

pub use cache::{fingerprint, CacheStats, LruCache, ResultCache};
pub use config::ComplianceConfig;
pub use engine::{ValidateOptions, ValidationEngine};
pub use error::{ComplianceError, Result, RuleFault};
pub use input::{validate_input_value, InputCheck};
pub use metrics::{HealthStatus, MetricsSnapshot};
pub use reference::{
    CableCatalog, CableProvider, ProtectionCatalog, ProtectionProvider, ReferenceData,
    StandardsCatalog, StandardsProvider,
};
pub use rules::{Rule, RuleRegistry};
pub use scheduler::{DebouncedScheduler, ValidationEvent, ValidationHandle};
pub use types::{
    fields, BatchResult, CircuitRecord, FieldValue, InputError, NonConformity, PendingRule,
    RuleCategory, RuleDescriptor, RuleOutcome, Severity, ValidationResult, Violation,
};
