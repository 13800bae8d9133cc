//! Compliance Engine Error Types

use thiserror::Error;

/// Result type for compliance operations
pub type Result<T> = std::result::Result<T, ComplianceError>;

/// Compliance engine errors
///
/// Nothing on the validation path returns these: rule problems are folded
/// into the `ValidationResult` itself. They cover construction, configuration
/// and scheduling.
#[derive(Debug, Error)]
pub enum ComplianceError {
    /// Two rules registered under the same code
    #[error("Duplicate rule code: {0}")]
    DuplicateRule(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration loaded but holds an unusable value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Scheduled validation was superseded or cancelled before it fired
    #[error("Validation cancelled for entity: {0}")]
    Cancelled(String),
}

impl ComplianceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<figment::Error> for ComplianceError {
    fn from(err: figment::Error) -> Self {
        ComplianceError::Config(err.to_string())
    }
}

/// Programming fault raised by a rule's `calculate`
///
/// Recoverable domain conditions (uncatalogued gauge, unknown device type)
/// are not faults; rules report those through `RuleOutcome::Error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuleFault {
    /// Arithmetic produced NaN or infinity
    #[error("Non-finite result for {0}")]
    NonFinite(&'static str),

    /// Panic caught at the rule boundary
    #[error("Rule panicked: {0}")]
    Panicked(String),

    /// Any other internal inconsistency
    #[error("Internal rule fault: {0}")]
    Internal(String),
}

impl RuleFault {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Return `value` if finite, otherwise a `NonFinite` fault naming the quantity
pub(crate) fn ensure_finite(value: f64, quantity: &'static str) -> std::result::Result<f64, RuleFault> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RuleFault::NonFinite(quantity))
    }
}
