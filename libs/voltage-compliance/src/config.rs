//! Engine configuration
//!
//! Layering (lowest to highest priority):
//! 1. Built-in defaults
//! 2. Optional config file (toml / yaml / json, by extension)
//! 3. Environment variables, e.g. `COMPLIANCE_CACHE__CAPACITY=1000`

use crate::error::{ComplianceError, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "COMPLIANCE_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub metrics: MetricsConfig,
    pub validation: ValidationDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached results; 0 disables caching
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
    /// Capacity of the completion event channel
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            event_buffer: 64,
        }
    }
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub slow_threshold_ms: u64,
    pub slow_log_capacity: usize,
    pub fault_log_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 50,
            slow_log_capacity: 50,
            fault_log_capacity: 100,
        }
    }
}

impl MetricsConfig {
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

/// Options returned by `ValidationEngine::default_options()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationDefaults {
    pub use_cache: bool,
    pub validate_inputs: bool,
}

impl Default for ValidationDefaults {
    fn default() -> Self {
        Self {
            use_cache: true,
            validate_inputs: true,
        }
    }
}

impl ComplianceConfig {
    /// Load defaults, then `path` if given, then `COMPLIANCE_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ComplianceConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ComplianceError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ComplianceError::config("Config file must have an extension"))?;

            figment = match extension {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => {
                    return Err(ComplianceError::config(format!(
                        "Unsupported config file format: {}",
                        extension
                    )))
                },
            };
        }

        let config: ComplianceConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.debounce_ms == 0 {
            return Err(ComplianceError::invalid_config(
                "scheduler.debounce_ms must be greater than 0",
            ));
        }
        if self.scheduler.event_buffer == 0 {
            return Err(ComplianceError::invalid_config(
                "scheduler.event_buffer must be greater than 0",
            ));
        }
        if self.metrics.slow_log_capacity == 0 || self.metrics.fault_log_capacity == 0 {
            return Err(ComplianceError::invalid_config(
                "metrics log capacities must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ComplianceConfig::default();
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.scheduler.debounce(), Duration::from_millis(200));
        assert_eq!(config.metrics.slow_threshold(), Duration::from_millis(50));
        assert!(config.validation.use_cache);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_overrides_partially() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "compliance.yaml",
            "cache:\n  capacity: 10\nscheduler:\n  debounce_ms: 150\n",
        );

        let config = ComplianceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.scheduler.debounce_ms, 150);
        assert_eq!(config.scheduler.event_buffer, 64);
        assert_eq!(config.metrics.fault_log_capacity, 100);
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "compliance.toml", "[validation]\nuse_cache = false\n");

        let config = ComplianceConfig::load(Some(&path)).unwrap();
        assert!(!config.validation.use_cache);
        assert!(config.validation.validate_inputs);
    }

    #[test]
    fn test_load_rejects_zero_debounce() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "compliance.json", r#"{"scheduler": {"debounce_ms": 0}}"#);

        match ComplianceConfig::load(Some(&path)) {
            Err(ComplianceError::InvalidConfig(msg)) => assert!(msg.contains("debounce_ms")),
            other => panic!("Expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "compliance.ini", "capacity=1");
        assert!(matches!(
            ComplianceConfig::load(Some(&path)),
            Err(ComplianceError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ComplianceConfig::load(Some(Path::new("/nonexistent/compliance.yaml")));
        assert!(matches!(result, Err(ComplianceError::Config(_))));
    }
}
