//! Circuit table loading
//!
//! Accepts a JSON or YAML document holding either a bare array of circuit
//! records or an object with a `circuits` array.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use voltage_compliance::CircuitRecord;

#[derive(Deserialize)]
#[serde(untagged)]
enum CircuitTable {
    Bare(Vec<CircuitRecord>),
    Wrapped { circuits: Vec<CircuitRecord> },
}

impl From<CircuitTable> for Vec<CircuitRecord> {
    fn from(table: CircuitTable) -> Self {
        match table {
            CircuitTable::Bare(circuits) | CircuitTable::Wrapped { circuits } => circuits,
        }
    }
}

/// Load circuits from `path`, format chosen by extension
pub fn load_circuits(path: &Path) -> Result<Vec<CircuitRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("json")
        .to_ascii_lowercase();

    let table: CircuitTable = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML circuit table: {}", path.display()))?,
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON circuit table: {}", path.display()))?,
        other => bail!("Unsupported circuit table format: {}", other),
    };

    Ok(table.into())
}

/// Parse one stdin line in watch mode
pub fn parse_record(line: &str) -> Result<CircuitRecord> {
    serde_json::from_str(line).context("Expected one JSON circuit record per line")
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tempfile::TempDir;
    use voltage_compliance::fields;

    #[test]
    fn test_load_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("circuits.json");
        std::fs::write(&path, r#"[{"id": "SK-1", "current": 16, "cableGauge": 2.5}]"#).unwrap();

        let circuits = load_circuits(&path).unwrap();
        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].number(fields::CABLE_GAUGE), Some(2.5));
    }

    #[test]
    fn test_load_wrapped_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("circuits.yaml");
        std::fs::write(
            &path,
            "circuits:\n  - id: 1\n    current: 63\n    cableGauge: 6\n  - id: SK-2\n    voltage: 230\n",
        )
        .unwrap();

        let circuits = load_circuits(&path).unwrap();
        assert_eq!(circuits.len(), 2);
        assert_eq!(circuits[0].id, "1");
        assert_eq!(circuits[0].number(fields::CURRENT), Some(63.0));
        assert_eq!(circuits[1].id, "SK-2");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("circuits.csv");
        std::fs::write(&path, "id,current\n").unwrap();
        assert!(load_circuits(&path).is_err());
    }

    #[test]
    fn test_parse_record_line() {
        let record = parse_record(r#"{"id": "SK-9", "voltage": "230"}"#).unwrap();
        assert_eq!(record.number(fields::VOLTAGE), Some(230.0));
        assert!(parse_record("not json").is_err());
    }
}
