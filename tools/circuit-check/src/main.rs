//! circuit-check - Compliance checks for circuit tables
//!
//! Command-line front end for the VoltageEMS compliance engine: batch
//! validation of circuit tables, single-field checks, rule listing and a
//! debounced watch mode fed from stdin.

mod loader;
mod logging;
mod report;
mod watch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use voltage_compliance::{
    ComplianceConfig, FieldValue, ReferenceData, RuleRegistry, ValidateOptions, ValidationEngine,
};

#[derive(Parser)]
#[command(name = "circuit-check")]
#[command(about = "⚡ circuit-check - Circuit compliance validation")]
#[command(long_about = "⚡ circuit-check - Circuit compliance validation

Commands:
  validate    Validate a circuit table (JSON or YAML)
  field       Check a single field value against its input constraint
  rules       List the registered normative rules
  watch       Debounced validation of JSON records read from stdin

Examples:
  circuit-check validate circuits.yaml           # Colored report
  circuit-check validate circuits.json --json    # Machine-readable output
  circuit-check field cableGauge 2,5             # Keystroke check
  circuit-check watch --delay-ms 150 < edits.jsonl

Configuration is read from --config, then COMPLIANCE_* environment
variables (e.g. COMPLIANCE_CACHE__CAPACITY=1000).")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (toml, yaml or json)
    #[arg(short = 'c', long = "config", global = true, env = "COMPLIANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every circuit in a table file
    Validate {
        /// Circuit table (JSON or YAML array of records)
        file: PathBuf,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,

        /// Evaluate every circuit, bypassing the result cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Check one field value against its input constraint
    Field {
        /// Field name, e.g. cableGauge
        field: String,

        /// Value as typed
        value: String,
    },

    /// List registered rules
    Rules {
        /// Print rule descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate records streamed on stdin with per-circuit debouncing
    Watch {
        /// Debounce delay in milliseconds (default: scheduler.debounce_ms)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Print each result as one JSON line
        #[arg(long)]
        json: bool,
    },
}

fn build_engine(config: &ComplianceConfig) -> ValidationEngine {
    ValidationEngine::new(RuleRegistry::standard(), ReferenceData::default(), config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    logging::init(&cli.log_level, !cli.no_color)?;

    let config =
        ComplianceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Validate {
            file,
            json,
            no_cache,
        } => {
            let circuits = loader::load_circuits(&file)?;
            let engine = build_engine(&config);
            let mut options = engine.default_options();
            if no_cache {
                options = ValidateOptions {
                    use_cache: false,
                    ..options
                };
            }

            let batch = engine.validate_all_circuits_with(&circuits, options);
            if json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                report::print_batch(&batch);
            }

            // Exit status 2 signals critical findings
            if batch.critical_issues > 0 {
                return Ok(ExitCode::from(2));
            }
        },
        Commands::Field { field, value } => {
            let engine = build_engine(&config);
            let check = engine.validate_input_value(&field, &FieldValue::from(value.as_str()));
            report::print_input_check(&field, &value, &check);
            if !check.valid {
                return Ok(ExitCode::from(1));
            }
        },
        Commands::Rules { json } => {
            let rules = RuleRegistry::standard().descriptors();
            if json {
                println!("{}", serde_json::to_string_pretty(&rules)?);
            } else {
                report::print_rules(&rules);
            }
        },
        Commands::Watch { delay_ms, json } => {
            let delay = delay_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.scheduler.debounce());
            if delay.is_zero() {
                anyhow::bail!("--delay-ms must be greater than 0");
            }
            let engine = Arc::new(build_engine(&config));
            watch::run(engine, delay, config.scheduler.event_buffer, json).await?;
        },
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate_flags() {
        let cli =
            Cli::try_parse_from(["circuit-check", "validate", "c.yaml", "--json", "--no-cache"]);
        match cli.map(|c| c.command) {
            Ok(Commands::Validate {
                file,
                json,
                no_cache,
            }) => {
                assert_eq!(file, PathBuf::from("c.yaml"));
                assert!(json);
                assert!(no_cache);
            },
            _ => panic!("Expected validate command"),
        }
    }

    #[test]
    fn test_parse_watch_delay() {
        let cli = Cli::try_parse_from([
            "circuit-check",
            "--log-level",
            "debug",
            "watch",
            "--delay-ms",
            "150",
        ]);
        match cli {
            Ok(cli) => {
                assert_eq!(cli.log_level, "debug");
                assert!(matches!(cli.command, Commands::Watch { delay_ms: Some(150), .. }));
            },
            Err(e) => panic!("Parse failed: {}", e),
        }
    }
}
