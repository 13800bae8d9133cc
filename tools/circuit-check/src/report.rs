//! Human-readable rendering of validation output

use colored::*;
use voltage_compliance::{
    BatchResult, InputCheck, NonConformity, RuleDescriptor, Severity, ValidationResult,
};

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "CRITICAL".red().bold(),
        Severity::Warning => "WARNING".yellow().bold(),
        Severity::Info => "INFO".blue(),
    }
}

fn print_non_conformity(nc: &NonConformity) {
    let code = nc.rule_code.as_deref().unwrap_or(&nc.code);
    println!("    {} {} - {}", severity_label(nc.severity), code.bold(), nc.message);
    if let (Some(actual), Some(limit)) = (nc.actual, nc.limit) {
        let unit = nc.unit.as_deref().unwrap_or("");
        println!(
            "      actual {} {}, limit {} {} ({})",
            actual,
            unit,
            limit,
            unit,
            nc.norm_reference.dimmed()
        );
    }
    for remedy in &nc.remedy_options {
        println!("      {} {}", "→".cyan(), remedy);
    }
}

/// Findings for one circuit
pub fn print_result(result: &ValidationResult) {
    let status = if !result.is_valid {
        "✗".red().bold()
    } else if result.has_warnings {
        "!".yellow().bold()
    } else {
        "✓".green().bold()
    };
    let cached = if result.from_cache() { " (cached)" } else { "" };

    println!(
        "{} {} - {} rules executed, {} skipped{}",
        status,
        result.circuit_id.bold(),
        result.summary.rules_executed,
        result.summary.skipped.len(),
        cached.dimmed()
    );

    for error in &result.input_errors {
        println!("    {} {}", "INPUT".magenta(), error.message);
    }
    for nc in &result.non_conformities {
        print_non_conformity(nc);
    }
}

/// All circuits plus the batch totals
pub fn print_batch(batch: &BatchResult) {
    for result in &batch.results {
        print_result(result);
    }

    println!();
    println!("{}", "Summary".bright_cyan().bold());
    println!("  Circuits:        {}", batch.total_circuits);
    println!("  Valid:           {}", batch.valid_circuits.to_string().green());
    println!("  With issues:     {}", batch.circuits_with_issues);
    println!("  Critical issues: {}", batch.critical_issues.to_string().red());
    println!("  Warnings:        {}", batch.warnings.to_string().yellow());
    println!(
        "  Time:            {:.2} ms ({:.3} ms/circuit)",
        batch.total_time_ms, batch.avg_time_per_circuit_ms
    );
}

pub fn print_input_check(field: &str, value: &str, check: &InputCheck) {
    match &check.error {
        None => println!("{} {} = {}", "✓".green().bold(), field, value),
        Some(error) => println!("{} {}", "✗".red().bold(), error),
    }
}

pub fn print_rules(rules: &[RuleDescriptor]) {
    println!(
        "{:<22} {:<9} {:<14} {}",
        "CODE".bold(),
        "SEVERITY".bold(),
        "CATEGORY".bold(),
        "REQUIRED FIELDS".bold()
    );
    for rule in rules {
        println!(
            "{:<22} {:<9} {:<14} {}",
            rule.code,
            rule.severity.to_string(),
            rule.category.to_string(),
            rule.required_fields.join(", ")
        );
        println!("  {} ({})", rule.name, rule.norm_reference.dimmed());
    }
}
