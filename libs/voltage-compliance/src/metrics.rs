//! Execution metrics
//!
//! Counters plus two bounded FIFO rings (slow executions, rule faults).
//! Health is derived from the counters on every snapshot.

use crate::cache::CacheStats;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Health band derived from the rule fault rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Excellent,
    Good,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Classify an error rate in [0, 1]
    pub fn from_error_rate(rate: f64) -> Self {
        if rate < 0.01 {
            HealthStatus::Excellent
        } else if rate < 0.05 {
            HealthStatus::Good
        } else if rate < 0.15 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Critical
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Validation pass that exceeded the slow threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowExecution {
    pub circuit_id: String,
    pub duration_us: u64,
    pub rules_executed: usize,
    pub timestamp: DateTime<Utc>,
}

/// Rule fault caught at the rule boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub circuit_id: String,
    pub rule_code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Counters {
    executions: u64,
    total_us: u64,
    min_us: Option<u64>,
    max_us: u64,
    rule_executions: u64,
    rule_faults: u64,
    slow: VecDeque<SlowExecution>,
    faults: VecDeque<FaultRecord>,
}

/// Point-in-time copy of the engine metrics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub executions: u64,
    pub avg_duration_us: f64,
    pub min_duration_us: u64,
    pub max_duration_us: u64,
    pub rule_executions: u64,
    pub rule_faults: u64,
    pub error_rate: f64,
    pub health: HealthStatus,
    pub slow_executions: Vec<SlowExecution>,
    pub recent_faults: Vec<FaultRecord>,
    pub cache: CacheStats,
}

/// Engine execution metrics
pub struct ExecutionMetrics {
    slow_threshold: Duration,
    slow_capacity: usize,
    fault_capacity: usize,
    counters: Mutex<Counters>,
}

impl ExecutionMetrics {
    pub fn new(slow_threshold: Duration, slow_capacity: usize, fault_capacity: usize) -> Self {
        Self {
            slow_threshold,
            slow_capacity,
            fault_capacity,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Record one evaluated (non-cached) validation pass
    pub fn record_execution(&self, circuit_id: &str, duration: Duration, rules_executed: usize) {
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let mut c = self.counters.lock();
        c.executions += 1;
        c.total_us = c.total_us.saturating_add(us);
        c.min_us = Some(c.min_us.map_or(us, |m| m.min(us)));
        c.max_us = c.max_us.max(us);
        c.rule_executions += rules_executed as u64;

        if duration > self.slow_threshold {
            tracing::warn!(
                "Slow validation: {} took {}us ({} rules)",
                circuit_id,
                us,
                rules_executed
            );
            push_bounded(
                &mut c.slow,
                self.slow_capacity,
                SlowExecution {
                    circuit_id: circuit_id.to_string(),
                    duration_us: us,
                    rules_executed,
                    timestamp: Utc::now(),
                },
            );
        }
    }

    pub fn record_fault(&self, circuit_id: &str, rule_code: &str, message: &str) {
        let mut c = self.counters.lock();
        c.rule_faults += 1;
        push_bounded(
            &mut c.faults,
            self.fault_capacity,
            FaultRecord {
                circuit_id: circuit_id.to_string(),
                rule_code: rule_code.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
            },
        );
    }

    pub fn snapshot(&self, cache: CacheStats) -> MetricsSnapshot {
        let c = self.counters.lock();
        let error_rate = if c.rule_executions == 0 {
            0.0
        } else {
            c.rule_faults as f64 / c.rule_executions as f64
        };
        let health = if c.executions == 0 {
            HealthStatus::Excellent
        } else {
            HealthStatus::from_error_rate(error_rate)
        };

        MetricsSnapshot {
            executions: c.executions,
            avg_duration_us: if c.executions == 0 {
                0.0
            } else {
                c.total_us as f64 / c.executions as f64
            },
            min_duration_us: c.min_us.unwrap_or(0),
            max_duration_us: c.max_us,
            rule_executions: c.rule_executions,
            rule_faults: c.rule_faults,
            error_rate,
            health,
            slow_executions: c.slow.iter().cloned().collect(),
            recent_faults: c.faults.iter().cloned().collect(),
            cache,
        }
    }

    pub fn health(&self) -> HealthStatus {
        self.snapshot(CacheStats::default()).health
    }

    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}

impl fmt::Debug for ExecutionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionMetrics")
            .field("slow_threshold", &self.slow_threshold)
            .field("executions", &self.counters.lock().executions)
            .finish()
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, capacity: usize, item: T) {
    if capacity == 0 {
        return;
    }
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ExecutionMetrics {
        ExecutionMetrics::new(Duration::from_millis(50), 2, 3)
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(HealthStatus::from_error_rate(0.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_error_rate(0.02), HealthStatus::Good);
        assert_eq!(HealthStatus::from_error_rate(0.10), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_error_rate(0.50), HealthStatus::Critical);
    }

    #[test]
    fn test_empty_metrics_are_excellent() {
        let snap = metrics().snapshot(CacheStats::default());
        assert_eq!(snap.executions, 0);
        assert_eq!(snap.health, HealthStatus::Excellent);
        assert_eq!(snap.avg_duration_us, 0.0);
    }

    #[test]
    fn test_duration_aggregates() {
        let m = metrics();
        m.record_execution("a", Duration::from_micros(100), 3);
        m.record_execution("b", Duration::from_micros(300), 3);

        let snap = m.snapshot(CacheStats::default());
        assert_eq!(snap.executions, 2);
        assert_eq!(snap.min_duration_us, 100);
        assert_eq!(snap.max_duration_us, 300);
        assert_eq!(snap.avg_duration_us, 200.0);
        assert_eq!(snap.rule_executions, 6);
        assert!(snap.slow_executions.is_empty());
    }

    #[test]
    fn test_slow_ring_evicts_oldest() {
        let m = metrics();
        for id in ["a", "b", "c"] {
            m.record_execution(id, Duration::from_millis(80), 1);
        }
        let snap = m.snapshot(CacheStats::default());
        let ids: Vec<_> = snap.slow_executions.iter().map(|s| s.circuit_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_faults_drive_health() {
        let m = metrics();
        m.record_execution("a", Duration::from_micros(10), 4);
        m.record_fault("a", "BROKEN", "boom");

        let snap = m.snapshot(CacheStats::default());
        assert_eq!(snap.rule_faults, 1);
        assert_eq!(snap.error_rate, 0.25);
        assert_eq!(snap.health, HealthStatus::Critical);
        assert_eq!(snap.recent_faults[0].rule_code, "BROKEN");

        m.reset();
        assert_eq!(m.health(), HealthStatus::Excellent);
    }
}
