//! Watch mode: debounced validation of records streamed on stdin
//!
//! Each line is one JSON circuit record. Edits to the same circuit id
//! arriving within the debounce window collapse into one evaluation.

use crate::loader::parse_record;
use crate::report::print_result;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use voltage_compliance::{ComplianceError, DebouncedScheduler, ValidationEngine, ValidationResult};

type Settled = voltage_compliance::Result<Arc<ValidationResult>>;

/// Totals for one watch session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub evaluated: usize,
    pub superseded: usize,
    pub skipped_lines: usize,
    /// Most validations in flight at once
    pub peak_in_flight: usize,
}

impl WatchSummary {
    fn settle(&mut self, joined: std::result::Result<Settled, JoinError>) {
        match joined {
            Ok(Ok(_)) => {},
            Ok(Err(ComplianceError::Cancelled(_))) => self.superseded += 1,
            Ok(Err(e)) => warn!("Validation failed: {}", e),
            Err(e) => warn!("Validation task failed: {}", e),
        }
    }
}

pub async fn run(
    engine: Arc<ValidationEngine>,
    delay: Duration,
    event_buffer: usize,
    json: bool,
) -> Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    let summary = watch_lines(Arc::clone(&engine), delay, event_buffer, json, input).await?;

    let metrics = engine.metrics();
    info!(
        "Watch finished: {} evaluations, {} superseded, {} skipped lines, peak {} in flight, \
         cache hit rate {:.0}%, health {}",
        summary.evaluated,
        summary.superseded,
        summary.skipped_lines,
        summary.peak_in_flight,
        metrics.cache.hit_rate * 100.0,
        metrics.health
    );
    Ok(())
}

/// Schedule every record read from `input` until EOF, then wait for the
/// remaining validations
pub async fn watch_lines<R>(
    engine: Arc<ValidationEngine>,
    delay: Duration,
    event_buffer: usize,
    json: bool,
    input: R,
) -> Result<WatchSummary>
where
    R: AsyncBufRead + Unpin,
{
    let scheduler = DebouncedScheduler::with_delay(engine, delay, event_buffer);
    let mut events = scheduler.subscribe();

    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    if json {
                        match serde_json::to_string(event.result.as_ref()) {
                            Ok(line) => println!("{}", line),
                            Err(e) => warn!("Failed to serialize result: {}", e),
                        }
                    } else {
                        print_result(&event.result);
                    }
                    printed += 1;
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output lagging, {} results dropped", skipped);
                },
                Err(RecvError::Closed) => break,
            }
        }
        printed
    });

    info!("Watching input, debounce {}ms", delay.as_millis());

    let mut summary = WatchSummary::default();
    let mut in_flight: JoinSet<Settled> = JoinSet::new();
    let mut lines = input.lines();
    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                summary.settle(joined);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_record(line) {
                    Ok(record) => {
                        debug!("Edit received for {}", record.id);
                        in_flight.spawn(scheduler.schedule_validation(record.id.clone(), record));
                        summary.peak_in_flight = summary.peak_in_flight.max(in_flight.len());
                    },
                    Err(e) => {
                        warn!("Skipping line: {:#}", e);
                        summary.skipped_lines += 1;
                    },
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        summary.settle(joined);
    }

    // Closing the scheduler closes the event channel and stops the printer
    drop(scheduler);
    summary.evaluated = printer.await?;
    Ok(summary)
}
