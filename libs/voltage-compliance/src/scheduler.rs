//! Debounced validation scheduler
//!
//! Coalesces bursts of edits per entity into a single evaluation:
//!
//! ```text
//!   schedule(A, d1) ──┐
//!   schedule(A, d2) ──┼─ cancels previous timer ─┐
//!   schedule(A, d3) ──┘                          ▼
//!                                     [debounce delay] ─► validate(d3)
//!                                                          │
//!                                    handle ◄──────────────┤
//!                                    callback ◄────────────┤
//!                                    broadcast event ◄─────┘
//! ```
//!
//! Each pending entity owns one timer task and one `CancellationToken`.
//! Distinct entities never affect each other. Evaluations of the same entity
//! are serialised through a per-entity gate.

use crate::config::SchedulerConfig;
use crate::engine::{ValidateOptions, ValidationEngine};
use crate::error::{ComplianceError, Result};
use crate::types::{CircuitRecord, ValidationResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Push notification for one completed scheduled evaluation
#[derive(Debug, Clone)]
pub struct ValidationEvent {
    pub entity_id: String,
    pub result: Arc<ValidationResult>,
}

/// Future returned by `schedule_validation`
///
/// Resolves to the result, or to `ComplianceError::Cancelled` when the
/// schedule was superseded or cancelled before it fired.
#[derive(Debug)]
pub struct ValidationHandle {
    entity_id: String,
    rx: oneshot::Receiver<Result<Arc<ValidationResult>>>,
}

impl ValidationHandle {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Future for ValidationHandle {
    type Output = Result<Arc<ValidationResult>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a result: the task was torn down
            Poll::Ready(Err(_)) => Poll::Ready(Err(ComplianceError::Cancelled(this.entity_id.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct PendingSlot {
    generation: u64,
    token: CancellationToken,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

struct Shared {
    engine: Arc<ValidationEngine>,
    delay: Duration,
    options: ValidateOptions,
    pending: Mutex<FxHashMap<String, PendingSlot>>,
    gates: Mutex<FxHashMap<String, Gate>>,
    events: broadcast::Sender<ValidationEvent>,
    generation: AtomicU64,
}

impl Shared {
    /// Remove the pending slot only if it still belongs to `generation`
    fn clear_slot(&self, entity_id: &str, generation: u64) {
        let mut pending = self.pending.lock();
        if pending.get(entity_id).is_some_and(|s| s.generation == generation) {
            pending.remove(entity_id);
        }
    }

    fn gate(&self, entity_id: &str) -> Gate {
        self.gates
            .lock()
            .entry(entity_id.to_string())
            .or_default()
            .clone()
    }

    fn release_gate(&self, entity_id: &str, gate: Gate) {
        let mut gates = self.gates.lock();
        // Map entry plus our clone: nobody else is waiting
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(entity_id);
        }
    }
}

/// Per-entity debounced scheduler over a shared engine
///
/// Must be used from within a Tokio runtime. Dropping the scheduler cancels
/// every pending timer.
pub struct DebouncedScheduler {
    shared: Arc<Shared>,
}

impl DebouncedScheduler {
    pub fn new(engine: Arc<ValidationEngine>, config: &SchedulerConfig) -> Self {
        Self::with_delay(engine, config.debounce(), config.event_buffer)
    }

    pub fn with_delay(engine: Arc<ValidationEngine>, delay: Duration, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let options = engine.default_options();
        Self {
            shared: Arc::new(Shared {
                engine,
                delay,
                options,
                pending: Mutex::new(FxHashMap::default()),
                gates: Mutex::new(FxHashMap::default()),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.shared.delay
    }

    /// Receive one event per completed (non-cancelled) evaluation
    pub fn subscribe(&self) -> broadcast::Receiver<ValidationEvent> {
        self.shared.events.subscribe()
    }

    /// Schedule a validation, superseding any pending one for `entity_id`
    pub fn schedule_validation(&self, entity_id: impl Into<String>, data: CircuitRecord) -> ValidationHandle {
        self.schedule(entity_id.into(), data, None)
    }

    /// As `schedule_validation`, invoking `callback` with the result before
    /// the handle resolves
    pub fn schedule_validation_with<F>(
        &self,
        entity_id: impl Into<String>,
        data: CircuitRecord,
        callback: F,
    ) -> ValidationHandle
    where
        F: FnOnce(&ValidationResult) + Send + 'static,
    {
        self.schedule(entity_id.into(), data, Some(Box::new(callback)))
    }

    fn schedule(
        &self,
        entity_id: String,
        data: CircuitRecord,
        callback: Option<Box<dyn FnOnce(&ValidationResult) + Send>>,
    ) -> ValidationHandle {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed);

        let previous = self.shared.pending.lock().insert(
            entity_id.clone(),
            PendingSlot {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!("Superseded pending validation for {}", entity_id);
        }

        let shared = Arc::clone(&self.shared);
        let id = entity_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = tx.send(Err(ComplianceError::Cancelled(id)));
                    return;
                }
                _ = tokio::time::sleep(shared.delay) => {}
            }

            let gate = shared.gate(&id);
            {
                let _running = gate.lock().await;

                // Superseded while an earlier evaluation held the gate
                if token.is_cancelled() {
                    let _ = tx.send(Err(ComplianceError::Cancelled(id.clone())));
                } else {
                    let result = Arc::new(shared.engine.validate_circuit(&data, shared.options));
                    shared.clear_slot(&id, generation);

                    if let Some(callback) = callback {
                        if panic::catch_unwind(AssertUnwindSafe(|| callback(&result))).is_err() {
                            warn!("Validation callback for {} panicked", id);
                        }
                    }

                    let _ = shared.events.send(ValidationEvent {
                        entity_id: id.clone(),
                        result: Arc::clone(&result),
                    });
                    let _ = tx.send(Ok(result));
                }
            }
            shared.release_gate(&id, gate);
        });

        ValidationHandle { entity_id, rx }
    }

    /// Cancel a pending validation; unknown ids are a no-op
    pub fn cancel_validation(&self, entity_id: &str) {
        if let Some(slot) = self.shared.pending.lock().remove(entity_id) {
            slot.token.cancel();
            debug!("Cancelled pending validation for {}", entity_id);
        }
    }

    /// Cancel every pending validation
    pub fn cancel_all(&self) {
        let drained: Vec<PendingSlot> = self.shared.pending.lock().drain().map(|(_, s)| s).collect();
        if !drained.is_empty() {
            info!("Cancelling {} pending validations", drained.len());
        }
        for slot in drained {
            slot.token.cancel();
        }
    }

    pub fn is_pending(&self, entity_id: &str) -> bool {
        self.shared.pending.lock().contains_key(entity_id)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

impl Drop for DebouncedScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for DebouncedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedScheduler")
            .field("delay", &self.shared.delay)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::types::fields;

    fn scheduler(delay_ms: u64) -> DebouncedScheduler {
        DebouncedScheduler::with_delay(
            Arc::new(ValidationEngine::with_defaults()),
            Duration::from_millis(delay_ms),
            16,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = scheduler(200);
        let handle = scheduler.schedule_validation("SK-1", CircuitRecord::new("SK-1").with(fields::VOLTAGE, 230));
        assert!(scheduler.is_pending("SK-1"));
        assert_eq!(handle.entity_id(), "SK-1");

        let result = handle.await.unwrap();
        assert_eq!(result.circuit_id, "SK-1");
        assert!(!scheduler.is_pending("SK-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let scheduler = scheduler(200);
        let handle = scheduler.schedule_validation("SK-1", CircuitRecord::new("SK-1"));

        scheduler.cancel_validation("SK-1");
        scheduler.cancel_validation("SK-1");
        scheduler.cancel_validation("unknown");

        assert!(matches!(handle.await, Err(ComplianceError::Cancelled(id)) if id == "SK-1"));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_runs_before_handle() {
        let scheduler = scheduler(150);
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = scheduler.schedule_validation_with(
            "SK-2",
            CircuitRecord::new("SK-2").with(fields::VOLTAGE, 200),
            move |result| {
                let _ = tx.send(result.has_warnings);
            },
        );

        let result = handle.await.unwrap();
        assert!(result.has_warnings);
        assert!(rx.try_recv().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_on_teardown() {
        let scheduler = scheduler(200);
        let a = scheduler.schedule_validation("A", CircuitRecord::new("A"));
        let b = scheduler.schedule_validation("B", CircuitRecord::new("B"));
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.cancel_all();
        assert!(a.await.is_err());
        assert!(b.await.is_err());
        assert_eq!(scheduler.pending_count(), 0);
    }
}
