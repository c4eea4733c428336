//! Worker loop: pull a key, run its task in isolation, report the outcome.
//!
//! Each worker owns nothing but clones of shared handles. Cancellation is
//! checked only between tasks, so an in-flight fetch/upload always finishes.

use super::types::StateTracker;
use crate::key::Key;
use crate::metrics;
use crate::resilience::RateLimiter;
use crate::store::ObjectStore;
use crate::task::{ReplicationOutcome, ReplicationTask, TaskContext};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info_span, Instrument};

/// Keys not yet handed to a worker.
pub(crate) type KeyQueue = Arc<Mutex<VecDeque<Key>>>;

/// Shared state one worker needs.
pub(crate) struct Worker<S: ObjectStore> {
    pub id: usize,
    pub queue: KeyQueue,
    pub ctx: Arc<TaskContext<S>>,
    pub outcomes: mpsc::Sender<ReplicationOutcome>,
    pub cancel_rx: watch::Receiver<bool>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub in_flight: Arc<AtomicUsize>,
    pub state: StateTracker,
}

impl<S: ObjectStore> Worker<S> {
    pub(crate) async fn run(mut self) {
        let mut completed = 0usize;

        loop {
            if *self.cancel_rx.borrow() {
                debug!(worker = self.id, "Cancellation observed, stopping");
                break;
            }

            if let Some(limiter) = &self.rate_limiter {
                tokio::select! {
                    _ = limiter.acquire() => {}
                    Ok(()) = self.cancel_rx.changed() => continue,
                }
            }

            let Some(key) = self.queue.lock().await.pop_front() else {
                self.state.begin_draining();
                break;
            };

            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::set_in_flight(in_flight);

            let outcome = run_isolated(key, Arc::clone(&self.ctx)).await;

            let in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_in_flight(in_flight);
            metrics::record_outcome(outcome.status.as_str());
            completed += 1;

            // The receiver may be gone if the caller stopped listening; keep
            // replicating so every dispatched key still finishes.
            if self.outcomes.send(outcome).await.is_err() {
                debug!(worker = self.id, "Outcome receiver dropped");
            }
        }

        debug!(worker = self.id, completed, "Worker finished");
    }
}

/// Run one task on its own tokio task so a panic becomes a `Failed` outcome
/// instead of taking the worker down.
async fn run_isolated<S: ObjectStore>(key: Key, ctx: Arc<TaskContext<S>>) -> ReplicationOutcome {
    let started = Instant::now();
    let task = ReplicationTask::new(key.clone(), ctx);
    let span = info_span!("replicate", key = %task.key());
    let handle = tokio::spawn(task.run().instrument(span));

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(key = %key, error = %e, "Replication task panicked");
            ReplicationOutcome::failed(key, None, format!("task panicked: {}", e), started.elapsed())
        }
    }
}
