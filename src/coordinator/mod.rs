// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! The orchestrator that ties together:
//! - Store connections via a [`StoreConnector`]
//! - Per-key pipelines via [`ReplicationTask`](crate::task::ReplicationTask)
//! - Bounded retry via [`RetryPolicy`](crate::resilience::RetryPolicy)
//! - Optional dispatch throttling via [`RateLimiter`]
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────── VecDeque<Key> (Mutex) ────────────┐
//!                  ▼                  ▼                  ▼        │
//!              worker 0           worker 1   ...     worker N-1   │
//!                  │                  │                  │        │
//!       spawn(ReplicationTask) per key, JoinHandle awaited        │
//!                  │                  │                  │        │
//!                  └──────── mpsc<ReplicationOutcome> ───┘        │
//!                                     │                           │
//!                                     ▼                           │
//!                          Outcomes (Stream) ◀── supervisor: leftover keys
//!                                                  become Cancelled
//! ```
//!
//! 1. Connects source and destination (connect policy + ping probe each)
//! 2. Spawns `concurrency` workers draining a shared key queue
//! 3. Streams outcomes back as they complete (no ordering across keys)
//! 4. On cancellation, stops dispatching and reports undispatched keys as
//!    `Cancelled` once in-flight tasks finish
//!
//! The engine runs one batch. Checkpointing is left to the caller, which
//! decides from the [`RunReport`] whether the batch counts as complete.

mod types;
mod worker;

pub use types::{EngineState, RunReport, RunSummary};

use crate::config::{StoreEndpoint, SyncJob};
use crate::error::{ReplicationError, Result};
use crate::key::Key;
use crate::metrics;
use crate::resilience::RateLimiter;
use crate::store::{ObjectStore, StoreConnector};
use crate::task::{ReplicationOutcome, TaskContext};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, info_span, Instrument};
use types::StateTracker;
use worker::Worker;

/// Requests graceful cancellation of a run.
///
/// Cheap to clone; can be moved into a signal handler.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
    state: StateTracker,
}

impl CancelHandle {
    /// Stop dispatching new keys. In-flight tasks finish normally.
    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            info!("Cancellation requested, draining in-flight tasks");
        }
        self.state.begin_draining();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Outcomes of a run, in completion order.
///
/// Yields exactly one outcome per submitted key, then ends.
pub struct Outcomes {
    rx: mpsc::Receiver<ReplicationOutcome>,
    total: usize,
    received: usize,
}

impl Outcomes {
    /// Next outcome, or `None` once every key has reported.
    pub async fn next(&mut self) -> Option<ReplicationOutcome> {
        let outcome = self.rx.recv().await;
        if outcome.is_some() {
            self.received += 1;
        }
        outcome
    }

    /// Number of keys submitted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Outcomes not yet received.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.received)
    }
}

impl Stream for Outcomes {
    type Item = ReplicationOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.received += 1;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

/// The replication engine.
///
/// Generic over the [`StoreConnector`] so the same engine drives a real
/// object store, a mounted directory ([`FsConnector`](crate::store::FsConnector))
/// or an in-memory store in tests.
pub struct ReplicationEngine<C: StoreConnector> {
    /// Run configuration, shared read-only with every task
    job: Arc<SyncJob>,

    /// Establishes source/destination handles
    connector: C,

    /// Engine state (broadcast to watchers)
    state: StateTracker,

    /// Kept so watchers can be handed out before any state change
    state_rx: watch::Receiver<EngineState>,

    /// Cancellation signal sender
    cancel_tx: Arc<watch::Sender<bool>>,

    /// Cancellation signal receiver
    cancel_rx: watch::Receiver<bool>,

    /// Connected stores, taken by the run
    context: Option<Arc<TaskContext<C::Store>>>,
}

impl<C: StoreConnector> ReplicationEngine<C> {
    /// Create an engine in `Created` state. Nothing is connected yet.
    pub fn new(job: SyncJob, connector: C) -> Self {
        let (state, state_rx) = StateTracker::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        Self {
            job: Arc::new(job),
            connector,
            state,
            state_rx,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            context: None,
        }
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    /// Handle for cancelling the run from elsewhere (signal handler, timer).
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
            state: self.state.clone(),
        }
    }

    /// Shorthand for `cancel_handle().cancel()`.
    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Connect and probe both stores.
    ///
    /// Each side gets the connect retry policy; if either side still fails
    /// the engine moves to `Failed` and returns
    /// [`ReplicationError::Connection`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.state() != EngineState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }
        self.job.validate()?;

        info!(
            domain = %self.job.domain,
            source = %self.job.source,
            destination = %self.job.destination,
            "Connecting to stores"
        );
        self.state.set(EngineState::Connecting);

        let connected = async {
            let source = self.connect_side("source", &self.job.source).await?;
            let destination = self.connect_side("destination", &self.job.destination).await?;
            Ok::<_, ReplicationError>((source, destination))
        }
        .await;

        match connected {
            Ok((source, destination)) => {
                self.context = Some(Arc::new(TaskContext::new(
                    source,
                    destination,
                    Arc::clone(&self.job),
                )));
                self.state.set(EngineState::Running);
                info!(domain = %self.job.domain, "Stores connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to stores");
                self.state.set(EngineState::Failed);
                Err(e)
            }
        }
    }

    async fn connect_side(&self, side: &'static str, endpoint: &StoreEndpoint) -> Result<C::Store> {
        let connector = &self.connector;
        let domain = self.job.domain.as_str();

        let result = self
            .job
            .retry
            .connect
            .execute("connect", || async move {
                let unreachable = |message: String| ReplicationError::Connection {
                    endpoint: endpoint.to_string(),
                    message,
                };
                let store = connector
                    .connect(endpoint, domain)
                    .await
                    .map_err(|e| unreachable(e.to_string()))?;
                store.ping().await.map_err(|e| unreachable(format!("probe failed: {}", e)))?;
                Ok(store)
            })
            .await;

        match result {
            Ok(store) => {
                metrics::record_connection(side, true);
                debug!(side, endpoint = %endpoint, "Store connected");
                Ok(store)
            }
            Err(exhausted) => {
                metrics::record_connection(side, false);
                let cause = match exhausted.last_error {
                    ReplicationError::Connection { message, .. } => message,
                    other => other.to_string(),
                };
                Err(ReplicationError::Connection {
                    endpoint: endpoint.to_string(),
                    message: format!(
                        "{} store unreachable after {} attempts: {}",
                        side, exhausted.attempts, cause
                    ),
                })
            }
        }
    }

    /// Start replicating `keys` and stream outcomes back.
    ///
    /// Connects first if [`connect`](Self::connect) was not called. The
    /// returned [`Outcomes`] yields one outcome per key; keys that were
    /// never dispatched because of cancellation come last, as `Cancelled`.
    pub async fn stream<I>(&mut self, keys: I) -> Result<Outcomes>
    where
        I: IntoIterator<Item = Key>,
    {
        if self.state() == EngineState::Created {
            self.connect().await?;
        }
        // A cancel before dispatch leaves the engine Draining with its stores
        // still unused; the run then reports every key as Cancelled.
        let ctx = match (self.state(), self.context.take()) {
            (EngineState::Running | EngineState::Draining, Some(ctx)) => ctx,
            (state, _) => {
                return Err(ReplicationError::InvalidState {
                    expected: "Running".to_string(),
                    actual: state.to_string(),
                });
            }
        };

        let queue: VecDeque<Key> = keys.into_iter().collect();
        let total = queue.len();
        let workers = self.job.concurrency.max(1).min(total.max(1));
        let queue = Arc::new(Mutex::new(queue));
        let (tx, rx) = mpsc::channel(total.max(1));

        let rate_limiter = self.job.rate_limit.rate_limit_config().map(|cfg| {
            let limiter = RateLimiter::new(cfg);
            info!(
                rate_per_sec = limiter.config().refill_rate,
                burst = limiter.config().burst_size,
                "Rate limiting enabled for dispatch"
            );
            Arc::new(limiter)
        });

        let retry = &self.job.retry;
        info!(
            keys = total,
            workers,
            verify_existing = self.job.verify_existing,
            max_fetch_backoff_ms = retry.fetch.max_total_delay().as_millis() as u64,
            max_upload_backoff_ms = retry.upload.max_total_delay().as_millis() as u64,
            "Replication run started"
        );

        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                ctx: Arc::clone(&ctx),
                outcomes: tx.clone(),
                cancel_rx: self.cancel_rx.clone(),
                rate_limiter: rate_limiter.clone(),
                in_flight: Arc::clone(&in_flight),
                state: self.state.clone(),
            };
            handles.push(tokio::spawn(worker.run().instrument(info_span!("worker", id))));
        }

        let state = self.state.clone();
        let cancel_tx = Arc::clone(&self.cancel_tx);
        tokio::spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker panicked");
                }
            }

            let leftover: Vec<Key> = queue.lock().await.drain(..).collect();
            if !leftover.is_empty() {
                info!(count = leftover.len(), "Reporting undispatched keys as cancelled");
            }
            for key in leftover {
                metrics::record_outcome("cancelled");
                let _ = tx.send(ReplicationOutcome::cancelled(key)).await;
            }

            state.set(EngineState::Stopped);
            // Receiver sees the end of the stream only after `Stopped`.
            drop(tx);
            drop(cancel_tx);
        });

        Ok(Outcomes {
            rx,
            total,
            received: 0,
        })
    }

    /// Replicate `keys` and collect every outcome into a [`RunReport`].
    pub async fn run<I>(&mut self, keys: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = Key>,
    {
        let started = Instant::now();
        let mut outcomes = self.stream(keys).await?;

        let mut collected = Vec::with_capacity(outcomes.total());
        while let Some(outcome) = outcomes.next().await {
            collected.push(outcome);
        }

        let report = RunReport::new(collected, started.elapsed());
        metrics::record_run_complete(report.summary.total(), report.summary.failed, report.elapsed);
        info!(
            succeeded = report.summary.succeeded,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            cancelled = report.summary.cancelled,
            bytes = report.summary.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Replication run complete"
        );
        Ok(report)
    }
}
