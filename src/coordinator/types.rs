//! Engine state and run report types.
//!
//! # State Transitions
//!
//! ```text
//!              connect()
//! Created ──────────────────→ Connecting ──(probe failed)──→ Failed
//!                                  │
//!                                  │ (both stores connected)
//!                                  ↓
//!                               Running
//!                                  │
//!                 (queue empty or  │
//!                  cancel())       ↓
//!                               Draining
//!                                  │
//!                  (all workers    │
//!                   finished)      ↓
//!                               Stopped
//! ```
//!
//! # State Descriptions
//!
//! - **Created**: Initial state after `ReplicationEngine::new()`. No connections.
//! - **Connecting**: Connecting and probing source and destination stores.
//! - **Running**: Workers are pulling keys from the queue.
//! - **Draining**: No more keys will be dispatched; in-flight tasks are finishing.
//! - **Stopped**: Every key has an outcome. The engine cannot be reused.
//! - **Failed**: A store could not be reached. No key was processed.

use crate::metrics;
use crate::task::{OutcomeStatus, ReplicationOutcome};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// State of the replication engine.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine created but not connected.
    Created,

    /// Establishing store connections.
    Connecting,

    /// Dispatching keys.
    Running,

    /// Dispatch stopped, waiting for in-flight tasks.
    Draining,

    /// Run finished.
    Stopped,

    /// Fatal connection error.
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Created => write!(f, "Created"),
            EngineState::Connecting => write!(f, "Connecting"),
            EngineState::Running => write!(f, "Running"),
            EngineState::Draining => write!(f, "Draining"),
            EngineState::Stopped => write!(f, "Stopped"),
            EngineState::Failed => write!(f, "Failed"),
        }
    }
}

/// Shared writer side of the engine state, mirrored into the state gauge.
#[derive(Clone)]
pub(crate) struct StateTracker {
    tx: Arc<watch::Sender<EngineState>>,
}

impl StateTracker {
    pub(crate) fn new() -> (Self, watch::Receiver<EngineState>) {
        let (tx, rx) = watch::channel(EngineState::Created);
        metrics::set_engine_state("Created");
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub(crate) fn get(&self) -> EngineState {
        *self.tx.borrow()
    }

    pub(crate) fn set(&self, state: EngineState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Engine state changed");
        }
        metrics::set_engine_state(&state.to_string());
    }

    /// `Running → Draining`; no-op from any other state.
    pub(crate) fn begin_draining(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == EngineState::Running {
                *state = EngineState::Draining;
                true
            } else {
                false
            }
        });
        if changed {
            debug!("Engine draining");
            metrics::set_engine_state("Draining");
        }
    }
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Bytes copied by succeeded keys.
    pub bytes: u64,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.cancelled
    }

    fn add(&mut self, outcome: &ReplicationOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
        }
        self.bytes += outcome.bytes;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} keys: {} succeeded, {} skipped, {} failed, {} cancelled ({} bytes)",
            self.total(),
            self.succeeded,
            self.skipped,
            self.failed,
            self.cancelled,
            self.bytes
        )
    }
}

/// Every outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<ReplicationOutcome>,
    pub summary: RunSummary,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(outcomes: Vec<ReplicationOutcome>, elapsed: Duration) -> Self {
        let mut summary = RunSummary::default();
        for outcome in &outcomes {
            summary.add(outcome);
        }
        Self {
            outcomes,
            summary,
            elapsed,
        }
    }

    /// Failed outcomes, with key and last error.
    pub fn failed(&self) -> impl Iterator<Item = &ReplicationOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Every key reached a terminal state (nothing was cancelled).
    pub fn is_complete(&self) -> bool {
        self.summary.cancelled == 0
    }

    /// Outcome for `key`, if it was part of the run.
    pub fn outcome(&self, key: &str) -> Option<&ReplicationOutcome> {
        self.outcomes.iter().find(|o| o.key.as_str() == key)
    }
}
