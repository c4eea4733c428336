// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-key replication pipeline.
//!
//! # Design
//!
//! ```text
//!  Start ──▶ CheckExistence ──(present)──────────────────────────▶ Skipped
//!    │            │ (absent / check failed)
//!    │            ▼
//!    └──────▶ Fetching ──▶ Uploading ──▶ Cleanup ──▶ Done ──────▶ Succeeded
//!                 │            │
//!                 └────────────┴──(retries exhausted)──▶ Cleanup ─▶ Failed
//! ```
//!
//! Every error is turned into a [`ReplicationOutcome`] at the task boundary;
//! nothing escapes [`ReplicationTask::run`]. Staging is cleaned up on every
//! path, including a panic inside the task.

use crate::config::SyncJob;
use crate::error::{ReplicationError, Result, StoreError};
use crate::key::Key;
use crate::metrics;
use crate::staging::{StagingArea, StagingHandle};
use crate::store::ObjectStore;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// Final status of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    /// Copied to the destination.
    Succeeded,
    /// Destination already had the key (existence check on).
    Skipped,
    /// Fetch or upload gave up, or the task panicked.
    Failed,
    /// Never dispatched because the run was cancelled.
    Cancelled,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline position of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Start,
    CheckExistence,
    Fetching,
    Uploading,
    Cleanup,
    Done,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStage::Start => "start",
            TaskStage::CheckExistence => "check_existence",
            TaskStage::Fetching => "fetch",
            TaskStage::Uploading => "upload",
            TaskStage::Cleanup => "cleanup",
            TaskStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of one key. Produced exactly once per submitted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationOutcome {
    pub key: Key,
    pub status: OutcomeStatus,
    /// Last error, for `Failed` only.
    pub error: Option<String>,
    /// Stage that failed, for `Failed` only. `None` if the task panicked.
    pub stage: Option<TaskStage>,
    /// Bytes copied (0 unless `Succeeded`).
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ReplicationOutcome {
    pub fn succeeded(key: Key, bytes: u64, elapsed: Duration) -> Self {
        Self {
            key,
            status: OutcomeStatus::Succeeded,
            error: None,
            stage: None,
            bytes,
            elapsed,
        }
    }

    pub fn skipped(key: Key, elapsed: Duration) -> Self {
        Self {
            key,
            status: OutcomeStatus::Skipped,
            error: None,
            stage: None,
            bytes: 0,
            elapsed,
        }
    }

    pub fn failed(key: Key, stage: Option<TaskStage>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            key,
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
            stage,
            bytes: 0,
            elapsed,
        }
    }

    pub fn cancelled(key: Key) -> Self {
        Self {
            key,
            status: OutcomeStatus::Cancelled,
            error: None,
            stage: None,
            bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

/// Everything a task needs, shared by all tasks of a run.
pub struct TaskContext<S: ObjectStore> {
    pub source: Arc<S>,
    pub destination: Arc<S>,
    pub job: Arc<SyncJob>,
    pub staging: StagingArea,
}

impl<S: ObjectStore> TaskContext<S> {
    pub fn new(source: S, destination: S, job: Arc<SyncJob>) -> Self {
        let staging = StagingArea::new(&job.staging);
        Self {
            source: Arc::new(source),
            destination: Arc::new(destination),
            job,
            staging,
        }
    }
}

enum Transfer {
    Skipped,
    Copied(u64),
}

/// Replicates a single key.
pub struct ReplicationTask<S: ObjectStore> {
    key: Key,
    ctx: Arc<TaskContext<S>>,
    stage: TaskStage,
}

impl<S: ObjectStore> ReplicationTask<S> {
    pub fn new(key: Key, ctx: Arc<TaskContext<S>>) -> Self {
        Self {
            key,
            ctx,
            stage: TaskStage::Start,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Run the pipeline to completion. Never fails; errors become outcomes.
    pub async fn run(mut self) -> ReplicationOutcome {
        let started = Instant::now();
        let result = self.execute().await;
        let elapsed = started.elapsed();
        metrics::record_task_duration(elapsed);

        match result {
            Ok(Transfer::Copied(bytes)) => {
                debug!(key = %self.key, bytes, elapsed_ms = elapsed.as_millis() as u64, "Replicated");
                ReplicationOutcome::succeeded(self.key, bytes, elapsed)
            }
            Ok(Transfer::Skipped) => {
                debug!(key = %self.key, "Already at destination, skipped");
                ReplicationOutcome::skipped(self.key, elapsed)
            }
            Err(e) => {
                warn!(key = %self.key, stage = %self.stage, error = %e, "Replication failed");
                ReplicationOutcome::failed(self.key, Some(self.stage), e.to_string(), elapsed)
            }
        }
    }

    async fn execute(&mut self) -> Result<Transfer> {
        if self.ctx.job.verify_existing {
            self.advance(TaskStage::CheckExistence);
            if self.destination_has_key().await {
                self.advance(TaskStage::Done);
                return Ok(Transfer::Skipped);
            }
        }

        self.advance(TaskStage::Fetching);
        let handle = self.ctx.staging.acquire(&self.key)?;
        let result = self.transfer(&handle).await;

        // On failure the stage keeps pointing at what failed.
        if result.is_ok() {
            self.advance(TaskStage::Cleanup);
        }
        if let Err(e) = handle.release().await {
            debug!(key = %self.key, error = %e, "Staging left behind after cleanup");
        }
        let bytes = result?;
        self.advance(TaskStage::Done);
        Ok(Transfer::Copied(bytes))
    }

    async fn transfer(&mut self, handle: &StagingHandle) -> Result<u64> {
        let fetched = self.fetch(handle.path()).await?;
        self.advance(TaskStage::Uploading);
        self.upload(handle.path()).await?;
        Ok(fetched)
    }

    /// Existence check. A check that keeps failing is logged and treated as
    /// "absent": the write is idempotent, so copying again is harmless.
    async fn destination_has_key(&self) -> bool {
        let destination = &self.ctx.destination;
        let key = &self.key;
        let result = self
            .ctx
            .job
            .retry
            .exists
            .execute("exists", || async move {
                destination
                    .exists(key)
                    .await
                    .map_err(|e| ReplicationError::object("exists", key.as_str(), e))
            })
            .await;

        match result {
            Ok(present) => present,
            Err(exhausted) => {
                warn!(
                    key = %self.key,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Existence check failed, replicating anyway"
                );
                false
            }
        }
    }

    /// Read the source object into `path`, replacing any earlier attempt.
    async fn fetch(&self, path: &Path) -> Result<u64> {
        let source = &self.ctx.source;
        let key = &self.key;
        let started = Instant::now();

        let bytes = self
            .ctx
            .job
            .retry
            .fetch
            .execute("fetch", || async move {
                let mut reader = source
                    .read(key)
                    .await
                    .map_err(|e| ReplicationError::object("fetch", key.as_str(), e))?;
                let mut file = tokio::fs::File::create(path).await?;
                let bytes = tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(|e| ReplicationError::object("fetch", key.as_str(), StoreError::Io(e)))?;
                file.flush().await?;
                if bytes == 0 {
                    return Err(ReplicationError::EmptyObject(key.to_string()));
                }
                Ok(bytes)
            })
            .await
            .map_err(|e| e.into_object_error("fetch", key.as_str()))?;

        metrics::record_bytes("fetch", bytes);
        metrics::record_operation_latency("fetch", started.elapsed());
        trace!(key = %self.key, bytes, "Fetched into staging");
        Ok(bytes)
    }

    /// Stream the staged file to the destination under the same key.
    async fn upload(&self, path: &Path) -> Result<u64> {
        let destination = &self.ctx.destination;
        let key = &self.key;
        let started = Instant::now();

        let bytes = self
            .ctx
            .job
            .retry
            .upload
            .execute("upload", || async move {
                let file = tokio::fs::File::open(path).await?;
                let len = file.metadata().await?.len();
                destination
                    .write(key, Box::pin(file), len)
                    .await
                    .map_err(|e| ReplicationError::object("upload", key.as_str(), e))?;
                Ok(len)
            })
            .await
            .map_err(|e| e.into_object_error("upload", key.as_str()))?;

        metrics::record_bytes("upload", bytes);
        metrics::record_operation_latency("upload", started.elapsed());
        trace!(key = %self.key, bytes, "Uploaded from staging");
        Ok(bytes)
    }

    fn advance(&mut self, stage: TaskStage) {
        trace!(key = %self.key, from = %self.stage, to = %stage, "Task stage");
        self.stage = stage;
    }
}
