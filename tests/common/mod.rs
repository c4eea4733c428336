//! Shared test utilities for integration, chaos and property tests.
//!
//! This module provides:
//! - A recording, fault-injecting ObjectStore and connector
//! - Job and manifest helpers

pub mod mock_store;

pub use mock_store::*;

use object_sync::config::StagingConfig;
use object_sync::{Key, ReplicationEngine, SyncJob};
use std::path::Path;

/// Test job (1ms retry delays) staging under `staging`.
#[allow(dead_code)]
pub fn test_job(staging: &Path, concurrency: usize) -> SyncJob {
    let mut job = SyncJob::for_testing("media");
    job.concurrency = concurrency;
    job.staging = StagingConfig::in_dir(staging);
    job
}

/// Engine over a source/destination mock pair.
#[allow(dead_code)]
pub fn engine(job: SyncJob, source: &MockStore, destination: &MockStore) -> ReplicationEngine<MockConnector> {
    ReplicationEngine::new(job, MockConnector::new(source, destination))
}

#[allow(dead_code)]
pub fn keys(names: &[&str]) -> Vec<Key> {
    names.iter().map(|k| Key::from(*k)).collect()
}

/// Number of entries left in a staging base directory.
#[allow(dead_code)]
pub fn staging_entries(staging: &Path) -> usize {
    std::fs::read_dir(staging).map(|d| d.count()).unwrap_or(0)
}
