//! # Object Sync
//!
//! Manifest-driven catch-up replication of objects from a source object store
//! to a destination object store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                               object-sync                                 │
//! │                                                                           │
//! │  ┌──────────┐   keys   ┌───────────────────┐   outcomes   ┌────────────┐  │
//! │  │ Manifest │─────────►│ ReplicationEngine │─────────────►│ RunReport  │  │
//! │  └──────────┘          │ (N workers)       │              └────────────┘  │
//! │                        └───────────────────┘                    │         │
//! │                                  │ per key                      ▼         │
//! │                                  ▼                     ┌─────────────────┐│
//! │   ┌────────────┐  fetch  ┌────────────────┐  upload    │ CheckpointStore ││
//! │   │ source     │────────►│ StagingHandle  │──────────► │ (caller-driven) ││
//! │   │ ObjectStore│         │ (temp dir/file)│ destination└─────────────────┘│
//! │   └────────────┘         └────────────────┘ ObjectStore                   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every key yields exactly one [`ReplicationOutcome`]: `Succeeded`, `Skipped`
//! (already at the destination), `Failed` (with the last error) or
//! `Cancelled` (never dispatched). Failures are isolated per key; only a store
//! that cannot be reached at all fails the run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use object_sync::{Manifest, ReplicationEngine, SyncJob};
//! use object_sync::config::StoreEndpoint;
//! use object_sync::store::FsConnector;
//!
//! #[tokio::main]
//! async fn main() -> object_sync::Result<()> {
//!     let manifest = Manifest::load("media_2024-06-01.csv")?;
//!     let job = SyncJob {
//!         domain: "media".into(),
//!         source: StoreEndpoint::new(["/mnt/primary"]),
//!         destination: StoreEndpoint::new(["/mnt/replica"]),
//!         concurrency: 8,
//!         ..Default::default()
//!     };
//!
//!     let mut engine = ReplicationEngine::new(job, FsConnector);
//!     let report = engine.run(manifest.into_keys()).await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod manifest;
pub mod metrics;
pub mod resilience;
pub mod staging;
pub mod store;
pub mod task;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{RetryPolicies, StagingConfig, StoreEndpoint, SyncJob};
pub use coordinator::{CancelHandle, EngineState, Outcomes, ReplicationEngine, RunReport, RunSummary};
pub use error::{ReplicationError, Result, StoreError};
pub use key::Key;
pub use manifest::Manifest;
pub use resilience::RetryPolicy;
pub use store::{ObjectStore, StoreConnector};
pub use task::{OutcomeStatus, ReplicationOutcome, TaskStage};
