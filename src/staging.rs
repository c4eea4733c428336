// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-key local staging.
//!
//! Every task gets its own freshly created directory under the staging base
//! (`/dev/shm/object-sync-Xa81Qz/`) with a single file inside named after the
//! key's final segment. Directories are created with random names, so two
//! concurrent tasks never share a path even when their keys end in the same
//! file name.
//!
//! # Cleanup
//!
//! ```text
//! release()                     drop without release()
//!    │                                 │
//!    ├─ remove file (missing is ok)    └─ same steps inline, errors only logged
//!    ├─ remove dir (non-recursive)
//!    │     └─ fails → warn + StagingError, leftovers swept
//!    └─ done
//! ```
//!
//! Removal is never retried. `release()` does its filesystem calls on the
//! blocking pool.

use crate::config::StagingConfig;
use crate::error::{ReplicationError, Result};
use crate::key::Key;
use crate::metrics;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Factory for [`StagingHandle`]s, shared by all tasks of a run.
#[derive(Debug, Clone)]
pub struct StagingArea {
    base_dir: PathBuf,
    prefix: String,
}

impl StagingArea {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            base_dir: config.base_dir(),
            prefix: config.prefix.clone(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh staging directory for `key`.
    ///
    /// The base directory must already exist.
    pub fn acquire(&self, key: &Key) -> Result<StagingHandle> {
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&self.base_dir)
            .map_err(|e| {
                metrics::record_staging_error("create");
                ReplicationError::staging(&self.base_dir, format!("cannot create staging directory: {}", e))
            })?;
        let file = dir.path().join(key.file_name());
        debug!(key = %key, path = %file.display(), "Staging acquired");

        Ok(StagingHandle {
            dir_path: dir.path().to_path_buf(),
            dir: Some(dir),
            file,
        })
    }
}

/// One task's staging directory and target file.
///
/// Exclusively owned by the task. Dropping it without calling
/// [`release`](Self::release) still cleans up.
#[derive(Debug)]
pub struct StagingHandle {
    dir: Option<TempDir>,
    dir_path: PathBuf,
    file: PathBuf,
}

impl StagingHandle {
    /// Absolute path of the staged file (may not exist yet).
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Absolute path of the staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    /// Remove the staged file, then the directory.
    ///
    /// A directory that cannot be removed (unexpected entries, permissions)
    /// is reported as [`ReplicationError::Staging`] after a warning; whatever
    /// is left is then removed recursively. Runs on the blocking pool.
    pub async fn release(mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let file = self.file.clone();
        let dir_path = self.dir_path.clone();
        tokio::task::spawn_blocking(move || remove(dir, &file))
            .await
            .map_err(|e| ReplicationError::staging(dir_path, format!("cleanup task failed: {}", e)))?
    }
}

impl Drop for StagingHandle {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let _ = remove(dir, &self.file);
        }
    }
}

fn remove(dir: TempDir, file: &Path) -> Result<()> {
    if let Err(e) = std::fs::remove_file(file) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %file.display(), error = %e, "Failed to remove staged file");
        }
    }

    match std::fs::remove_dir(dir.path()) {
        Ok(()) => {
            // TempDir's own removal now finds nothing and is a no-op.
            drop(dir);
            Ok(())
        }
        Err(e) => {
            metrics::record_staging_error("remove");
            warn!(path = %dir.path().display(), error = %e, "Failed to remove staging directory");
            let err = ReplicationError::staging(dir.path(), e.to_string());
            if let Err(e) = dir.close() {
                warn!(error = %e, "Failed to sweep staging directory");
            }
            Err(err)
        }
    }
}
