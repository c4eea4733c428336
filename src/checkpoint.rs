// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Checkpoint of the last fully processed manifest.
//!
//! A single-line text file holding the manifest's base name:
//!
//! ```text
//! $ cat base_backup
//! fdfs_media_2024-06-01.csv
//! ```
//!
//! ## Write Semantics
//!
//! `record()` writes a temp file next to the checkpoint, fsyncs it, renames
//! it over the old one and fsyncs the directory. A crash at any point leaves either the previous
//! checkpoint or the new one, never a torn file.
//!
//! ```text
//! run batch → every key terminal → record(manifest)
//!             (crash here = previous checkpoint kept, batch replayed, idempotent)
//! ```

use crate::error::{ReplicationError, Result};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A recorded checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Base name of the manifest that was fully processed.
    pub manifest_id: String,
    /// When it was recorded (file modification time).
    pub recorded_at: DateTime<Utc>,
}

/// File-backed checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the checkpoint with `manifest_id`.
    pub async fn record(&self, manifest_id: &str) -> Result<()> {
        if manifest_id.is_empty() || manifest_id.contains(['\n', '\r']) {
            return Err(ReplicationError::checkpoint(
                &self.path,
                format!("invalid manifest id {:?}", manifest_id),
            ));
        }

        let path = self.path.clone();
        let contents = format!("{}\n", manifest_id);
        let result = tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
            .await
            .map_err(|e| ReplicationError::checkpoint(&self.path, format!("writer task failed: {}", e)))
            .and_then(|r| r);

        metrics::record_checkpoint_write(result.is_ok());
        match &result {
            Ok(()) => info!(path = %self.path.display(), manifest = manifest_id, "Checkpoint recorded"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to record checkpoint"),
        }
        result
    }

    /// The current checkpoint, if one was ever recorded.
    pub async fn last_recorded(&self) -> Result<Option<Checkpoint>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint yet");
                return Ok(None);
            }
            Err(e) => return Err(ReplicationError::checkpoint(&self.path, e.to_string())),
        };

        let manifest_id = raw.lines().next().unwrap_or("").trim();
        if manifest_id.is_empty() {
            return Ok(None);
        }

        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| ReplicationError::checkpoint(&self.path, e.to_string()))?;

        Ok(Some(Checkpoint {
            manifest_id: manifest_id.to_string(),
            recorded_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Whether the checkpoint already names `manifest_id`.
    pub async fn is_recorded(&self, manifest_id: &str) -> Result<bool> {
        Ok(self
            .last_recorded()
            .await?
            .is_some_and(|c| c.manifest_id == manifest_id))
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let fail = |e: std::io::Error| ReplicationError::checkpoint(path, e.to_string());

    let mut tmp = NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(contents).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    sync_dir(parent).map_err(fail)?;
    Ok(())
}

/// Flush a directory entry change (the rename) to disk.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}
