// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Directory-backed store.
//!
//! Each endpoint address is a root directory (local disk or a mounted share);
//! the namespace is a sub-directory of it. Keys map to relative paths:
//!
//! ```text
//! root=/srv/mirror  namespace=media  key=/a/b/c.jpg  →  /srv/mirror/media/a/b/c.jpg
//! ```
//!
//! Writes land in a temporary sibling file and are renamed into place, so a
//! reader never observes a half-written object.

use super::{ObjectReader, ObjectStore, StoreConnector, StoreFuture};
use crate::config::StoreEndpoint;
use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `key` under the root.
    ///
    /// Rejects keys that would escape the root or name the root itself.
    pub fn object_path(&self, key: &Key) -> StoreResult<PathBuf> {
        let mut path = self.root.clone();
        let mut depth = 0;
        for component in Path::new(key.as_str().trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => {
                    path.push(segment);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => {
                    return Err(StoreError::Other(format!("key escapes store root: {}", key)));
                }
            }
        }
        if depth == 0 {
            return Err(StoreError::Other(format!("key names no object: {:?}", key.as_str())));
        }
        Ok(path)
    }
}

impl ObjectStore for FsStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(&self.root).await.map_err(|e| {
                StoreError::Unavailable(format!("{}: {}", self.root.display(), e))
            })?;
            if !meta.is_dir() {
                return Err(StoreError::Unavailable(format!(
                    "{} is not a directory",
                    self.root.display()
                )));
            }
            Ok(())
        })
    }

    fn exists(&self, key: &Key) -> StoreFuture<'_, bool> {
        let path = self.object_path(key);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader> {
        let path = self.object_path(key);
        let key = key.clone();
        Box::pin(async move {
            let path = path?;
            match tokio::fs::File::open(&path).await {
                Ok(file) => Ok(Box::pin(file) as ObjectReader),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn write(&self, key: &Key, mut body: ObjectReader, len: u64) -> StoreFuture<'_, ()> {
        let path = self.object_path(key);
        let key = key.clone();
        Box::pin(async move {
            let path = path?;
            let parent = path
                .parent()
                .ok_or_else(|| StoreError::Other(format!("no parent directory for {}", key)))?
                .to_path_buf();
            tokio::fs::create_dir_all(&parent).await?;

            let partial = tempfile::Builder::new()
                .prefix(".object-sync-")
                .suffix(".partial")
                .tempfile_in(&parent)?;
            let mut file = tokio::fs::File::from_std(partial.as_file().try_clone()?);
            let written = tokio::io::copy(&mut body, &mut file).await?;
            if written != len {
                return Err(StoreError::Other(format!(
                    "short body for {}: expected {} bytes, got {}",
                    key, len, written
                )));
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            partial.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            debug!(key = %key, path = %path.display(), bytes = written, "Object written");
            Ok(())
        })
    }
}

/// Connector for [`FsStore`]: first address whose `<address>/<namespace>` is a
/// directory wins.
#[derive(Debug, Clone, Default)]
pub struct FsConnector;

impl StoreConnector for FsConnector {
    type Store = FsStore;

    fn connect(&self, endpoint: &StoreEndpoint, namespace: &str) -> StoreFuture<'_, FsStore> {
        let roots: Vec<PathBuf> = endpoint
            .addresses
            .iter()
            .map(|addr| Path::new(addr).join(namespace))
            .collect();
        Box::pin(async move {
            let mut last_error = None;
            for root in roots {
                let store = FsStore::new(root);
                match store.ping().await {
                    Ok(()) => return Ok(store),
                    Err(e) => last_error = Some(e),
                }
            }
            Err(last_error.unwrap_or_else(|| StoreError::Unavailable("endpoint has no addresses".into())))
        })
    }
}
