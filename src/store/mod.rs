// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Object store integration traits.
//!
//! The engine never talks to a concrete store client. It consumes two traits:
//!
//! - [`StoreConnector`]: turns a [`StoreEndpoint`] plus namespace into a
//!   connected store handle.
//! - [`ObjectStore`]: the per-object capability set (`ping`, `exists`, `read`,
//!   `write`).
//!
//! One handle per side is created before the worker pool starts and shared by
//! every worker, so implementations must be safe for concurrent use
//! (`Send + Sync`). A backend whose client is not thread-safe should pool
//! connections internally behind this trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use object_sync::store::{ObjectReader, ObjectStore, StoreFuture};
//! use object_sync::error::StoreError;
//! use object_sync::Key;
//!
//! struct ReadOnlyBackend;
//!
//! impl ObjectStore for ReadOnlyBackend {
//!     fn ping(&self) -> StoreFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//!
//!     fn exists(&self, _key: &Key) -> StoreFuture<'_, bool> {
//!         Box::pin(async { Ok(false) })
//!     }
//!
//!     fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader> {
//!         let key = key.to_string();
//!         Box::pin(async move { Err(StoreError::NotFound(key)) })
//!     }
//!
//!     fn write(&self, _key: &Key, _body: ObjectReader, _len: u64) -> StoreFuture<'_, ()> {
//!         Box::pin(async { Err(StoreError::Other("read-only".into())) })
//!     }
//! }
//! ```

mod fs;
mod memory;

pub use fs::{FsConnector, FsStore};
pub use memory::{MemoryStore, StaticConnector};

use crate::config::StoreEndpoint;
use crate::error::StoreResult;
use crate::key::Key;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Streaming object body.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed future returned by store calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Capability set the engine needs from one object store.
pub trait ObjectStore: Send + Sync + 'static {
    /// Cheap round trip proving the handle is usable.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Whether `key` currently exists.
    fn exists(&self, key: &Key) -> StoreFuture<'_, bool>;

    /// Open `key` for reading.
    ///
    /// Must return [`StoreError::NotFound`](crate::error::StoreError::NotFound)
    /// when the store can confirm the key is absent.
    fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader>;

    /// Create or fully overwrite `key` with `len` bytes from `body`.
    fn write(&self, key: &Key, body: ObjectReader, len: u64) -> StoreFuture<'_, ()>;
}

impl<S: ObjectStore> ObjectStore for Arc<S> {
    fn ping(&self) -> StoreFuture<'_, ()> {
        (**self).ping()
    }

    fn exists(&self, key: &Key) -> StoreFuture<'_, bool> {
        (**self).exists(key)
    }

    fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader> {
        (**self).read(key)
    }

    fn write(&self, key: &Key, body: ObjectReader, len: u64) -> StoreFuture<'_, ()> {
        (**self).write(key, body, len)
    }
}

/// Establishes store handles.
pub trait StoreConnector: Send + Sync + 'static {
    type Store: ObjectStore;

    /// Connect to `endpoint`, scoped to `namespace` (the job's domain).
    fn connect(&self, endpoint: &StoreEndpoint, namespace: &str) -> StoreFuture<'_, Self::Store>;
}
