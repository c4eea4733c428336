// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process store and a connector that hands out pre-built handles.

use super::{ObjectReader, ObjectStore, StoreConnector, StoreFuture};
use crate::config::StoreEndpoint;
use crate::error::StoreError;
use crate::key::Key;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// Objects held in memory.
///
/// Cloning shares the same contents, so a test can keep one clone for
/// assertions while the engine uses another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<Key, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write.
    pub async fn insert(&self, key: impl Into<Key>, data: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.into(), data.into());
    }

    pub async fn get(&self, key: &Key) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &Key) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `write()` calls that completed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn exists(&self, key: &Key) -> StoreFuture<'_, bool> {
        let key = key.clone();
        Box::pin(async move { Ok(self.contains(&key).await) })
    }

    fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader> {
        let key = key.clone();
        Box::pin(async move {
            match self.get(&key).await {
                Some(data) => Ok(Box::pin(Cursor::new(data)) as ObjectReader),
                None => Err(StoreError::NotFound(key.to_string())),
            }
        })
    }

    fn write(&self, key: &Key, mut body: ObjectReader, len: u64) -> StoreFuture<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            let mut data = Vec::with_capacity(len as usize);
            body.read_to_end(&mut data).await?;
            if data.len() as u64 != len {
                return Err(StoreError::Other(format!(
                    "short body for {}: expected {} bytes, got {}",
                    key,
                    len,
                    data.len()
                )));
            }
            self.objects.write().await.insert(key, data);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Connector that resolves endpoint addresses to pre-registered handles.
///
/// The first address of an endpoint that has a registered store wins.
pub struct StaticConnector<S> {
    stores: HashMap<String, S>,
}

impl<S> Default for StaticConnector<S> {
    fn default() -> Self {
        Self {
            stores: HashMap::new(),
        }
    }
}

impl<S: ObjectStore + Clone> StaticConnector<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `address`.
    pub fn with_store(mut self, address: impl Into<String>, store: S) -> Self {
        self.stores.insert(address.into(), store);
        self
    }
}

impl<S: ObjectStore + Clone> StoreConnector for StaticConnector<S> {
    type Store = S;

    fn connect(&self, endpoint: &StoreEndpoint, _namespace: &str) -> StoreFuture<'_, S> {
        let found = endpoint
            .addresses
            .iter()
            .find_map(|addr| self.stores.get(addr).cloned());
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            found.ok_or_else(|| StoreError::Unavailable(format!("no store registered at {}", endpoint)))
        })
    }
}
