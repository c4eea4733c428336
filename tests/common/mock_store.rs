//! Mock ObjectStore for testing.
//!
//! Wraps a [`MemoryStore`] and records every call per key. Failures, delays
//! and panics can be injected per key to exercise retry, isolation and
//! cancellation paths.

use object_sync::config::StoreEndpoint;
use object_sync::error::StoreError;
use object_sync::store::{MemoryStore, ObjectReader, ObjectStore, StoreConnector, StoreFuture};
use object_sync::Key;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fail the next N calls; `ALWAYS` never runs out.
pub const ALWAYS: usize = usize::MAX;

#[derive(Default)]
struct Inner {
    objects: MemoryStore,
    reads: Mutex<HashMap<Key, usize>>,
    writes: Mutex<HashMap<Key, usize>>,
    exists_calls: AtomicUsize,
    read_failures: Mutex<HashMap<Key, usize>>,
    empty_reads: Mutex<HashMap<Key, usize>>,
    write_failures: Mutex<HashMap<Key, usize>>,
    exists_failures: AtomicUsize,
    panic_on_read: Mutex<Vec<Key>>,
    read_delay: Mutex<Option<Duration>>,
    ping_fails: AtomicBool,
    max_concurrent_reads: AtomicUsize,
    active_reads: AtomicUsize,
}

fn bump(map: &Mutex<HashMap<Key, usize>>, key: &Key) {
    *map.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
}

fn take(map: &Mutex<HashMap<Key, usize>>, key: &Key) -> bool {
    let mut map = map.lock().unwrap();
    match map.get_mut(key) {
        Some(0) | None => false,
        Some(n) => {
            if *n != ALWAYS {
                *n -= 1;
            }
            true
        }
    }
}

/// Recording store with fault injection.
///
/// # Example
/// ```rust,ignore
/// let store = MockStore::new();
/// store.insert("/a", b"data").await;
/// store.fail_reads("/a", 4);           // 4 failures, 5th read succeeds
/// // ... run engine ...
/// assert_eq!(store.read_count("/a"), 5);
/// ```
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<Inner>,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: &str, data: &[u8]) {
        self.inner.objects.insert(key, data.to_vec()).await;
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.objects.get(&Key::from(key)).await
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.objects.contains(&Key::from(key)).await
    }

    pub async fn len(&self) -> usize {
        self.inner.objects.len().await
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Next `times` reads of `key` fail with `Unavailable`.
    pub fn fail_reads(&self, key: &str, times: usize) {
        self.inner.read_failures.lock().unwrap().insert(Key::from(key), times);
    }

    /// Next `times` reads of `key` return an empty stream.
    pub fn empty_reads(&self, key: &str, times: usize) {
        self.inner.empty_reads.lock().unwrap().insert(Key::from(key), times);
    }

    /// Next `times` writes of `key` fail with `Unavailable`.
    pub fn fail_writes(&self, key: &str, times: usize) {
        self.inner.write_failures.lock().unwrap().insert(Key::from(key), times);
    }

    /// Next `times` existence checks (any key) fail.
    pub fn fail_exists(&self, times: usize) {
        self.inner.exists_failures.store(times, Ordering::SeqCst);
    }

    /// Reading `key` panics.
    pub fn panic_on_read(&self, key: &str) {
        self.inner.panic_on_read.lock().unwrap().push(Key::from(key));
    }

    /// Every read sleeps this long before returning.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock().unwrap() = Some(delay);
    }

    /// `ping()` fails.
    pub fn set_ping_fails(&self, fails: bool) {
        self.inner.ping_fails.store(fails, Ordering::SeqCst);
    }

    // =========================================================================
    // Recorded calls
    // =========================================================================

    pub fn read_count(&self, key: &str) -> usize {
        self.inner.reads.lock().unwrap().get(&Key::from(key)).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.inner.reads.lock().unwrap().values().sum()
    }

    pub fn write_count(&self, key: &str) -> usize {
        self.inner.writes.lock().unwrap().get(&Key::from(key)).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.inner.writes.lock().unwrap().values().sum()
    }

    pub fn exists_count(&self) -> usize {
        self.inner.exists_calls.load(Ordering::SeqCst)
    }

    /// Highest number of reads that were in progress at once.
    pub fn max_concurrent_reads(&self) -> usize {
        self.inner.max_concurrent_reads.load(Ordering::SeqCst)
    }
}

struct ActiveRead<'a>(&'a Inner);

impl<'a> ActiveRead<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_concurrent_reads.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for ActiveRead<'_> {
    fn drop(&mut self) {
        self.0.active_reads.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectStore for MockStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if self.inner.ping_fails.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected ping failure".into()));
            }
            Ok(())
        })
    }

    fn exists(&self, key: &Key) -> StoreFuture<'_, bool> {
        let key = key.clone();
        Box::pin(async move {
            self.inner.exists_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .inner
                .exists_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                    0 => None,
                    ALWAYS => Some(ALWAYS),
                    n => Some(n - 1),
                })
                .is_ok();
            if failing {
                return Err(StoreError::Unavailable("injected exists failure".into()));
            }
            self.inner.objects.exists(&key).await
        })
    }

    fn read(&self, key: &Key) -> StoreFuture<'_, ObjectReader> {
        let key = key.clone();
        Box::pin(async move {
            bump(&self.inner.reads, &key);
            let _active = ActiveRead::enter(&self.inner);

            let delay = *self.inner.read_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.inner.panic_on_read.lock().unwrap().contains(&key) {
                panic!("injected panic reading {}", key);
            }
            if take(&self.inner.read_failures, &key) {
                return Err(StoreError::Unavailable(format!("injected read failure for {}", key)));
            }
            if take(&self.inner.empty_reads, &key) {
                return Ok(Box::pin(std::io::Cursor::new(Vec::new())) as ObjectReader);
            }
            self.inner.objects.read(&key).await
        })
    }

    fn write(&self, key: &Key, body: ObjectReader, len: u64) -> StoreFuture<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            if take(&self.inner.write_failures, &key) {
                return Err(StoreError::Unavailable(format!("injected write failure for {}", key)));
            }
            self.inner.objects.write(&key, body, len).await?;
            bump(&self.inner.writes, &key);
            Ok(())
        })
    }
}

/// Connector over named [`MockStore`]s that can refuse the first N attempts.
pub struct MockConnector {
    stores: HashMap<String, MockStore>,
    refuse_first: usize,
    attempts: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockConnector {
    /// `source` registered as "source", `destination` as "destination",
    /// matching `SyncJob::for_testing`.
    pub fn new(source: &MockStore, destination: &MockStore) -> Self {
        let mut stores = HashMap::new();
        stores.insert("source".to_string(), source.clone());
        stores.insert("destination".to_string(), destination.clone());
        Self {
            stores,
            refuse_first: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Refuse the first `n` connect calls (across both sides).
    pub fn refusing_first(mut self, n: usize) -> Self {
        self.refuse_first = n;
        self
    }

    /// Shared counter of connect calls.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

impl StoreConnector for MockConnector {
    type Store = MockStore;

    fn connect(&self, endpoint: &StoreEndpoint, _namespace: &str) -> StoreFuture<'_, MockStore> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let found = endpoint
            .addresses
            .iter()
            .find_map(|addr| self.stores.get(addr).cloned());
        let refuse = attempt <= self.refuse_first;
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            if refuse {
                return Err(StoreError::Unavailable(format!("injected connect refusal ({})", attempt)));
            }
            found.ok_or_else(|| StoreError::Unavailable(format!("no store at {}", endpoint)))
        })
    }
}
