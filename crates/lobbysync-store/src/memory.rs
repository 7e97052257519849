//! In-memory [`DocumentStore`] with optimistic compare-and-swap transactions.
//!
//! Each document carries a version. A transaction reads `(bytes, version)`,
//! runs its body without holding the lock, yields to the scheduler, and
//! commits only if the version is unchanged; otherwise it re-runs the body.
//! The yield between read and commit is what lets concurrent transactions
//! in tests actually interleave.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

use crate::{Change, ChangeEvent, Document, DocumentStore, StoreError, TxWrite, Watch};

/// Tunables for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// How many times a transaction body may be re-run after losing a
    /// compare-and-swap race before giving up with
    /// [`StoreError::Contention`].
    pub max_tx_attempts: u32,
    /// Capacity of the change-feed buffer. Slow watchers beyond this see a
    /// [`Change::Resync`].
    pub event_buffer: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_tx_attempts: 25,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    data: Vec<u8>,
    version: u64,
}

struct Inner {
    docs: Mutex<BTreeMap<String, Stored>>,
    events: broadcast::Sender<ChangeEvent>,
    next_version: AtomicU64,
    next_auto_id: AtomicU64,
    offline: AtomicBool,
    faults: Mutex<VecDeque<StoreError>>,
    config: MemoryStoreConfig,
}

/// A process-local store. Cheap to clone; clones share the same data, so
/// several simulated clients can hold one each.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store with default settings.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Creates an empty store with the given settings.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(BTreeMap::new()),
                events,
                next_version: AtomicU64::new(1),
                next_auto_id: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                faults: Mutex::new(VecDeque::new()),
                config,
            }),
        }
    }

    /// Makes the next store operation fail with `error`. Queued errors are
    /// consumed one per operation, in order.
    pub fn fail_next(&self, error: StoreError) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.push_back(error);
        }
    }

    /// While offline, every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored documents (all collections).
    pub fn len(&self) -> usize {
        self.docs().map(|d| d.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn docs(&self) -> Result<MutexGuard<'_, BTreeMap<String, Stored>>, StoreError> {
        self.inner
            .docs
            .lock()
            .map_err(|_| StoreError::Internal("lock poisoned".into()))
    }

    /// Applies injected faults and the offline switch.
    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        let injected = self
            .inner
            .faults
            .lock()
            .map_err(|_| StoreError::Internal("lock poisoned".into()))?
            .pop_front();
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn publish(&self, key: &str, change: Change) {
        // No receivers is fine: nobody is watching.
        let _ = self.inner.events.send(ChangeEvent {
            key: key.to_owned(),
            change,
        });
    }

    fn read_versioned(&self, key: &str) -> Result<(Option<Vec<u8>>, u64), StoreError> {
        let docs = self.docs()?;
        Ok(match docs.get(key) {
            Some(stored) => (Some(stored.data.clone()), stored.version),
            None => (None, 0),
        })
    }

    /// Commits `write` if `key` is still at `expected`. Returns `false` on
    /// a lost race.
    fn commit(&self, key: &str, expected: u64, write: TxWrite) -> Result<bool, StoreError> {
        let mut docs = self.docs()?;
        let current = docs.get(key).map_or(0, |s| s.version);
        if current != expected {
            return Ok(false);
        }
        match write {
            TxWrite::Keep => {}
            TxWrite::Put(data) => {
                let version = self.inner.next_version.fetch_add(1, Ordering::Relaxed);
                docs.insert(
                    key.to_owned(),
                    Stored {
                        data: data.clone(),
                        version,
                    },
                );
                self.publish(key, Change::Put(data));
            }
            TxWrite::Delete => {
                if docs.remove(key).is_some() {
                    self.publish(key, Change::Deleted);
                }
            }
        }
        Ok(true)
    }

    fn write_unconditionally(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let mut docs = self.docs()?;
        let version = self.inner.next_version.fetch_add(1, Ordering::Relaxed);
        docs.insert(
            key.to_owned(),
            Stored {
                data: data.clone(),
                version,
            },
        );
        self.publish(key, Change::Put(data));
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `true` if `key` is a direct child of `collection`.
fn is_direct_child(collection: &str, key: &str) -> bool {
    key.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|id| !id.is_empty() && !id.contains('/'))
}

impl DocumentStore for MemoryStore {
    fn server_time(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        Ok(self.read_versioned(key)?.0)
    }

    async fn set(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.check_available()?;
        self.write_unconditionally(key, data)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let removed = self.docs()?.remove(key).is_some();
        if removed {
            self.publish(key, Change::Deleted);
        }
        Ok(())
    }

    async fn add(&self, collection: &str, data: Vec<u8>) -> Result<String, StoreError> {
        self.check_available()?;
        let id = self.inner.next_auto_id.fetch_add(1, Ordering::Relaxed);
        let key = format!("{collection}/{id:020}");
        self.write_unconditionally(&key, data)?;
        Ok(key)
    }

    async fn query(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        let docs = self.docs()?;
        Ok(docs
            .iter()
            .filter(|(key, _)| is_direct_child(collection, key))
            .map(|(key, stored)| Document {
                key: key.clone(),
                data: stored.data.clone(),
            })
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let removed: Vec<String> = {
            let mut docs = self.docs()?;
            let keys: Vec<String> = docs
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            for key in &keys {
                docs.remove(key);
            }
            keys
        };
        for key in &removed {
            self.publish(key, Change::Deleted);
        }
        Ok(removed.len())
    }

    async fn transact<F, R, E>(&self, key: &str, mut body: F) -> Result<R, E>
    where
        F: FnMut(Option<&[u8]>) -> Result<(TxWrite, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        self.check_available()?;
        let attempts = self.inner.config.max_tx_attempts.max(1);

        for attempt in 1..=attempts {
            let (snapshot, version) = self.read_versioned(key)?;
            let (write, out) = body(snapshot.as_deref())?;
            if write == TxWrite::Keep {
                return Ok(out);
            }

            tokio::task::yield_now().await;

            if self.commit(key, version, write)? {
                return Ok(out);
            }
            tracing::trace!(key, attempt, "transaction lost race, retrying");
        }

        tracing::debug!(key, attempts, "transaction gave up under contention");
        Err(StoreError::Contention {
            key: key.to_owned(),
            attempts,
        }
        .into())
    }

    fn watch(&self, prefix: &str) -> Watch {
        Watch::new(prefix, self.inner.events.subscribe())
    }
}
