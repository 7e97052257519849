//! Document store abstraction for Lobbysync.
//!
//! Provides the [`DocumentStore`] trait: the capabilities the lobby
//! protocol needs from its backing store, and nothing more.
//!
//! - `transact`: serializable read-modify-write of a single document.
//!   This is the only concurrency-control primitive the lobby uses.
//! - `watch`: best-effort, at-least-once push of committed changes.
//! - `query`: a point-in-time snapshot of a collection.
//!
//! Keys are `/`-separated paths (`lobbies/123456/presence/uid-1`). A
//! collection is a path whose direct children are documents.
//!
//! [`MemoryStore`] is the in-process backend used by tests and the demo.

mod error;
mod memory;
mod watch;

use std::future::Future;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use watch::{Change, ChangeEvent, Watch};

/// What a transaction body wants to do with the document it read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxWrite {
    /// Commit nothing. The transaction ends without a write.
    Keep,
    /// Replace (or create) the document.
    Put(Vec<u8>),
    /// Remove the document.
    Delete,
}

/// A document returned by [`DocumentStore::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Full key, e.g. `lobbies/123456/messages/00000000000000000007`.
    pub key: String,
    /// Encoded document body.
    pub data: Vec<u8>,
}

impl Document {
    /// The last path segment of the key.
    pub fn id(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// The capabilities a backing store must provide.
///
/// Every future is `Send` so store calls can run inside spawned tasks
/// (heartbeats, per-lobby session actors).
pub trait DocumentStore: Send + Sync + 'static {
    /// Current time on the store's clock, in Unix milliseconds.
    ///
    /// Used for `createdAt`, chat timestamps and presence heartbeats so
    /// every client orders by the same clock.
    fn server_time(&self) -> u64;

    /// Reads one document.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Unconditionally writes one document.
    fn set(&self, key: &str, data: Vec<u8>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes one document. Removing a missing document is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends a document under `collection` with a store-assigned id.
    ///
    /// Ids sort in insertion order. Returns the full key.
    fn add(&self, collection: &str, data: Vec<u8>) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Snapshot of the direct children of `collection`, sorted by key.
    fn query(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Removes every document whose key starts with `prefix`.
    ///
    /// Returns the number of documents removed.
    fn delete_prefix(&self, prefix: &str) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Runs `body` against a consistent read of `key` and commits its
    /// decision atomically.
    ///
    /// `body` receives the current bytes (or `None` if absent) and returns
    /// a [`TxWrite`] plus a result value. If another writer committed to
    /// `key` in between, the store re-runs `body` on the fresh value, so
    /// `body` must be free of side effects. An `Err` from `body` aborts
    /// the transaction without writing and is returned as-is.
    fn transact<F, R, E>(&self, key: &str, body: F) -> impl Future<Output = Result<R, E>> + Send
    where
        F: FnMut(Option<&[u8]>) -> Result<(TxWrite, R), E> + Send,
        R: Send,
        E: From<StoreError> + Send;

    /// Subscribes to committed changes of every key equal to or starting
    /// with `prefix`.
    ///
    /// The feed carries no initial snapshot: subscribe first, then read,
    /// so that nothing committed in between is missed.
    fn watch(&self, prefix: &str) -> Watch;
}
