//! # Durable Keyed Store
//!
//! The key-value seam all batch bookkeeping runs on. The runtime never talks to
//! a concrete database; it talks to [`KeyedStore`], which models the minimum
//! capability set the bookkeeping needs: reads with a write version, conditional
//! writes, a versioned compare-and-swap, atomic counters, key expiry, and
//! multi-key deletes.
//!
//! Implementations must make every method atomic with respect to concurrent
//! callers on the same key. The node repository builds its linearizability
//! guarantees out of `compare_and_swap`, and relies on `incr` never losing an
//! increment under contention.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! single-process deployments, and `RedisStore` (feature `redis-store`) for
//! distributed deployments.

mod memory;

#[cfg(feature = "redis-store")]
mod redis;

pub use memory::MemoryStore;

#[cfg(feature = "redis-store")]
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A value read from the store together with the version of the write that
/// produced it. Versions are per-key, start at 1, and increase by one on every
/// successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

/// Outcome of a [`KeyedStore::compare_and_swap`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The swap landed; carries the new version.
    Swapped(u64),
    /// Another writer updated the key first; re-read and retry.
    Conflict,
    /// The key does not exist (or its TTL elapsed).
    Missing,
}

/// Errors surfaced by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {message}")]
    Connection { message: String },

    #[error("store operation failed: {operation}: {message}")]
    Operation { operation: String, message: String },

    #[error("store value at {key} is not an integer")]
    NotAnInteger { key: String },
}

impl StoreError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an operation error
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value contract with atomic primitives.
///
/// String keys live in two disjoint namespaces by convention: record keys hold
/// opaque string values (JSON documents in practice) and move through
/// `get`/`put`/`put_if_absent`/`compare_and_swap`; counter keys hold integers
/// and move through `incr` only. Read a counter with a zero-delta `incr` rather
/// than `get`.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Read a record key. Returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedValue>>;

    /// Unconditional write. Creates the key when absent and returns the new
    /// version.
    async fn put(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Conditional write: succeeds only when the key is absent. Returns whether
    /// this call created the key.
    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Versioned conditional write: replaces the value only when the key's
    /// current version equals `expected_version`. A successful swap preserves
    /// any TTL already stamped on the key.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        value: &str,
    ) -> StoreResult<CasOutcome>;

    /// Atomic counter increment; a missing key starts from zero. Returns the
    /// value after the increment.
    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Read a counter key without creating or modifying it. Returns `None`
    /// when the key is missing or expired.
    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Stamp a time-to-live on an existing key. Returns `false` when the key is
    /// missing.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete any number of keys in one call. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;
}
