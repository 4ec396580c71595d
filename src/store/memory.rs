//! In-memory [`KeyedStore`] backed by a sharded concurrent map.
//!
//! Intended for tests and single-process deployments. Atomicity comes from
//! DashMap's per-shard locking: every trait method touches one key under its
//! shard lock. Expiry is lazy; an expired entry is dropped by whichever
//! operation observes it next.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CasOutcome, KeyedStore, StoreError, StoreResult, VersionedValue};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local store with versioned records, atomic counters, and lazy TTLs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry eagerly. Useful in tests that assert on
    /// `len()` after a TTL elapses.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<VersionedValue>> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Ok(None);
                }
                let entry = occupied.get();
                Ok(Some(VersionedValue {
                    value: entry.value.clone(),
                    version: entry.version,
                }))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<u64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry {
                        value: value.to_string(),
                        version: 1,
                        expires_at: None,
                    });
                    return Ok(1);
                }
                let next_version = occupied.get().version + 1;
                let expires_at = occupied.get().expires_at;
                occupied.insert(StoredEntry {
                    value: value.to_string(),
                    version: next_version,
                    expires_at,
                });
                Ok(next_version)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: value.to_string(),
                    version: 1,
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry {
                        value: value.to_string(),
                        version: 1,
                        expires_at: None,
                    });
                    return Ok(true);
                }
                Ok(false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: value.to_string(),
                    version: 1,
                    expires_at: None,
                });
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        value: &str,
    ) -> StoreResult<CasOutcome> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Ok(CasOutcome::Missing);
                }
                if occupied.get().version != expected_version {
                    return Ok(CasOutcome::Conflict);
                }
                let next_version = expected_version + 1;
                let expires_at = occupied.get().expires_at;
                occupied.insert(StoredEntry {
                    value: value.to_string(),
                    version: next_version,
                    expires_at,
                });
                Ok(CasOutcome::Swapped(next_version))
            }
            Entry::Vacant(_) => Ok(CasOutcome::Missing),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry {
                        value: delta.to_string(),
                        version: 1,
                        expires_at: None,
                    });
                    return Ok(delta);
                }
                let current: i64 = occupied.get().value.parse().map_err(|_| {
                    StoreError::NotAnInteger {
                        key: key.to_string(),
                    }
                })?;
                let next = current + delta;
                let next_version = occupied.get().version + 1;
                let expires_at = occupied.get().expires_at;
                occupied.insert(StoredEntry {
                    value: next.to_string(),
                    version: next_version,
                    expires_at,
                });
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: delta.to_string(),
                    version: 1,
                    expires_at: None,
                });
                Ok(delta)
            }
        }
    }

    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Ok(None);
                }
                let value: i64 = occupied.get().value.parse().map_err(|_| {
                    StoreError::NotAnInteger {
                        key: key.to_string(),
                    }
                })?;
                Ok(Some(value))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Ok(false);
                }
                occupied.get_mut().expires_at = Some(now + ttl);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        let version = store.put("k", "one").await.unwrap();
        assert_eq!(version, 1);

        let read = store.get("k").await.unwrap().unwrap();
        assert_eq!(read.value, "one");
        assert_eq!(read.version, 1);

        let version = store.put("k", "two").await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(store.get("k").await.unwrap().unwrap().value, "two");
    }

    #[tokio::test]
    async fn test_put_if_absent_only_creates() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("k", "first").await.unwrap());
        assert!(!store.put_if_absent("k", "second").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().unwrap().value, "first");
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_conflicts() {
        let store = MemoryStore::new();
        assert_eq!(
            store.compare_and_swap("k", 1, "x").await.unwrap(),
            CasOutcome::Missing
        );

        store.put("k", "base").await.unwrap();
        assert_eq!(
            store.compare_and_swap("k", 1, "next").await.unwrap(),
            CasOutcome::Swapped(2)
        );
        // Stale version loses.
        assert_eq!(
            store.compare_and_swap("k", 1, "stale").await.unwrap(),
            CasOutcome::Conflict
        );
        assert_eq!(store.get("k").await.unwrap().unwrap().value, "next");
    }

    #[tokio::test]
    async fn test_incr_is_atomic_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    store.incr("counter", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_counter("counter").await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_get_counter_on_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get_counter("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer_values() {
        let store = MemoryStore::new();
        store.put("k", "not a number").await.unwrap();
        let err = store.incr("k", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnInteger { .. }));
    }

    #[tokio::test]
    async fn test_expired_keys_read_as_missing() {
        let store = MemoryStore::new();
        store.put("k", "v").await.unwrap();
        assert!(store.expire("k", Duration::from_millis(10)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("k").await.unwrap().is_none());
        // Expired keys can be recreated.
        assert!(store.put_if_absent("k", "fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_preserves_ttl() {
        let store = MemoryStore::new();
        store.put("k", "v").await.unwrap();
        store.expire("k", Duration::from_secs(60)).await.unwrap();

        store.compare_and_swap("k", 1, "v2").await.unwrap();
        let entry = store.entries.get("k").unwrap();
        assert!(entry.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_returns_false() {
        let store = MemoryStore::new();
        assert!(!store.expire("nope", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys() {
        let store = MemoryStore::new();
        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.delete(&keys).await.unwrap(), 2);
        assert!(store.is_empty());
    }
}
