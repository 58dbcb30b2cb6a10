//! In-memory cache for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::{CacheError, CacheResult, KeyValueCache, effective_ttl};

/// Operations between full sweeps of expired entries.
const SWEEP_INTERVAL: usize = 1_024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
    ops_since_sweep: usize,
}

/// Process-local [`KeyValueCache`].
///
/// - Single mutex; every operation is atomic with respect to the others
/// - Expiry follows `tokio::time`, so paused-clock tests can step through TTLs
/// - An expired key is dropped when it is next touched; everything else
///   expired goes in a full sweep every [`SWEEP_INTERVAL`] operations
/// - Not shared across processes: lockout and revocation stay per-instance
#[derive(Debug, Default)]
pub struct InMemoryCache {
    store: Mutex<Store>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| CacheError::Unavailable("in-memory cache lock poisoned".to_string()))
    }

    /// Run `f` with `key` already pruned if it has expired.
    fn with_key<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> CacheResult<T> {
        let mut store = self.lock()?;
        let now = Instant::now();

        store.ops_since_sweep += 1;
        if store.ops_since_sweep >= SWEEP_INTERVAL {
            store.entries.retain(|_, entry| entry.is_live(now));
            store.ops_since_sweep = 0;
        } else if store.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            store.entries.remove(key);
        }

        Ok(f(&mut store.entries, now))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|store| store.entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.with_key(key, |entries, now| entries.get(key).map(|e| e.expires_at - now))
            .ok()
            .flatten()
    }

    #[cfg(test)]
    fn stored(&self) -> usize {
        self.lock().map(|store| store.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.with_key(key, |entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + effective_ttl(ttl),
                },
            );
        })
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.with_key(key, |entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + effective_ttl(ttl),
                },
            );
            true
        })
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.with_key(key, |entries, _| entries.get(key).map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.with_key(key, |entries, _| entries.contains_key(key))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
        self.with_key(key, |entries, now| {
            let expires_at = now + effective_ttl(ttl);
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at,
            });
            let current: u64 = entry.value.parse().map_err(|_| {
                CacheError::Command(format!("value at '{key}' is not an integer"))
            })?;
            let next = current.saturating_add(1);
            entry.value = next.to_string();
            entry.expires_at = expires_at;
            Ok(next)
        })?
    }

    async fn decr(&self, key: &str) -> CacheResult<u64> {
        self.with_key(key, |entries, _| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(0);
            };
            let current: u64 = entry.value.parse().map_err(|_| {
                CacheError::Command(format!("value at '{key}' is not an integer"))
            })?;
            let next = current.saturating_sub(1);
            if next == 0 {
                entries.remove(key);
            } else {
                entry.value = next.to_string();
            }
            Ok(next)
        })?
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.with_key(key, |entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = now + effective_ttl(ttl);
                true
            }
            None => false,
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.with_key(key, |entries, _| entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_does_not_overwrite_live_key() {
        let cache = InMemoryCache::new();

        assert!(cache.set_nx_ex("k", "first", Duration::from_secs(5)).await.unwrap());
        assert!(!cache.set_nx_ex("k", "second", Duration::from_secs(5)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("first"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.set_nx_ex("k", "third", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_and_rearms_window() {
        let cache = InMemoryCache::new();
        let window = Duration::from_secs(60);

        assert_eq!(cache.incr_with_ttl("c", window).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.incr_with_ttl("c", window).await.unwrap(), 2);

        // Second failure pushed the window out by another minute.
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("2"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_rejects_non_integer_values() {
        let cache = InMemoryCache::new();
        cache.set_ex("c", "abc", Duration::from_secs(5)).await.unwrap();

        let err = cache.incr_with_ttl("c", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CacheError::Command(_)));
    }

    #[tokio::test]
    async fn zero_ttl_is_clamped_to_minimum() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v", Duration::ZERO).await.unwrap();

        assert!(cache.exists("k").await.unwrap());
        assert!(cache.ttl("k").unwrap() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn expire_and_delete_report_missing_keys() {
        let cache = InMemoryCache::new();

        assert!(!cache.expire("missing", Duration::from_secs(5)).await.unwrap());
        assert!(!cache.delete("missing").await.unwrap());

        cache.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(cache.expire("k", Duration::from_secs(50)).await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn decr_floors_at_zero_and_keeps_ttl() {
        let cache = InMemoryCache::new();
        let window = Duration::from_secs(60);

        assert_eq!(cache.decr("c").await.unwrap(), 0);
        assert!(!cache.exists("c").await.unwrap());

        cache.incr_with_ttl("c", window).await.unwrap();
        cache.incr_with_ttl("c", window).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(cache.decr("c").await.unwrap(), 1);
        assert_eq!(cache.ttl("c"), Some(Duration::from_secs(40)));

        assert_eq!(cache.decr("c").await.unwrap(), 0);
        assert!(!cache.exists("c").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn touching_a_key_prunes_only_that_key() {
        let cache = InMemoryCache::new();
        for key in ["a", "b", "c"] {
            cache.set_ex(key, "1", Duration::from_secs(1)).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        assert!(!cache.exists("a").await.unwrap());
        assert_eq!(cache.stored(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_periodically() {
        let cache = InMemoryCache::new();
        for i in 0..100 {
            cache.set_ex(&format!("k{i}"), "1", Duration::from_secs(1)).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(1)).await;

        for _ in 0..SWEEP_INTERVAL {
            cache.exists("other").await.unwrap();
        }

        assert_eq!(cache.stored(), 0);
    }
}
