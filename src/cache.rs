//! Read-through cache with a fixed time-to-live per instance.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

// ---

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

/// Caches loader results keyed by query parameters.
///
/// Only successful loads are stored. Concurrent misses on the same key may
/// both run the loader; the later result wins.
pub struct ReadThroughCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh cached value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        // ---
        let mut entries = self.entries();
        entries.retain(|_, e| e.created_at.elapsed() < self.ttl);
        entries.get(key).map(|e| e.value.clone())
    }

    /// Return the cached value or run `load` and cache what it returns.
    pub async fn get_or_load<E, F, Fut>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // ---
        if let Some(hit) = self.get(&key) {
            debug!(cache = self.name, ?key, "Cache hit");
            return Ok(hit);
        }

        debug!(cache = self.name, ?key, "Cache miss");
        let value = load().await?;
        self.entries().insert(
            key,
            CacheEntry {
                value: value.clone(),
                created_at: Instant::now(),
            },
        );
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.entries().remove(key);
    }

    pub fn invalidate_all(&self) {
        debug!(cache = self.name, "Cache cleared");
        self.entries().clear();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn load_counted(calls: &AtomicUsize, value: u32) -> Result<u32, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test]
    async fn test_hits_within_ttl() {
        // ---
        let cache = ReadThroughCache::new("test", Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get_or_load(10u32, || load_counted(&calls, 1)).await, Ok(1));
        assert_eq!(cache.get_or_load(10u32, || load_counted(&calls, 2)).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Different parameters are a different key.
        assert_eq!(cache.get_or_load(20u32, || load_counted(&calls, 3)).await, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        // ---
        let cache = ReadThroughCache::new("test", Duration::ZERO);
        let calls = AtomicUsize::new(0);

        cache.get_or_load((), || load_counted(&calls, 1)).await.unwrap();
        cache.get_or_load((), || load_counted(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidation() {
        // ---
        let cache = ReadThroughCache::new("test", Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache.get_or_load(1u32, || load_counted(&calls, 5)).await.unwrap();
        cache.get_or_load(2u32, || load_counted(&calls, 6)).await.unwrap();
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(6));

        cache.invalidate_all();
        assert_eq!(cache.get(&2), None);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        // ---
        let cache: ReadThroughCache<u32, u32> = ReadThroughCache::new("test", Duration::from_secs(60));

        let failed = cache.get_or_load(1, || async { Err::<u32, _>("down".to_string()) }).await;
        assert!(failed.is_err());
        assert_eq!(cache.get(&1), None);

        let ok = cache.get_or_load(1, || async { Ok::<_, String>(7) }).await;
        assert_eq!(ok, Ok(7));
    }
}
