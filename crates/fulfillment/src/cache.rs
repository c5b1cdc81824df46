//! Lookup caches for product and user details.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A keyed cache with per-entry expiry.
pub trait Cache<K, V>: Send + Sync {
    /// Returns a live entry.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores an entry that expires after `ttl`.
    fn set(&self, key: K, value: V, ttl: Duration);

    /// Drops an entry.
    fn invalidate(&self, key: &K);
}

/// In-process cache backed by a mutex-guarded map.
///
/// Expired entries are dropped lazily on lookup.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
{
    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Cache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (value, expires_at));
    }

    fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl<K, V> Cache<K, V> for NoopCache {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn set(&self, _key: K, _value: V, _ttl: Duration) {}

    fn invalidate(&self, _key: &K) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_live_entry() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::ZERO);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_and_overwrite() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("a", 2, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), Some(2));

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        Cache::<&str, i32>::set(&cache, "a", 1, Duration::from_secs(60));
        assert_eq!(Cache::<&str, i32>::get(&cache, &"a"), None);
    }
}
