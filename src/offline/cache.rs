//! Response cache for offline reads.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

/// A cached response body.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
}

impl CacheEntry {
    /// True if the entry is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// A thread-safe, in-memory cache of successful responses keyed by cache key.
///
/// Entries are only read while offline; nothing is written to disk.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a response under `key`, replacing any previous entry.
    pub fn insert(&self, key: &str, value: Value) {
        self.inner.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Get the value for `key` if it is younger than `ttl`.
    pub fn get_fresh(&self, key: &str, ttl: Duration) -> Option<Value> {
        let entry = self.inner.get(key)?;
        if entry.is_fresh(ttl) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn remove(&self, key: &str) {
        self.inner.remove(key);
    }

    /// Drop every entry older than `ttl`.
    pub fn purge_older_than(&self, ttl: Duration) {
        self.inner.retain(|_, entry| entry.is_fresh(ttl));
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_operations() {
        let cache = ResponseCache::new();
        assert!(cache.get_fresh("classes", Duration::from_secs(60)).is_none());

        cache.insert("classes", json!([{ "id": 1 }]));
        let value = cache.get_fresh("classes", Duration::from_secs(60)).unwrap();
        assert_eq!(value[0]["id"], 1);

        cache.insert("classes", json!([]));
        assert_eq!(cache.get_fresh("classes", Duration::from_secs(60)).unwrap(), json!([]));
        assert_eq!(cache.len(), 1);

        cache.remove("classes");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_not_served() {
        let cache = ResponseCache::new();
        cache.insert("users", json!({ "total": 3 }));

        assert!(cache.get_fresh("users", Duration::ZERO).is_none());

        cache.purge_older_than(Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::new();
        let other = cache.clone();
        other.insert("k", json!(true));
        assert_eq!(cache.get_fresh("k", Duration::from_secs(1)), Some(json!(true)));
        cache.clear();
        assert!(other.is_empty());
    }
}
