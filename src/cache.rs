//! Keyed byte-value cache with per-entry TTL.
//!
//! A standalone collaborator: the request path does not consult it yet. The
//! intended integration point is a lookup keyed on method and path before a
//! request reaches the forwarder, with the backend's response body inserted
//! on the way out.

use bytes::Bytes;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Concurrent byte-value store where every entry carries its own TTL.
///
/// Expired entries are evicted lazily, on the lookup that finds them stale.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    value: Bytes,
    expires_at: Instant,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store a value that expires after `ttl`. Re-inserting a key replaces
    /// the value and restarts its TTL.
    pub fn insert(&self, key: impl Into<String>, value: Bytes, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Fetch a live value, or `None` once the TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        // The shard guard from `get` must be released before `remove`
        let expired = match self.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Number of stored entries, counting stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_roundtrip_within_ttl() {
        let cache = ResponseCache::new();
        cache.insert("k", Bytes::from_static(b"value"), Duration::from_millis(100));

        assert_eq!(cache.get("k"), Some(Bytes::from_static(b"value")));
    }

    #[test]
    fn test_expires_after_ttl() {
        let cache = ResponseCache::new();
        cache.insert("k", Bytes::from_static(b"value"), Duration::from_millis(50));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_expired_entry_evicted_on_lookup() {
        let cache = ResponseCache::new();
        cache.insert("k", Bytes::from_static(b"value"), Duration::from_millis(10));
        assert_eq!(cache.len(), 1);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_key() {
        let cache = ResponseCache::new();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_reinsert_restarts_ttl() {
        let cache = ResponseCache::new();
        cache.insert("k", Bytes::from_static(b"old"), Duration::from_millis(20));
        cache.insert("k", Bytes::from_static(b"new"), Duration::from_millis(200));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("k"), Some(Bytes::from_static(b"new")));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(ResponseCache::new());
        let mut handles = Vec::new();

        for i in 0..4 {
            let cache = std::sync::Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("k{}-{}", i, j);
                    cache.insert(key.as_str(), Bytes::from_static(b"v"), Duration::from_secs(10));
                    assert!(cache.get(&key).is_some());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
    }
}
