//! In-memory [`AnalysisCache`].
//!
//! A `HashMap` behind `std::sync::RwLock`: lookups share the lock, writes
//! and sweeps take it exclusively. Entries live for the life of the
//! process; nothing is persisted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::{cache_key, AnalysisCache};

struct CacheEntry {
    result: String,
    created_at: DateTime<Utc>,
}

/// Process-wide analysis cache. Create once and share via `Arc`.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written entry,
    // so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn put_at(
        &self,
        hash: &str,
        result: String,
        kind: &str,
        focus_areas: &[String],
        created_at: DateTime<Utc>,
    ) {
        self.write().insert(
            cache_key(hash, kind, focus_areas),
            CacheEntry { result, created_at },
        );
    }
}

impl AnalysisCache for InMemoryCache {
    fn get(&self, hash: &str, kind: &str, focus_areas: &[String]) -> Option<String> {
        self.read()
            .get(&cache_key(hash, kind, focus_areas))
            .map(|e| e.result.clone())
    }

    fn put(&self, hash: &str, result: String, kind: &str, focus_areas: &[String]) {
        self.put_at(hash, result, kind, focus_areas, Utc::now());
    }

    fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| {
            let age = now
                .signed_duration_since(e.created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            age <= max_age
        });
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn areas(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_after_put() {
        let cache = InMemoryCache::new();
        cache.put("h1", "{\"issues\":[]}".to_string(), "chunked", &areas(&["b", "a"]));
        assert_eq!(
            cache.get("h1", "chunked", &areas(&["a", "b"])),
            Some("{\"issues\":[]}".to_string())
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_kind_or_areas_miss() {
        let cache = InMemoryCache::new();
        cache.put("h1", "r".to_string(), "chunked", &areas(&["a"]));
        assert_eq!(cache.get("h1", "full", &areas(&["a"])), None);
        assert_eq!(cache.get("h1", "chunked", &areas(&["a", "b"])), None);
        assert_eq!(cache.get("h1", "chunked", &[]), None);
        assert_eq!(cache.get("h2", "chunked", &areas(&["a"])), None);
    }

    #[test]
    fn test_joined_area_name_is_a_different_entry() {
        let cache = InMemoryCache::new();
        cache.put("h", "two areas".to_string(), "chunked", &areas(&["a", "b"]));
        assert_eq!(cache.get("h", "chunked", &areas(&["a,b"])), None);
        assert_eq!(
            cache.get("h", "chunked", &areas(&["b", "a"])),
            Some("two areas".to_string())
        );
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let cache = InMemoryCache::new();
        cache.put("h", "old".to_string(), "k", &[]);
        cache.put("h", "new".to_string(), "k", &[]);
        assert_eq!(cache.get("h", "k", &[]), Some("new".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_older_than() {
        let cache = InMemoryCache::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        cache.put_at("stale", "s".to_string(), "k", &[], old);
        cache.put("fresh", "f".to_string(), "k", &[]);

        assert_eq!(cache.evict_older_than(Duration::from_secs(3600)), 1);
        assert_eq!(cache.get("stale", "k", &[]), None);
        assert_eq!(cache.get("fresh", "k", &[]), Some("f".to_string()));

        assert_eq!(cache.evict_older_than(Duration::MAX), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(InMemoryCache::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let hash = format!("h{}-{}", t, i);
                        cache.put(&hash, i.to_string(), "k", &[]);
                        assert_eq!(cache.get(&hash, "k", &[]), Some(i.to_string()));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
