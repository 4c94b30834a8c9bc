//! TTL cache backing the typed table client.
//!
//! Keys are `{base}:{table}:{operation}:{digest}`, so invalidating the
//! `{base}:{table}:` prefix drops every cached read for that table.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache tuning for the table client.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process TTL cache.
///
/// Concurrency model is last-write-wins per key; readers and writers go
/// through one mutex and never hold it across an await point.
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a fresh entry. Expired entries are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.config.enabled {
            return None;
        }

        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay_table_cache_hits_total").increment(1);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay_table_cache_misses_total").increment(1);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("relay_table_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Store a value under the configured TTL.
    pub fn put(&self, key: String, value: serde_json::Value) {
        if !self.config.enabled {
            return;
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.config.ttl,
        };
        self.entries.lock().unwrap().insert(key, entry);
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many were
    /// removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_get() {
        let cache = TtlCache::default();
        cache.put("a:b:list:1".to_string(), json!([1, 2]));

        assert_eq!(cache.get("a:b:list:1"), Some(json!([1, 2])));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_miss_counts() {
        let cache = TtlCache::default();
        assert_eq!(cache.get("absent"), None);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = TtlCache::new(CacheConfig {
            enabled: true,
            ttl: Duration::from_millis(0),
        });
        cache.put("k".to_string(), json!(1));

        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = TtlCache::new(CacheConfig {
            enabled: false,
            ttl: Duration::from_secs(60),
        });
        cache.put("k".to_string(), json!(1));

        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_prefix_only_drops_matching() {
        let cache = TtlCache::default();
        cache.put("base:contacts:list:1".to_string(), json!(1));
        cache.put("base:contacts:get:2".to_string(), json!(2));
        cache.put("base:leads:list:3".to_string(), json!(3));

        let removed = cache.invalidate_prefix("base:contacts:");
        assert_eq!(removed, 2);
        assert_eq!(cache.get("base:leads:list:3"), Some(json!(3)));
        assert_eq!(cache.get("base:contacts:list:1"), None);
    }

    #[test]
    fn test_clear() {
        let cache = TtlCache::default();
        cache.put("k".to_string(), json!(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
