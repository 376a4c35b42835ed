//! Cache-aside response cache with per-entry TTL.
//!
//! Keys are opaque fingerprints supplied by the caller; this module performs
//! no semantic interpretation of them. Expiry is lazy: moka's per-entry
//! expiry policy makes an entry past its TTL indistinguishable from absence
//! on the next read, with no background sweep of our own. Reads and writes
//! to distinct keys never block one another.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

#[derive(Clone)]
struct CacheEntry<V> {
    payload: V,
    ttl: Duration,
}

/// Reads each entry's own TTL; `put` with a new TTL resets the clock.
struct PerEntryTtl;

impl<K, V> Expiry<K, CacheEntry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &CacheEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &CacheEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Approximate live entry count.
    pub entries: u64,
}

/// Concurrent fingerprint → payload cache.
///
/// Cheap to clone; all clones share the same store and counters.
#[derive(Clone)]
pub struct ResponseCache<V> {
    entries: Cache<String, CacheEntry<V>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Look up a fingerprint. An expired entry is a miss, identical to absence.
    pub async fn get(&self, fingerprint: &str) -> Option<V> {
        match self.entries.get(fingerprint).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.payload)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload under a fingerprint, overwriting any prior entry for
    /// the same key and restarting its TTL.
    pub async fn put(&self, fingerprint: &str, payload: V, ttl: Duration) {
        self.entries
            .insert(fingerprint.to_string(), CacheEntry { payload, ttl })
            .await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_hits() {
        let cache = ResponseCache::new(100);
        cache.put("fp-1", "answer".to_string(), Duration::from_secs(60)).await;

        assert_eq!(cache.get("fp-1").await.as_deref(), Some("answer"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn absent_key_misses() {
        let cache: ResponseCache<String> = ResponseCache::new(100);
        assert!(cache.get("nope").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = ResponseCache::new(100);
        cache.put("fp-1", "answer".to_string(), Duration::from_millis(80)).await;

        assert!(cache.get("fp-1").await.is_some());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get("fp-1").await.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_and_restarts_ttl() {
        let cache = ResponseCache::new(100);
        cache.put("fp-1", "old".to_string(), Duration::from_millis(50)).await;
        cache.put("fp-1", "new".to_string(), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("fp-1").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let cache = ResponseCache::new(100);
        cache.put("fp-1", "a".to_string(), Duration::from_secs(60)).await;
        cache.put("fp-2", "b".to_string(), Duration::from_secs(60)).await;

        assert_eq!(cache.get("fp-1").await.as_deref(), Some("a"));
        assert_eq!(cache.get("fp-2").await.as_deref(), Some("b"));
    }
}
