//! TTL key-value cache for resolved application identities
//!
//! [`Cache`] is the contract the identity resolver depends on; [`TtlCache`]
//! is the thread-safe in-memory implementation. Entries expire after the
//! configured TTL and are lazily evicted on read, or in bulk by the
//! background janitor started with [`TtlCache::spawn_janitor`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Generic TTL key-value store.
///
/// Implementations must be safe for concurrent `get`/`set` without any
/// locking by the caller. The TTL is owned by the cache.
pub trait Cache<V>: Send + Sync {
    /// Look up a live entry
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace an entry with the cache's TTL
    fn set(&self, key: &str, value: V);
}

/// A cached value with its expiry deadline
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Thread-safe in-memory cache with per-entry expiry
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    stats: CacheStats,
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Remove every expired entry, returning how many were evicted
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before.saturating_sub(self.entries.len());

        if evicted > 0 {
            self.stats
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Periodically evict expired entries until `shutdown` fires.
    ///
    /// A zero `interval` disables the janitor; expired entries are then only
    /// dropped when read.
    pub fn spawn_janitor(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.evict_expired();
                        let stats = cache.stats();
                        debug!(
                            evicted,
                            size = stats.size,
                            hits = stats.hits,
                            misses = stats.misses,
                            evictions = stats.evictions,
                            "Identity cache sweep"
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }))
    }
}

impl<V: Clone + Send + Sync> Cache<V> for TtlCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                // A concurrent `set` may have refreshed the entry in between
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn set(&self, key: &str, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key.to_owned(), entry);
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses (absent or expired)
    pub misses: u64,
    /// Total evictions of expired entries
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_cache_hit() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("app1", ids(&["id1"]));

        assert_eq!(cache.get("app1"), Some(ids(&["id1"])));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache: TtlCache<Vec<String>> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("nonexistent"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.set("app1", ids(&[]));
        assert_eq!(cache.get("app1"), Some(Vec::new()));

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.get("app1"), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_counted_once_per_removed_entry() {
        let cache = TtlCache::new(Duration::from_millis(5));
        cache.set("app1", 1_u32);
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("app1"), None);
        assert_eq!(cache.get("app1"), None);
        assert_eq!(cache.evict_expired(), 0);

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_refresh_after_expiry_is_live() {
        let cache = TtlCache::new(Duration::from_millis(5));
        cache.set("app1", 1_u32);
        std::thread::sleep(Duration::from_millis(10));
        cache.set("app1", 2_u32);

        assert_eq!(cache.get("app1"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_set_replaces_whole_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("app1", ids(&["a", "b"]));
        cache.set("app1", ids(&["c"]));
        assert_eq!(cache.get("app1"), Some(ids(&["c"])));
        assert_eq!(cache.stats().size, 1);
    }

    #[test]
    fn test_evict_expired() {
        let cache = TtlCache::new(Duration::from_millis(5));
        cache.set("app1", 1_u32);
        std::thread::sleep(Duration::from_millis(10));
        cache.set("app2", 2_u32);

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.stats().size, 1);
        assert_eq!(cache.get("app2"), Some(2));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let key = format!("app{}", j % 10);
                        cache.set(&key, i);
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().size, 10);
    }

    #[tokio::test]
    async fn test_janitor_evicts_and_stops() {
        let cache = Arc::new(TtlCache::new(Duration::from_millis(1)));
        cache.set("app1", 1_u32);

        let (tx, rx) = broadcast::channel(1);
        let handle = cache
            .spawn_janitor(Duration::from_millis(5), rx)
            .expect("janitor enabled");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.stats().size, 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_zero_interval_disables_janitor() {
        let cache = Arc::new(TtlCache::<u32>::new(Duration::from_secs(1)));
        let (_tx, rx) = broadcast::channel(1);
        assert!(cache.spawn_janitor(Duration::ZERO, rx).is_none());
    }
}
