// TTL cache with single-flight refresh
// ttl_cache.rs
use super::cache_stats::{CacheStats, CacheStatsSnapshot};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheItem<V> {
    value: V,
    // None: never expires
    expires_at: Option<Instant>,
}

impl<V> CacheItem<V> {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }
}

/// Typed key/value cache. Every entry carries the TTL handed back by the
/// populate callback that produced it; a zero TTL never expires.
///
/// Concurrent misses on the same key are coalesced: the populate callback runs
/// under the write lock and waiting callers re-check once they get the lock,
/// so each miss window costs exactly one upstream call.
pub struct TtlCache<V> {
    name: String,
    items: RwLock<HashMap<String, CacheItem<V>>>,
    stats: CacheStats,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get_or_set<F, Fut>(&self, key: &str, populate: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (V, Duration)>,
    {
        {
            let items = self.items.read().await;
            if let Some(item) = items.get(key) {
                if item.is_live(Instant::now()) {
                    self.stats.record_hit();
                    log::debug!("[{}] cache hit: {}", self.name, key);
                    return item.value.clone();
                }
            }
        }

        let mut items = self.items.write().await;

        // somebody could have refreshed the key while we were waiting for the lock
        let present = match items.get(key) {
            Some(item) if item.is_live(Instant::now()) => {
                self.stats.record_hit();
                log::debug!("[{}] cache hit after wait: {}", self.name, key);
                return item.value.clone();
            }
            Some(_) => {
                self.stats.record_expired();
                true
            }
            None => false,
        };

        log::debug!("[{}] cache miss: {}", self.name, key);
        let (value, ttl) = populate().await;
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        items.insert(
            key.to_string(),
            CacheItem {
                value: value.clone(),
                expires_at,
            },
        );
        if present {
            self.stats.record_update();
        } else {
            self.stats.record_set();
        }
        self.stats.record_miss();
        value
    }

    /// Returns a live value without populating. Does not touch the counters.
    pub async fn get(&self, key: &str) -> Option<V> {
        let items = self.items.read().await;
        items
            .get(key)
            .filter(|item| item.is_live(Instant::now()))
            .map(|item| item.value.clone())
    }

    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.items.write().await.remove(key).is_some();
        if removed {
            self.stats.record_deletes(1);
        }
        removed
    }

    /// Drops entries whose TTL has elapsed. Reads already treat them as absent.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, item| item.is_live(now));
        let removed = before - items.len();
        if removed > 0 {
            self.stats.record_deletes(removed as u64);
            log::debug!("[{}] purged {} expired entries", self.name, removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
