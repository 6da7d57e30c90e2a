//! # TTL Cache
//!
//! Keyed, time-bounded read cache in front of the external store. An entry is
//! fresh while `now < fetched_at + ttl`. Stale or missing entries are refetched
//! on read; a failed refetch returns the fetch error and leaves nothing behind.
//!
//! Concurrent misses may refetch in parallel. That is fine for read-mostly
//! reference data and keeps the lock out of the fetch path.

use crate::error::BookingResult;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Bumped per key by `invalidate`
    generations: HashMap<K, u64>,
    /// Bumped by `invalidate_all`
    epoch: u64,
}

impl<K: Eq + Hash, V> CacheState<K, V> {
    fn generation(&self, key: &K) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or(0))
    }
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    state: RwLock<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let state = self.state.read().await;
        self.fresh(&state, key)
    }

    fn fresh(&self, state: &CacheState<K, V>, key: &K) -> Option<V> {
        state
            .entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Return the cached value or run `fetch` and cache its result.
    ///
    /// A fetch that was overtaken by an invalidation still returns its value
    /// to this caller but is not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> BookingResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BookingResult<V>>,
    {
        let generation = {
            let state = self.state.read().await;
            if let Some(value) = self.fresh(&state, &key) {
                return Ok(value);
            }
            state.generation(&key)
        };

        debug!(cache = self.name, key = ?key, "Cache miss, fetching");
        let value = fetch().await?;

        let mut state = self.state.write().await;
        if state.generation(&key) == generation {
            state.entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                },
            );
        } else {
            debug!(cache = self.name, key = ?key, "Invalidated during fetch, not caching");
        }
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        let mut state = self.state.write().await;
        state.entries.remove(key);
        *state.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        if !state.entries.is_empty() {
            debug!(cache = self.name, entries = state.entries.len(), "Cache cleared");
        }
        state.entries.clear();
        state.generations.clear();
        state.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookingError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    async fn fetch_counted(counter: &AtomicUsize) -> BookingResult<usize> {
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_cached_value_until_ttl() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(60));
        let fetches = AtomicUsize::new(0);

        assert_eq!(cache.get_or_fetch((), || fetch_counted(&fetches)).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get_or_fetch((), || fetch_counted(&fetches)).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get_or_fetch((), || fetch_counted(&fetches)).await.unwrap(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache: TtlCache<&str, usize> = TtlCache::new("test", Duration::from_secs(600));
        let fetches = AtomicUsize::new(0);

        cache.get_or_fetch("a", || fetch_counted(&fetches)).await.unwrap();
        cache.get_or_fetch("b", || fetch_counted(&fetches)).await.unwrap();
        cache.invalidate(&"a").await;

        assert!(cache.get(&"a").await.is_none());
        assert_eq!(cache.get(&"b").await, Some(2));
        assert_eq!(cache.get_or_fetch("a", || fetch_counted(&fetches)).await.unwrap(), 3);

        cache.invalidate_all().await;
        assert!(cache.get(&"b").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_returns_error() {
        let cache: TtlCache<(), usize> = TtlCache::new("test", Duration::from_secs(10));
        cache.get_or_fetch((), || async { Ok(7) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let err = cache
            .get_or_fetch((), || async { Err(BookingError::Store("quota".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Store(_)));

        // The stale value is not served afterwards either
        assert!(cache.get(&()).await.is_none());
    }

    /// Start a fetch of `1` that blocks until released, run `bust` while it
    /// is in flight, then check a later read refetches
    async fn fetch_overtaken_by(bust: impl std::future::Future<Output = ()>, cache: Arc<TtlCache<(), usize>>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let reader = {
            let (cache, started, release) = (cache.clone(), started.clone(), release.clone());
            tokio::spawn(async move {
                cache
                    .get_or_fetch((), || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok(1)
                    })
                    .await
            })
        };

        started.notified().await;
        bust.await;
        release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), 1);
        assert!(cache.get(&()).await.is_none());
        assert_eq!(cache.get_or_fetch((), || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_is_not_undone() {
        let cache = Arc::new(TtlCache::new("test", Duration::from_secs(600)));
        fetch_overtaken_by(cache.invalidate(&()), cache.clone()).await;

        let cache = Arc::new(TtlCache::new("test", Duration::from_secs(600)));
        fetch_overtaken_by(cache.invalidate_all(), cache.clone()).await;
    }
}
