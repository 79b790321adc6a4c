//! In-memory TTL cache for idempotent HTTP reads.
//!
//! Entries expire lazily: a read that finds a stale entry removes it and
//! reports a miss. [`TtlCache::purge_expired`] and
//! [`TtlCache::spawn_sweeper`] are available for long-running processes that
//! want stale entries reclaimed proactively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock::Clock;

/// For frequently changing data.
pub const SHORT_TTL: Duration = Duration::from_secs(30);
/// Default TTL.
pub const MEDIUM_TTL: Duration = Duration::from_secs(60);
/// For stable data.
pub const LONG_TTL: Duration = Duration::from_secs(5 * 60);
/// For rarely changing data.
pub const VERY_LONG_TTL: Duration = Duration::from_secs(15 * 60);

/// Builds a cache key from a URL and its query parameters.
///
/// Parameters are sorted by name (then value) so equivalent requests built in
/// a different order share one entry. A URL without parameters is its own key.
pub fn cache_key(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort();

    let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{url}?{}", query.join("&"))
}

struct Entry<V> {
    value: V,
    expires_at: u64,
}

/// Entry counts reported by [`TtlCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// Key → (value, expiry) store with lazy eviction.
///
/// An entry written at `t0` with time-to-live `ttl` is returned by
/// [`get`](Self::get) while `now < t0 + ttl` and is absent from then on.
pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache using [`MEDIUM_TTL`] as the default lifetime.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_default_ttl(clock, MEDIUM_TTL)
    }

    /// Creates an empty cache with a custom default lifetime.
    pub fn with_default_ttl(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            clock,
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The lifetime used by [`set_default`](Self::set_default).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        // Entries are plain data; a panic mid-update cannot leave them torn.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the stored value if it has not expired, removing it otherwise.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut entries = self.lock();

        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "evicted stale cache entry");
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// A zero `ttl` would produce an entry that is already expired, so it is
    /// not stored (and any previous entry for `key` is dropped). Lifetimes
    /// below a millisecond round up to one.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.lock();

        if ttl.is_zero() {
            entries.remove(&key);
            debug!(key = %key, "refusing to cache with zero ttl");
            return;
        }
        let ttl_ms = u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);

        let expires_at = self.clock.now_millis().saturating_add(ttl_ms);
        entries.insert(key, Entry { value, expires_at });
    }

    /// Stores `value` with the default lifetime.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Removes a single key.
    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Removes every key starting with `prefix`; returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(prefix, removed, "invalidated cache entries");
        }
        removed
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of physically stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Counts valid and expired entries without evicting anything.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let entries = self.lock();
        let valid = entries.values().filter(|e| now < e.expires_at).count();

        CacheStats {
            total: entries.len(),
            valid,
            expired: entries.len() - valid,
        }
    }

    /// Removes all expired entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    /// Spawns a task that purges expired entries every `interval`.
    ///
    /// The task stops once every other handle to the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "swept expired cache entries");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache() -> (Arc<ManualClock>, TtlCache<String>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = TtlCache::new(clock.clone());
        (clock, cache)
    }

    #[test]
    fn value_is_returned_before_ttl_and_absent_at_ttl() {
        let (clock, cache) = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(10));

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn stale_read_evicts_entry() {
        let (clock, cache) = cache();
        cache.set("k", "v".to_string(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn set_overwrites_and_restarts_lifetime() {
        let (clock, cache) = cache();
        cache.set("k", "old".to_string(), Duration::from_secs(5));
        clock.advance(Duration::from_secs(4));
        cache.set("k", "new".to_string(), Duration::from_secs(5));
        clock.advance(Duration::from_secs(4));

        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let (_clock, cache) = cache();
        cache.set("k", "v".to_string(), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn sub_millisecond_ttl_rounds_up() {
        let (clock, cache) = cache();
        cache.set("k", "v".to_string(), Duration::from_micros(900));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);

        cache.set("k", "v".to_string(), Duration::from_micros(1_500));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn invalidate_prefix_only_hits_matching_keys() {
        let (_clock, cache) = cache();
        cache.set_default("/api/portfolio", "a".to_string());
        cache.set_default("/api/portfolio/transactions", "b".to_string());
        cache.set_default("/api/dashboard", "c".to_string());

        assert_eq!(cache.invalidate_prefix("/api/portfolio"), 2);
        assert_eq!(cache.get("/api/dashboard").as_deref(), Some("c"));
        assert_eq!(cache.get("/api/portfolio"), None);
    }

    #[test]
    fn invalidate_and_clear() {
        let (_clock, cache) = cache();
        cache.set_default("a", "1".to_string());
        cache.set_default("b", "2".to_string());

        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_and_purge() {
        let (clock, cache) = cache();
        cache.set("short", "1".to_string(), Duration::from_secs(1));
        cache.set("long", "2".to_string(), Duration::from_secs(100));
        clock.advance(Duration::from_secs(5));

        assert_eq!(
            cache.stats(),
            CacheStats {
                total: 2,
                valid: 1,
                expired: 1
            }
        );
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_key_sorts_parameters() {
        let a = cache_key("/api/stocks/history", &[("symbol", "TCS"), ("range", "1m")]);
        let b = cache_key("/api/stocks/history", &[("range", "1m"), ("symbol", "TCS")]);
        assert_eq!(a, b);
        assert_eq!(a, "/api/stocks/history?range=1m&symbol=TCS");
        assert_eq!(cache_key("/api/dashboard", &[]), "/api/dashboard");
    }

    #[tokio::test]
    async fn sweeper_stops_when_cache_dropped() {
        let (clock, cache) = cache();
        let cache = Arc::new(cache);
        cache.set("k", "v".to_string(), Duration::from_millis(1));
        clock.advance(Duration::from_secs(1));

        let handle = cache.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
