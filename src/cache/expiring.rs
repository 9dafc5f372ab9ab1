//! Key-value cache with a per-cache time-to-live.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::error::{CacheError, validate_duration};
use super::CacheConfig;
use crate::clock::{Clock, SystemClock};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    #[inline]
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    fn into_live(self, now: Instant) -> Option<V> {
        self.is_live(now).then_some(self.value)
    }
}

struct Inner<K, V, C> {
    entries: DashMap<K, Entry<V>>,
    ttl: RwLock<Duration>,
    clock: C,
}

/// A concurrent map whose values expire a fixed time after they are written.
///
/// Expired values are evicted lazily, by the next read of their key. Nothing
/// sweeps the map in the background, so [`len`](Self::len) and
/// [`is_empty`](Self::is_empty) also count expired values that have not been
/// read since. For the same reason bulk views are refused with
/// [`CacheError::Unsupported`] instead of returning stale data.
///
/// Cloning is cheap and shares the same underlying map.
pub struct ExpiringCache<K, V, C = SystemClock> {
    inner: Arc<Inner<K, V, C>>,
}

// Manual Clone implementation that doesn't require K: Clone, V: Clone
impl<K, V, C> Clone for ExpiringCache<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a cache whose values live for `ttl`.
    pub fn new(ttl: Duration) -> Result<Self, CacheError> {
        Self::with_clock(ttl, SystemClock)
    }

    /// Create a cache from a [`CacheConfig`], using its `ttl`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.ttl)
    }
}

impl<K, V, C> ExpiringCache<K, V, C>
where
    K: Hash + Eq,
    V: Clone,
    C: Clock,
{
    /// Create a cache that reads time from `clock`.
    pub fn with_clock(ttl: Duration, clock: C) -> Result<Self, CacheError> {
        let ttl = validate_duration("ttl", ttl)?;
        Ok(Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                ttl: RwLock::new(ttl),
                clock,
            }),
        })
    }

    /// Current time-to-live for new writes.
    pub fn expiration(&self) -> Duration {
        *self.inner.ttl.read()
    }

    /// Change the time-to-live for future writes.
    ///
    /// Values already stored keep the expiry they were written with.
    pub fn set_expiration(&self, ttl: Duration) -> Result<(), CacheError> {
        let ttl = validate_duration("ttl", ttl)?;
        *self.inner.ttl.write() = ttl;
        debug!("Cache TTL set to {:?}", ttl);
        Ok(())
    }

    /// Store `value` under `key`, replacing whatever was there.
    ///
    /// Returns the previous value if it had not expired yet.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let now = self.inner.clock.now();
        let entry = Entry {
            value,
            expires_at: now + self.expiration(),
        };
        self.inner
            .entries
            .insert(key, entry)
            .and_then(|old| old.into_live(now))
    }

    /// Get a value if it exists and has not expired.
    ///
    /// An expired value is evicted as a side effect.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        {
            let entry = self.inner.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        self.evict_expired(key, now);
        None
    }

    /// Remove a key, returning its value if it had not expired.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        self.inner
            .entries
            .remove(key)
            .and_then(|(_, entry)| entry.into_live(now))
    }

    /// Check whether a live value exists for `key`.
    ///
    /// An expired value is evicted as a side effect.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        let live = match self.inner.entries.get(key) {
            Some(entry) => entry.is_live(now),
            None => return false,
        };
        if !live {
            self.evict_expired(key, now);
        }
        live
    }

    /// Number of stored values, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether nothing is stored, counting expired values not yet evicted.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Remove every value.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Always fails: listing values would require sweeping expired entries.
    pub fn values(&self) -> Result<Vec<V>, CacheError> {
        Err(CacheError::Unsupported("values"))
    }

    /// Always fails: listing entries would require sweeping expired entries.
    pub fn entries(&self) -> Result<Vec<(K, V)>, CacheError> {
        Err(CacheError::Unsupported("entries"))
    }

    /// Always fails; store values one at a time with [`put`](Self::put).
    pub fn put_all<I>(&self, _entries: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Err(CacheError::Unsupported("put_all"))
    }

    fn evict_expired<Q>(&self, key: &Q, now: Instant)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Re-check under the shard lock: a concurrent put may have refreshed it.
        self.inner
            .entries
            .remove_if(key, |_, entry| !entry.is_live(now));
    }
}

impl<K, V, C> std::fmt::Debug for ExpiringCache<K, V, C>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("ttl", &*self.inner.ttl.read())
            .field("len", &self.inner.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(ttl_ms: u64) -> (ExpiringCache<String, i32, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let cache = ExpiringCache::with_clock(Duration::from_millis(ttl_ms), clock.clone()).unwrap();
        (cache, clock)
    }

    #[test]
    fn test_value_visible_until_ttl() {
        let (cache, clock) = cache(100);
        assert_eq!(cache.put("a".to_string(), 1), None);

        clock.advance(Duration::from_millis(50));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_expires_exactly_at_deadline() {
        let (cache, clock) = cache(100);
        cache.put("a".to_string(), 1);

        clock.advance(Duration::from_millis(99));
        assert!(cache.contains_key("a"));

        clock.advance(Duration::from_millis(1));
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_get_evicts_expired_entry() {
        let (cache, clock) = cache(100);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        clock.advance(Duration::from_millis(200));

        // Unread expired entries still count.
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        // Repeated reads have no further effect.
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains_key("a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_contains_key_evicts_expired_entry() {
        let (cache, clock) = cache(100);
        cache.put("a".to_string(), 1);
        clock.advance(Duration::from_millis(100));

        assert!(!cache.contains_key("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_returns_previous_live_value() {
        let (cache, clock) = cache(100);
        assert_eq!(cache.put("a".to_string(), 1), None);
        assert_eq!(cache.put("a".to_string(), 2), Some(1));

        clock.advance(Duration::from_millis(150));
        assert_eq!(cache.put("a".to_string(), 3), None);
        assert_eq!(cache.get("a"), Some(3));
    }

    #[test]
    fn test_put_refreshes_expiry() {
        let (cache, clock) = cache(100);
        cache.put("a".to_string(), 1);
        clock.advance(Duration::from_millis(80));
        cache.put("a".to_string(), 2);
        clock.advance(Duration::from_millis(80));

        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_remove_after_expiry_matches_absent() {
        let (cache, clock) = cache(100);
        cache.put("a".to_string(), 1);
        clock.advance(Duration::from_millis(100));

        assert_eq!(cache.remove("a"), None);
        assert_eq!(cache.remove("never"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_returns_live_value() {
        let (cache, _clock) = cache(100);
        cache.put("a".to_string(), 7);

        assert_eq!(cache.remove("a"), Some(7));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_set_expiration_affects_only_new_writes() {
        let (cache, clock) = cache(100);
        cache.put("old".to_string(), 1);

        cache.set_expiration(Duration::from_secs(10)).unwrap();
        assert_eq!(cache.expiration(), Duration::from_secs(10));
        cache.put("new".to_string(), 2);

        clock.advance(Duration::from_millis(500));
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.get("new"), Some(2));
    }

    #[test]
    fn test_from_config_uses_ttl() {
        let cache: ExpiringCache<u64, String> =
            ExpiringCache::from_config(&CacheConfig::last_message()).unwrap();
        assert_eq!(cache.expiration(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_durations_rejected() {
        assert!(ExpiringCache::<String, i32>::new(Duration::ZERO).is_err());

        let (cache, _clock) = cache(100);
        assert!(cache.set_expiration(Duration::ZERO).is_err());
        assert_eq!(cache.expiration(), Duration::from_millis(100));
    }

    #[test]
    fn test_bulk_operations_fail_loudly() {
        let (cache, _clock) = cache(100);
        cache.put("a".to_string(), 1);

        assert_eq!(cache.values(), Err(CacheError::Unsupported("values")));
        assert_eq!(cache.entries(), Err(CacheError::Unsupported("entries")));
        assert_eq!(
            cache.put_all(vec![("b".to_string(), 2)]),
            Err(CacheError::Unsupported("put_all"))
        );
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_clones_share_entries() {
        let (cache, _clock) = cache(100);
        let other = cache.clone();
        other.put("a".to_string(), 1);

        assert_eq!(cache.get("a"), Some(1));
        cache.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let cache: ExpiringCache<u64, u64> = ExpiringCache::new(Duration::from_secs(60)).unwrap();

        std::thread::scope(|s| {
            for t in 0..4u64 {
                let cache = cache.clone();
                s.spawn(move || {
                    for i in 0..250 {
                        cache.put(t * 1000 + i, i);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.get(&3010), Some(10));
    }
}
