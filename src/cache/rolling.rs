//! Sliding window occurrence counter.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::error::{CacheError, validate_duration};
use super::CacheConfig;
use crate::clock::{Clock, SystemClock};

struct Inner<K, C> {
    /// Per-key expiry instants, in insertion order.
    events: DashMap<K, VecDeque<Instant>>,
    window: Duration,
    clock: C,
}

/// Counts how many times each key was seen within a trailing window.
///
/// Every [`increment`](Self::increment) records one event that expires
/// `window` later. Expired events are pruned only when the key is counted,
/// so a key that is never read again keeps its memory until
/// [`reset`](Self::reset).
///
/// Cloning is cheap and shares the same underlying map.
pub struct RollingWindowCache<K, C = SystemClock> {
    inner: Arc<Inner<K, C>>,
}

impl<K, C> Clone for RollingWindowCache<K, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> RollingWindowCache<K>
where
    K: Hash + Eq,
{
    /// Create a counter over a trailing `window`.
    pub fn new(window: Duration) -> Result<Self, CacheError> {
        Self::with_clock(window, SystemClock)
    }

    /// Create a counter from a [`CacheConfig`], using its `window`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.window)
    }
}

impl<K, C> RollingWindowCache<K, C>
where
    K: Hash + Eq,
    C: Clock,
{
    /// Create a counter that reads time from `clock`.
    pub fn with_clock(window: Duration, clock: C) -> Result<Self, CacheError> {
        let window = validate_duration("window", window)?;
        Ok(Self {
            inner: Arc::new(Inner {
                events: DashMap::new(),
                window,
                clock,
            }),
        })
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Record one occurrence of `key` now.
    pub fn increment(&self, key: K) {
        let expires_at = self.inner.clock.now() + self.inner.window;
        self.inner
            .events
            .entry(key)
            .or_default()
            .push_back(expires_at);
    }

    /// Number of occurrences of `key` within the window ending now.
    ///
    /// Prunes the key's expired events; a key left with none is dropped.
    pub fn get_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        let count = {
            let Some(mut events) = self.inner.events.get_mut(key) else {
                return 0;
            };
            // Concurrent increments may land out of order, so walk it all.
            events.retain(|expires_at| *expires_at > now);
            events.len()
        };
        if count == 0 {
            self.inner
                .events
                .remove_if(key, |_, events| events.is_empty());
        }
        count
    }

    /// Forget every recorded occurrence of `key`.
    pub fn reset<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.events.remove(key);
    }

    /// Number of tracked keys, including keys whose events all expired but
    /// were not counted since.
    pub fn len(&self) -> usize {
        self.inner.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.events.is_empty()
    }
}

impl<K, C> std::fmt::Debug for RollingWindowCache<K, C>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingWindowCache")
            .field("window", &self.inner.window)
            .field("keys", &self.inner.events.len())
            .finish()
    }
}
