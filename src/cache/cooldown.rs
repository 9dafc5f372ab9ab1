//! Per-key cooldowns with expiry callbacks.
//!
//! ## Lifecycle of a key
//!
//! ```text
//! ABSENT --add--> ON_COOLDOWN --cancel--> ABSENT              (no callback)
//!                 ON_COOLDOWN --sweep---> ABSENT              (callback fires once)
//!                 ON_COOLDOWN --add-----> ON_COOLDOWN         (old callback dropped)
//! ```
//!
//! Reads never evict. Only the periodic sweep removes expired entries, and
//! only the caller that wins the removal runs the callback, so a callback
//! cannot fire twice or after a cancel that reached the map first.

use std::borrow::Borrow;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::error::{CacheError, validate_duration};
use super::CooldownConfig;
use crate::clock::{Clock, SystemClock};
use crate::scheduler::{Schedulers, TaskHandle, panic_message};

/// Callback run with the key when its cooldown expires naturally.
pub type CooldownAction<K> = Arc<dyn Fn(&K) + Send + Sync>;

struct CooldownEntry<K> {
    expires_at: Instant,
    action: Option<CooldownAction<K>>,
}

impl<K> CooldownEntry<K> {
    #[inline]
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Inner<K, C> {
    entries: DashMap<K, CooldownEntry<K>>,
    default_duration: Duration,
    default_action: RwLock<Option<CooldownAction<K>>>,
    clock: C,
    /// Held for the duration of a sweep.
    sweeping: Mutex<()>,
}

impl<K, C> Inner<K, C>
where
    K: Hash + Eq + Clone,
    C: Clock,
{
    fn sweep(&self) -> usize {
        let Some(_sweeping) = self.sweeping.try_lock() else {
            debug!("Cooldown sweep already in progress, skipping");
            return 0;
        };

        let now = self.clock.now();
        let due: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_live(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = 0;
        for key in due {
            // Cancelled or replaced since the scan: nothing to fire.
            let Some((key, entry)) = self
                .entries
                .remove_if(&key, |_, entry| !entry.is_live(now))
            else {
                continue;
            };
            expired += 1;

            if let Some(action) = entry.action
                && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action(&key)))
            {
                error!(
                    "Cooldown callback panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        if expired > 0 {
            debug!("Cooldown sweep expired {} entries", expired);
        }
        expired
    }
}

/// Tracks which keys are on cooldown and fires a callback when a cooldown
/// runs out.
///
/// A background task owned by the registry sweeps expired entries every
/// [`CooldownConfig::sweep_period`]. Dropping the registry stops it.
pub struct CooldownRegistry<K, C = SystemClock> {
    inner: Arc<Inner<K, C>>,
    sweeper: TaskHandle,
}

impl<K> CooldownRegistry<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Create a registry and start its sweeper on `config.domain`.
    pub fn new(schedulers: &Schedulers, config: CooldownConfig) -> Result<Self, CacheError> {
        Self::with_clock(schedulers, config, SystemClock)
    }
}

impl<K, C> CooldownRegistry<K, C>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create a registry that reads time from `clock`.
    pub fn with_clock(
        schedulers: &Schedulers,
        config: CooldownConfig,
        clock: C,
    ) -> Result<Self, CacheError> {
        let default_duration = validate_duration("cooldown", config.default_duration)?;

        let inner = Arc::new(Inner {
            entries: DashMap::new(),
            default_duration,
            default_action: RwLock::new(None),
            clock,
            sweeping: Mutex::new(()),
        });

        let weak: Weak<Inner<K, C>> = Arc::downgrade(&inner);
        let sweeper = schedulers.get(config.domain).run_repeating(
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep();
                }
            },
            config.sweep_period,
            config.sweep_period,
        )?;

        info!(
            "Cooldown registry started (default {:?}, sweep every {:?} on {:?})",
            default_duration, config.sweep_period, config.domain
        );

        Ok(Self { inner, sweeper })
    }

    /// Callback used by [`add`](Self::add) and [`add_for`](Self::add_for).
    pub fn set_default_action(&self, action: Option<CooldownAction<K>>) {
        *self.inner.default_action.write() = action;
    }

    pub fn default_duration(&self) -> Duration {
        self.inner.default_duration
    }

    /// Put `key` on cooldown for the default duration with the default
    /// callback.
    pub fn add(&self, key: K) {
        let action = self.inner.default_action.read().clone();
        self.insert(key, self.inner.default_duration, action);
    }

    /// Put `key` on cooldown for `duration` with the default callback.
    pub fn add_for(&self, key: K, duration: Duration) -> Result<(), CacheError> {
        let duration = validate_duration("cooldown", duration)?;
        let action = self.inner.default_action.read().clone();
        self.insert(key, duration, action);
        Ok(())
    }

    /// Put `key` on cooldown for `duration` with `action`, or no callback.
    ///
    /// An existing cooldown for `key` is replaced and its callback will
    /// never run.
    pub fn add_with(
        &self,
        key: K,
        duration: Duration,
        action: Option<CooldownAction<K>>,
    ) -> Result<(), CacheError> {
        let duration = validate_duration("cooldown", duration)?;
        self.insert(key, duration, action);
        Ok(())
    }

    fn insert(&self, key: K, duration: Duration, action: Option<CooldownAction<K>>) {
        let entry = CooldownEntry {
            expires_at: self.inner.clock.now() + duration,
            action,
        };
        self.inner.entries.insert(key, entry);
    }

    /// Take `key` off cooldown without running its callback.
    ///
    /// Returns `false` if there was nothing to cancel, including when the
    /// sweep already expired it.
    pub fn cancel<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.entries.remove(key).is_some()
    }

    /// Whether `key` is on cooldown right now. Never evicts.
    pub fn on_cooldown<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Time left on `key`'s cooldown, or `None` if it is not on cooldown.
    pub fn remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.inner.clock.now();
        let entry = self.inner.entries.get(key)?;
        entry.is_live(now).then(|| entry.expires_at - now)
    }

    /// Expire every entry whose cooldown has run out, firing callbacks.
    ///
    /// This is what the background sweeper runs. Returns how many entries
    /// expired in this pass; a pass that overlaps another returns 0.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Number of entries, including expired ones the sweep has not reached.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Handle of the background sweeper.
    pub fn sweeper(&self) -> &TaskHandle {
        &self.sweeper
    }
}

impl<K, C> Drop for CooldownRegistry<K, C> {
    fn drop(&mut self) {
        self.sweeper.stop();
        debug!("Cooldown registry dropped, sweeper stopped");
    }
}

impl<K, C> std::fmt::Debug for CooldownRegistry<K, C>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownRegistry")
            .field("default_duration", &self.inner.default_duration)
            .field("entries", &self.inner.entries.len())
            .field("sweeps", &self.sweeper.times_ran())
            .finish()
    }
}
