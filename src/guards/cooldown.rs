//! Command cooldown gate.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheError, CooldownRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::scheduler::Schedulers;

/// Lets a participant run an action once per cooldown.
pub struct ActionGate<K, C = SystemClock> {
    cooldowns: CooldownRegistry<K, C>,
}

impl<K> ActionGate<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(schedulers: &Schedulers, config: &GuardConfig) -> Result<Self, CacheError> {
        Ok(Self {
            cooldowns: CooldownRegistry::new(schedulers, config.cooldown_config())?,
        })
    }
}

impl<K, C> ActionGate<K, C>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock,
{
    pub fn from_registry(cooldowns: CooldownRegistry<K, C>) -> Self {
        Self { cooldowns }
    }

    /// Check whether `key` may act now.
    ///
    /// Returns the time left if `key` is still on cooldown (block).
    /// Otherwise starts a new cooldown that calls `on_ready` when it runs
    /// out, and returns `None`.
    pub fn check<F>(&self, key: K, on_ready: F) -> Option<Duration>
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        if let Some(remaining) = self.cooldowns.remaining(&key) {
            return Some(remaining);
        }

        let duration = self.cooldowns.default_duration();
        if let Err(e) = self.cooldowns.add_with(key, duration, Some(Arc::new(on_ready))) {
            warn!("Failed to start cooldown: {}", e);
        }
        None
    }

    /// Lift `key`'s cooldown without notifying it.
    pub fn cancel(&self, key: &K) -> bool {
        self.cooldowns.cancel(key)
    }

    pub fn cooldowns(&self) -> &CooldownRegistry<K, C> {
        &self.cooldowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::cache::CooldownConfig;
    use crate::clock::ManualClock;

    #[test]
    fn test_gate_blocks_until_cooldown_expires() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let clock = ManualClock::new();
        let registry = CooldownRegistry::with_clock(
            &Schedulers::new(rt.handle().clone()),
            CooldownConfig::with_duration(Duration::from_secs(10)),
            clock.clone(),
        )
        .unwrap();
        let gate = ActionGate::from_registry(registry);
        let ready = Arc::new(AtomicU32::new(0));

        let r = Arc::clone(&ready);
        assert_eq!(
            gate.check("p", move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
            None
        );

        clock.advance(Duration::from_secs(4));
        assert_eq!(gate.check("p", |_| {}), Some(Duration::from_secs(6)));

        clock.advance(Duration::from_secs(7));
        gate.cooldowns().sweep();
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(gate.check("p", |_| {}), None);
    }

    #[test]
    fn test_cancel_skips_notification() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let clock = ManualClock::new();
        let registry = CooldownRegistry::with_clock(
            &Schedulers::new(rt.handle().clone()),
            CooldownConfig::with_duration(Duration::from_secs(10)),
            clock.clone(),
        )
        .unwrap();
        let gate = ActionGate::from_registry(registry);
        let ready = Arc::new(AtomicU32::new(0));

        let r = Arc::clone(&ready);
        gate.check(1u64, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert!(gate.cancel(&1));

        clock.advance(Duration::from_secs(11));
        gate.cooldowns().sweep();
        assert_eq!(ready.load(Ordering::SeqCst), 0);
    }
}
