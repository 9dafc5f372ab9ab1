//! Antiflood guard.
//!
//! Blocks a participant who sends more than `max_messages` messages inside
//! the flood window.

use std::hash::Hash;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheError, RollingWindowCache};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;

/// Per-participant flood tracker.
#[derive(Clone)]
pub struct FloodGuard<K, C = SystemClock> {
    counter: RollingWindowCache<K, C>,
    max_messages: u32,
}

impl<K> FloodGuard<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new(config: &GuardConfig) -> Result<Self, CacheError> {
        Self::with_clock(config.max_messages, config.cache_config().window, SystemClock)
    }
}

impl<K, C> FloodGuard<K, C>
where
    K: Hash + Eq + Clone,
    C: Clock,
{
    pub fn with_clock(max_messages: u32, window: Duration, clock: C) -> Result<Self, CacheError> {
        Ok(Self {
            counter: RollingWindowCache::with_clock(window, clock)?,
            max_messages,
        })
    }

    /// Record a message from `key` and check if it is flooding.
    ///
    /// Returns `true` if the message should be blocked.
    pub fn check(&self, key: K) -> bool {
        self.counter.increment(key.clone());
        let recent = self.counter.get_count(&key);
        let flooding = recent > self.max_messages as usize;
        if flooding {
            debug!(
                "Flood detected: {} messages in {:?} (max {})",
                recent,
                self.counter.window(),
                self.max_messages
            );
        }
        flooding
    }

    /// Forget `key`'s recent messages, e.g. after a penalty was applied.
    pub fn reset(&self, key: &K) {
        self.counter.reset(key);
    }

    pub fn max_messages(&self) -> u32 {
        self.max_messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn guard(max: u32) -> (FloodGuard<u64, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let guard = FloodGuard::with_clock(max, Duration::from_secs(10), clock.clone()).unwrap();
        (guard, clock)
    }

    #[test]
    fn test_blocks_after_max_messages() {
        let (guard, _clock) = guard(5);
        for _ in 0..5 {
            assert!(!guard.check(1));
        }
        assert!(guard.check(1));
        assert!(!guard.check(2));
    }

    #[test]
    fn test_window_expiry_lets_participant_speak_again() {
        let (guard, clock) = guard(2);
        guard.check(1);
        guard.check(1);
        assert!(guard.check(1));

        clock.advance(Duration::from_secs(11));
        assert!(!guard.check(1));
    }

    #[test]
    fn test_reset_clears_history() {
        let (guard, _clock) = guard(1);
        guard.check(1);
        assert!(guard.check(1));

        guard.reset(&1);
        assert!(!guard.check(1));
    }

    #[test]
    fn test_new_uses_config() {
        let config = GuardConfig {
            max_messages: 7,
            ..Default::default()
        };
        let guard: FloodGuard<u64> = FloodGuard::new(&config).unwrap();
        assert_eq!(guard.max_messages(), 7);

        let config = GuardConfig {
            flood_window_secs: 0,
            ..Default::default()
        };
        assert!(FloodGuard::<u64>::new(&config).is_err());
    }
}
