//! Antispam guard.
//!
//! Blocks a participant who repeats their previous message while it is
//! still remembered.

use std::hash::Hash;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheError, ExpiringCache};
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;

/// Remembers each participant's last message.
#[derive(Clone)]
pub struct SpamGuard<K, C = SystemClock> {
    last_message: ExpiringCache<K, String, C>,
}

impl<K> SpamGuard<K>
where
    K: Hash + Eq,
{
    pub fn new(config: &GuardConfig) -> Result<Self, CacheError> {
        Self::with_clock(config.cache_config().ttl, SystemClock)
    }
}

impl<K, C> SpamGuard<K, C>
where
    K: Hash + Eq,
    C: Clock,
{
    pub fn with_clock(memory: Duration, clock: C) -> Result<Self, CacheError> {
        Ok(Self {
            last_message: ExpiringCache::with_clock(memory, clock)?,
        })
    }

    /// Record `text` as `key`'s latest message.
    ///
    /// Returns `true` if it repeats the previous one (ignoring surrounding
    /// whitespace and ASCII case) and should be blocked.
    pub fn check(&self, key: K, text: &str) -> bool {
        let normalized = text.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return false;
        }

        let repeated = self
            .last_message
            .put(key, normalized.clone())
            .is_some_and(|previous| previous == normalized);
        if repeated {
            debug!("Repeated message blocked");
        }
        repeated
    }

    /// Forget `key`'s last message.
    pub fn forget(&self, key: &K) {
        self.last_message.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn guard() -> (SpamGuard<&'static str, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let guard = SpamGuard::with_clock(Duration::from_secs(30), clock.clone()).unwrap();
        (guard, clock)
    }

    #[test]
    fn test_blocks_repeated_message() {
        let (guard, _clock) = guard();
        assert!(!guard.check("p", "hello"));
        assert!(guard.check("p", "  HELLO "));
        assert!(!guard.check("p", "something else"));
    }

    #[test]
    fn test_participants_are_independent() {
        let (guard, _clock) = guard();
        assert!(!guard.check("p", "hello"));
        assert!(!guard.check("q", "hello"));
    }

    #[test]
    fn test_memory_expires() {
        let (guard, clock) = guard();
        guard.check("p", "hello");

        clock.advance(Duration::from_secs(31));
        assert!(!guard.check("p", "hello"));
    }

    #[test]
    fn test_forget_and_blank_messages() {
        let (guard, _clock) = guard();
        guard.check("p", "hello");
        guard.forget(&"p");
        assert!(!guard.check("p", "hello"));

        assert!(!guard.check("q", "   "));
        assert!(!guard.check("q", "   "));
    }
}
