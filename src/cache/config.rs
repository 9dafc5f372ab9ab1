//! Cache configuration.

use std::time::Duration;

use crate::scheduler::Domain;

/// Configuration for [`ExpiringCache`](super::ExpiringCache) and
/// [`RollingWindowCache`](super::RollingWindowCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for values written to an expiring cache.
    pub ttl: Duration,

    /// Trailing window a rolling window cache counts over.
    pub window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300), // 5 minutes
            window: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Set time-to-live for cache entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = duration;
        self
    }

    /// Set the counting window.
    #[must_use]
    pub fn window(mut self, duration: Duration) -> Self {
        self.window = duration;
        self
    }

    /// Create config for remembering a participant's last message.
    pub fn last_message() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Create config for chat flood counting.
    pub fn flood() -> Self {
        Self {
            window: Duration::from_secs(5),
            ..Default::default()
        }
    }
}

/// Configuration for a [`CooldownRegistry`](super::CooldownRegistry).
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    /// Cooldown applied by `add(key)`.
    pub default_duration: Duration,

    /// How often the sweeper looks for expired entries.
    pub sweep_period: Duration,

    /// Which scheduling domain runs the sweep.
    pub domain: Domain,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            default_duration: Duration::from_secs(10),
            sweep_period: Duration::from_secs(1),
            domain: Domain::Background,
        }
    }
}

impl CooldownConfig {
    /// Create a config with the given default cooldown.
    pub fn with_duration(default_duration: Duration) -> Self {
        Self {
            default_duration,
            ..Default::default()
        }
    }

    /// Set how often expired cooldowns are swept.
    #[must_use]
    pub fn sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    /// Set the scheduling domain of the sweep.
    #[must_use]
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }
}
