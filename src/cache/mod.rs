//! Cache module - time-bounded key tracking.
//!
//! ## Caches
//!
//! - `ExpiringCache` - key/value store with a TTL, evicted lazily on read
//! - `RollingWindowCache` - per-key event counter over a trailing window,
//!   pruned lazily on read
//! - `CooldownRegistry` - per-key cooldowns, swept in the background so
//!   expiry callbacks fire exactly once
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Remember each participant's last message for 30 seconds
//! let last_message = ExpiringCache::from_config(&CacheConfig::last_message())?;
//! last_message.put(user_id, text);
//!
//! // Count messages in the last 5 seconds
//! let flood = RollingWindowCache::from_config(&CacheConfig::flood())?;
//! flood.increment(user_id);
//! let recent = flood.get_count(&user_id);
//!
//! // Gate a command for 10 seconds
//! let cooldowns = CooldownRegistry::new(&schedulers, CooldownConfig::default())?;
//! cooldowns.add(user_id);
//! ```

mod config;
mod cooldown;
mod error;
mod expiring;
mod rolling;

pub use config::{CacheConfig, CooldownConfig};
pub use cooldown::{CooldownAction, CooldownRegistry};
pub use error::{CacheError, MAX_DURATION};
pub use expiring::ExpiringCache;
pub use rolling::RollingWindowCache;
