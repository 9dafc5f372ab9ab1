//! ttlkit - time-bounded key tracking.
//!
//! Caches that forget on their own, for rate limiting chat and commands.
//!
//! ## Architecture
//!
//! - `clock` - Injectable time source
//! - `scheduler` - One-shot, delayed and repeating work on tokio
//! - `cache` - TTL cache, rolling window counter, cooldown registry
//! - `guards` - Antiflood, antispam and command cooldown checks
//! - `config` - Environment configuration
//! - `utils` - Utility functions

pub mod cache;
pub mod clock;
pub mod config;
pub mod guards;
pub mod scheduler;
pub mod utils;

pub use cache::{
    CacheConfig, CacheError, CooldownAction, CooldownConfig, CooldownRegistry, ExpiringCache,
    RollingWindowCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{Domain, Scheduler, SchedulerError, Schedulers, TaskError, TaskFuture, TaskHandle};
