//! Cache contract violations.

use std::time::Duration;

use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Longest duration any cache accepts (100 years).
///
/// Keeps `now + duration` representable as an `Instant` on every platform.
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Misuse of a cache API.
///
/// Expired or absent keys are never errors; lookups return `None` for them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("{what} must be greater than zero and at most {max:?}, got {duration:?}", max = MAX_DURATION)]
    InvalidDuration {
        what: &'static str,
        duration: Duration,
    },

    #[error("`{0}` is not supported: it would require sweeping every entry")]
    Unsupported(&'static str),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Check that `duration` can be used as a TTL, window or cooldown.
pub(crate) fn validate_duration(what: &'static str, duration: Duration) -> Result<Duration, CacheError> {
    if duration.is_zero() || duration > MAX_DURATION {
        return Err(CacheError::InvalidDuration { what, duration });
    }
    Ok(duration)
}
