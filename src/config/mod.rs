//! Configuration module.
//!
//! Loads guard limits from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheConfig, CooldownConfig};
use crate::scheduler::Domain;
use crate::utils::parse_duration;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Limits for the chat guards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    /// Maximum messages allowed in the flood window
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,

    /// Flood window in seconds
    #[serde(default = "default_flood_window")]
    pub flood_window_secs: u64,

    /// How long a participant's last message is remembered, in seconds
    #[serde(default = "default_spam_memory")]
    pub spam_memory_secs: u64,

    /// Cooldown between commands, in seconds
    #[serde(default = "default_command_cooldown")]
    pub command_cooldown_secs: u64,

    /// How often expired cooldowns are swept, in milliseconds
    #[serde(default = "default_sweep_period")]
    pub sweep_period_ms: u64,

    /// Scheduling domain of the cooldown sweep
    #[serde(default)]
    pub sweep_domain: Domain,
}

fn default_max_messages() -> u32 {
    5
}

fn default_flood_window() -> u64 {
    5
}

fn default_spam_memory() -> u64 {
    30
}

fn default_command_cooldown() -> u64 {
    10
}

fn default_sweep_period() -> u64 {
    1000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            flood_window_secs: default_flood_window(),
            spam_memory_secs: default_spam_memory(),
            command_cooldown_secs: default_command_cooldown(),
            sweep_period_ms: default_sweep_period(),
            sweep_domain: Domain::default(),
        }
    }
}

impl GuardConfig {
    /// Cache settings for the flood counter and the last-message store.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .window(Duration::from_secs(self.flood_window_secs))
            .ttl(Duration::from_secs(self.spam_memory_secs))
    }

    /// Cooldown settings for command gating.
    pub fn cooldown_config(&self) -> CooldownConfig {
        CooldownConfig::with_duration(Duration::from_secs(self.command_cooldown_secs))
            .sweep_period(Duration::from_millis(self.sweep_period_ms))
            .domain(self.sweep_domain)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub guards: GuardConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset ones keep their defaults. Call
    /// `dotenvy::dotenv()` first if `.env` should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut guards = GuardConfig::default();

        if let Some(value) = lookup("FLOOD_MAX_MESSAGES") {
            guards.max_messages = value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "FLOOD_MAX_MESSAGES",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("FLOOD_WINDOW") {
            guards.flood_window_secs = whole_seconds("FLOOD_WINDOW", &value)?;
        }
        if let Some(value) = lookup("SPAM_MEMORY") {
            guards.spam_memory_secs = whole_seconds("SPAM_MEMORY", &value)?;
        }
        if let Some(value) = lookup("COMMAND_COOLDOWN") {
            guards.command_cooldown_secs = whole_seconds("COMMAND_COOLDOWN", &value)?;
        }
        if let Some(value) = lookup("COOLDOWN_SWEEP_PERIOD") {
            let period = duration("COOLDOWN_SWEEP_PERIOD", &value)?;
            guards.sweep_period_ms =
                u64::try_from(period.as_millis()).map_err(|_| ConfigError::Invalid {
                    key: "COOLDOWN_SWEEP_PERIOD",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("COOLDOWN_SWEEP_DOMAIN") {
            guards.sweep_domain = match value.trim().to_lowercase().as_str() {
                "foreground" => Domain::Foreground,
                "background" => Domain::Background,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "COOLDOWN_SWEEP_DOMAIN",
                        value,
                    });
                }
            };
        }

        Ok(Self { guards })
    }
}

fn duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn whole_seconds(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    let parsed = duration(key, value)?;
    if parsed.subsec_nanos() != 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(parsed.as_secs())
}
