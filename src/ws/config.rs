#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::env;
use std::str::FromStr;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(3);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Environment variable overriding [`ReconnectConfig::initial_backoff`], in milliseconds.
pub const BASE_DELAY_VAR: &str = "BOTFEED_BASE_DELAY_MS";
/// Environment variable overriding [`ReconnectConfig::max_backoff`], in milliseconds.
pub const MAX_DELAY_VAR: &str = "BOTFEED_MAX_DELAY_MS";
/// Environment variable overriding [`ReconnectConfig::max_attempts`].
pub const MAX_ATTEMPTS_VAR: &str = "BOTFEED_MAX_ATTEMPTS";

/// Configuration for the real-time channel.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval for sending protocol PING frames to keep the connection alive
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Maximum silence before the connection is considered dead
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Drop a key's cached value once its last subscription is released.
    ///
    /// Off by default: stale values stay readable after unsubscribe.
    #[builder(default)]
    pub evict_on_unsubscribe: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT_DURATION,
            reconnect: ReconnectConfig::default(),
            evict_on_unsubscribe: false,
        }
    }
}

impl Config {
    /// Default configuration with the reconnect policy taken from the environment.
    ///
    /// See [`ReconnectConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            reconnect: ReconnectConfig::from_env()?,
            ..Self::default()
        })
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Deserializes from the host's `{ "baseDelayMs", "maxDelayMs", "maxAttempts" }` shape;
/// missing fields keep their defaults.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Builder, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Number of automatic reconnection attempts before the connection is marked failed.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    /// Backoff duration before the first reconnection attempt
    #[builder(default = DEFAULT_INITIAL_BACKOFF_DURATION)]
    #[serde(rename = "baseDelayMs")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[builder(default = DEFAULT_MAX_BACKOFF_DURATION)]
    #[serde(rename = "maxDelayMs")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    #[builder(default = DEFAULT_BACKOFF_MULTIPLIER)]
    #[serde(rename = "multiplier")]
    pub backoff_multiplier: f64,
    /// Randomization factor applied to each delay, `0.0` for an exact sequence
    #[builder(default)]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Read [`BASE_DELAY_VAR`], [`MAX_DELAY_VAR`] and [`MAX_ATTEMPTS_VAR`], falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            max_attempts: env_var(MAX_ATTEMPTS_VAR)?.unwrap_or(defaults.max_attempts),
            initial_backoff: env_var(BASE_DELAY_VAR)?
                .map_or(defaults.initial_backoff, Duration::from_millis),
            max_backoff: env_var(MAX_DELAY_VAR)?
                .map_or(defaults.max_backoff, Duration::from_millis),
            ..defaults
        })
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_e| Error::validation(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(None),
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff.min(config.max_backoff))
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(config.jitter)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
