//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_MAX_ENTRIES: u64 = 10_000;
const DEFAULT_TTL_MS: u64 = 5_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SAMPLE_SIZE: u32 = 5;

/// Cache configuration parameters.
///
/// Zero values switch features off: `max_entries == 0` means unbounded,
/// a zero `time_to_live` disables expiration, a zero `sweep_interval` leaves
/// expiration lazy-only and a zero `wait_timeout` lets followers wait forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold (0 = unbounded)
    pub max_entries: u64,
    /// Expire-after-write duration (0 = disabled)
    pub time_to_live: Duration,
    /// Background sweep period (0 = lazy-only expiration)
    pub sweep_interval: Duration,
    /// Number of candidates sampled per eviction
    pub sample_size: u32,
    /// Default bound on how long a follower waits for an in-flight load (0 = no bound)
    pub wait_timeout: Duration,
    /// Number of store shards (0 = derived from available parallelism)
    pub shard_count: usize,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10000)
    /// - `CACHE_TTL_MS` - Time-to-live in milliseconds (default: 5000)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    /// - `CACHE_SAMPLE_SIZE` - Eviction sample size (default: 5)
    /// - `CACHE_WAIT_TIMEOUT_MS` - Follower wait bound in milliseconds (default: 0)
    /// - `CACHE_SHARDS` - Store shard count (default: 0, automatic)
    pub fn from_env() -> Self {
        Self {
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(DEFAULT_MAX_ENTRIES),
            time_to_live: Duration::from_millis(
                env_parse("CACHE_TTL_MS").unwrap_or(DEFAULT_TTL_MS),
            ),
            sweep_interval: Duration::from_millis(
                env_parse("CACHE_SWEEP_INTERVAL_MS").unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            ),
            sample_size: env_parse("CACHE_SAMPLE_SIZE").unwrap_or(DEFAULT_SAMPLE_SIZE),
            wait_timeout: Duration::from_millis(env_parse("CACHE_WAIT_TIMEOUT_MS").unwrap_or(0)),
            shard_count: env_parse("CACHE_SHARDS").unwrap_or(0),
        }
    }

    /// Like [`from_env`](Self::from_env), but rejects values that are present
    /// and malformed instead of silently using defaults.
    ///
    /// Durations are read as signed milliseconds so that a negative TTL is
    /// reported rather than mistaken for a parse failure.
    pub fn from_env_checked() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_entries: env_strict("CACHE_MAX_ENTRIES")?.unwrap_or(defaults.max_entries),
            time_to_live: env_millis("CACHE_TTL_MS")?.unwrap_or(defaults.time_to_live),
            sweep_interval: env_millis("CACHE_SWEEP_INTERVAL_MS")?
                .unwrap_or(defaults.sweep_interval),
            sample_size: env_strict("CACHE_SAMPLE_SIZE")?.unwrap_or(defaults.sample_size),
            wait_timeout: env_millis("CACHE_WAIT_TIMEOUT_MS")?.unwrap_or(defaults.wait_timeout),
            shard_count: env_strict("CACHE_SHARDS")?.unwrap_or(defaults.shard_count),
        };
        config.validate()?;
        Ok(config)
    }

    // == Builder Setters ==
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards;
        self
    }

    // == Validation ==
    /// Checks the configuration for values the cache cannot honor.
    pub fn validate(&self) -> Result<()> {
        if usize::try_from(self.max_entries).is_err() {
            return Err(CacheError::InvalidConfig(format!(
                "max_entries {} exceeds addressable size",
                self.max_entries
            )));
        }
        if self.max_entries > 0 && self.sample_size == 0 {
            return Err(CacheError::InvalidConfig(
                "sample_size must be greater than 0 for a bounded cache".to_string(),
            ));
        }
        if self.shard_count != 0 && !self.shard_count.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "shard_count {} must be a power of two",
                self.shard_count
            )));
        }
        Ok(())
    }

    // == Derived Values ==
    /// Capacity bound as `usize`, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self.max_entries {
            0 => None,
            n => usize::try_from(n).ok(),
        }
    }

    /// Shard count actually used by the store.
    pub fn effective_shard_count(&self) -> usize {
        if self.shard_count != 0 {
            return self.shard_count;
        }
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (parallelism * 4).next_power_of_two()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            time_to_live: Duration::from_millis(DEFAULT_TTL_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            sample_size: DEFAULT_SAMPLE_SIZE,
            wait_timeout: Duration::ZERO,
            shard_count: 0,
        }
    }
}

// == Env Helpers ==
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_strict<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            CacheError::InvalidConfig(format!("{} has invalid value '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    match env_strict::<i64>(name)? {
        Some(ms) if ms < 0 => Err(CacheError::InvalidConfig(format!(
            "{} must not be negative, got {}",
            name, ms
        ))),
        Some(ms) => Ok(Some(Duration::from_millis(ms as u64))),
        None => Ok(None),
    }
}
