//! Loadcache - A concurrent in-memory loading cache
//!
//! Bounded, TTL-expiring cache with single-flight loads: concurrent misses
//! for the same key collapse into one call of the caller's loader.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStatsSnapshot, LoadingCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use tasks::spawn_sweep_task;
