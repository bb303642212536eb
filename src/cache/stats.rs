//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, loads, and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Recorder ==
/// Live, wait-free counters. Every counter only ever increases.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl StatsRecorder {
    // == Constructor ==
    /// Creates a new recorder with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_success(&self) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        if count > 0 {
            self.expirations.fetch_add(count, Ordering::Relaxed);
        }
    }

    // == Snapshot ==
    /// Copies the counters. Fields are read one at a time, so under load
    /// they may be slightly skewed relative to each other.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            load_success_count: self.load_successes.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expiration_count: self.expirations.load(Ordering::Relaxed),
        }
    }
}

// == Cache Stats Snapshot ==
/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups that found a live entry
    pub hit_count: u64,
    /// Lookups that found nothing (absent, expired, or waiting on a load)
    pub miss_count: u64,
    /// Loader invocations that produced a value
    pub load_success_count: u64,
    /// Loader invocations that failed
    pub load_failure_count: u64,
    /// Entries removed to honor the capacity bound
    pub eviction_count: u64,
    /// Entries removed because their TTL elapsed
    pub expiration_count: u64,
}

impl CacheStatsSnapshot {
    /// Total number of lookups (hits + misses).
    pub fn request_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Total number of loader invocations.
    pub fn load_count(&self) -> u64 {
        self.load_success_count + self.load_failure_count
    }

    // == Hit Rate ==
    /// Returns hits / requests, or 1.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            total => self.hit_count as f64 / total as f64,
        }
    }

    /// Returns misses / requests, or 0.0 if no requests have been made.
    pub fn miss_rate(&self) -> f64 {
        match self.request_count() {
            0 => 0.0,
            total => self.miss_count as f64 / total as f64,
        }
    }
}
