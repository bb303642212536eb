//! Expiration Policy Module
//!
//! Expire-after-write staleness check shared by lazy lookups and the sweep task.

use std::time::Duration;

use crate::cache::clock::duration_to_nanos;
use crate::cache::Entry;

// == Expiration Policy ==
/// Decides whether an entry is stale given its write timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    /// TTL in nanoseconds, None = entries never expire
    ttl_nanos: Option<i64>,
}

impl ExpirationPolicy {
    /// Creates a policy from a TTL. A zero TTL disables expiration.
    pub fn new(ttl: Duration) -> Self {
        let ttl_nanos = if ttl.is_zero() {
            None
        } else {
            Some(duration_to_nanos(ttl))
        };
        Self { ttl_nanos }
    }

    /// A policy under which nothing expires.
    pub fn disabled() -> Self {
        Self { ttl_nanos: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl_nanos.is_some()
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once `now - write_time >= ttl`,
    /// so an entry read exactly at its TTL is already stale.
    pub fn is_expired<K, V>(&self, entry: &Entry<K, V>, now: i64) -> bool {
        self.is_expired_at(entry.write_time_nanos, now)
    }

    /// Same check on a raw write timestamp.
    pub fn is_expired_at(&self, write_time_nanos: i64, now: i64) -> bool {
        match self.ttl_nanos {
            Some(ttl) => now.saturating_sub(write_time_nanos) >= ttl,
            None => false,
        }
    }

    // == Time To Live ==
    /// Remaining lifetime of an entry, or None if expiration is disabled.
    ///
    /// Returns `Some(Duration::ZERO)` for entries that are already stale.
    pub fn remaining<K, V>(&self, entry: &Entry<K, V>, now: i64) -> Option<Duration> {
        self.ttl_nanos.map(|ttl| {
            let left = ttl.saturating_sub(entry.age_nanos(now));
            Duration::from_nanos(left.max(0) as u64)
        })
    }
}
