//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with write and access metadata.

use std::sync::atomic::{AtomicI64, Ordering};

// == Cache Entry ==
/// A single cache entry with its value and timestamps.
///
/// Entries are owned by the store and never handed out; readers receive a
/// clone of the value. `last_access_nanos` is atomic so hits can refresh
/// recency while holding only a shared shard lock.
#[derive(Debug)]
pub struct Entry<K, V> {
    /// The key this entry is stored under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Clock reading when the value was written
    pub write_time_nanos: i64,
    /// Clock reading of the most recent access
    last_access_nanos: AtomicI64,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates an entry written (and last accessed) at `now`.
    pub fn new(key: K, value: V, now: i64) -> Self {
        Self {
            key,
            value,
            write_time_nanos: now,
            last_access_nanos: AtomicI64::new(now),
        }
    }

    // == Recency ==
    pub fn last_access_nanos(&self) -> i64 {
        self.last_access_nanos.load(Ordering::Relaxed)
    }

    /// Records an access. Never moves recency backwards.
    pub fn touch(&self, now: i64) {
        self.last_access_nanos.fetch_max(now, Ordering::Relaxed);
    }

    // == Overwrite ==
    /// Replaces the value and refreshes both timestamps.
    pub fn overwrite(&mut self, value: V, now: i64) -> V {
        self.write_time_nanos = now;
        *self.last_access_nanos.get_mut() = now;
        std::mem::replace(&mut self.value, value)
    }

    /// Nanoseconds since the last write.
    pub fn age_nanos(&self, now: i64) -> i64 {
        now.saturating_sub(self.write_time_nanos)
    }
}

impl<K: Clone, V: Clone> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            write_time_nanos: self.write_time_nanos,
            last_access_nanos: AtomicI64::new(self.last_access_nanos()),
        }
    }
}
