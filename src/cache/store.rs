//! Entry Store Module
//!
//! Sharded concurrent key -> entry table. Each shard is a small indexed map
//! behind its own lock, so unrelated keys rarely contend and eviction can
//! pick entries at random in constant time.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rand::Rng;

use crate::cache::{Entry, ExpirationPolicy};

// == Lookup Result ==
/// Outcome of a store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// Live entry; carries a clone of the value
    Hit(V),
    /// Entry was stale and has been removed
    Expired,
    /// No entry for the key
    Absent,
}

// == Shard ==
/// Dense slot vector plus key -> slot index.
#[derive(Debug)]
struct Shard<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Entry<K, V>>,
}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
        }
    }

    fn get(&self, key: &K) -> Option<&Entry<K, V>> {
        self.index.get(key).map(|&pos| &self.slots[pos])
    }

    /// Inserts or overwrites. Returns the previous value if one existed.
    fn upsert(&mut self, key: K, value: V, now: i64) -> Option<V> {
        if let Some(&pos) = self.index.get(&key) {
            return Some(self.slots[pos].overwrite(value, now));
        }
        self.index.insert(key.clone(), self.slots.len());
        self.slots.push(Entry::new(key, value, now));
        None
    }

    /// Swap-removes the slot at `pos`, fixing up the index of the moved entry.
    fn remove_at(&mut self, pos: usize) -> Entry<K, V> {
        let entry = self.slots.swap_remove(pos);
        self.index.remove(&entry.key);
        if pos < self.slots.len() {
            if let Some(moved) = self.index.get_mut(&self.slots[pos].key) {
                *moved = pos;
            }
        }
        entry
    }

    fn remove_if<F>(&mut self, key: &K, pred: F) -> Option<Entry<K, V>>
    where
        F: FnOnce(&Entry<K, V>) -> bool,
    {
        let pos = *self.index.get(key)?;
        if pred(&self.slots[pos]) {
            Some(self.remove_at(pos))
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

// == Entry Store ==
/// Concurrent key -> entry table sharded by key hash.
///
/// All mutation of an entry happens under its shard's write lock; readers
/// take the read lock and copy out what they need, so no caller ever sees a
/// half-written entry.
#[derive(Debug)]
pub struct EntryStore<K, V> {
    shards: Box<[RwLock<Shard<K, V>>]>,
    hasher: RandomState,
    mask: usize,
    len: AtomicUsize,
}

impl<K, V> EntryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a store with `shard_count` shards (rounded up to a power of two).
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| RwLock::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            mask: count - 1,
            len: AtomicUsize::new(0),
        }
    }

    fn shard_for(&self, key: &K) -> &RwLock<Shard<K, V>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash & self.mask]
    }

    // == Lookup ==
    /// Looks up a key, applying lazy expiration.
    ///
    /// A hit refreshes the entry's recency. A stale entry is removed (after a
    /// re-check under the write lock, since a writer may have replaced it)
    /// and reported as [`Lookup::Expired`].
    pub fn lookup(&self, key: &K, now: i64, policy: &ExpirationPolicy) -> Lookup<V> {
        let shard = self.shard_for(key);
        {
            let guard = shard.read();
            match guard.get(key) {
                None => return Lookup::Absent,
                Some(entry) if !policy.is_expired(entry, now) => {
                    entry.touch(now);
                    return Lookup::Hit(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut guard = shard.write();
        match guard.get(key) {
            None => Lookup::Absent,
            Some(entry) if !policy.is_expired(entry, now) => {
                entry.touch(now);
                Lookup::Hit(entry.value.clone())
            }
            Some(_) => {
                if guard.remove_if(key, |_| true).is_some() {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                }
                Lookup::Expired
            }
        }
    }

    /// Reports whether a live entry exists without touching recency.
    pub fn contains(&self, key: &K, now: i64, policy: &ExpirationPolicy) -> bool {
        self.shard_for(key)
            .read()
            .get(key)
            .map(|entry| !policy.is_expired(entry, now))
            .unwrap_or(false)
    }

    // == Insert ==
    /// Inserts or overwrites the entry for `key`, refreshing its write time.
    ///
    /// Returns the replaced value, if any.
    pub fn insert(&self, key: K, value: V, now: i64) -> Option<V> {
        let previous = self.shard_for(&key).write().upsert(key, value, now);
        if previous.is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    // == Remove ==
    pub fn remove(&self, key: &K) -> Option<Entry<K, V>> {
        self.remove_if(key, |_| true)
    }

    /// Removes the entry only if `pred` holds for it, atomically per key.
    pub fn remove_if<F>(&self, key: &K, pred: F) -> Option<Entry<K, V>>
    where
        F: FnOnce(&Entry<K, V>) -> bool,
    {
        let removed = self.shard_for(key).write().remove_if(key, pred);
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    // == Iteration ==
    /// Visits every entry, one shard at a time under its read lock.
    ///
    /// No ordering guarantee. The visitor must not call back into the store.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Entry<K, V>),
    {
        for shard in self.shards.iter() {
            let guard = shard.read();
            guard.slots.iter().for_each(&mut visitor);
        }
    }

    /// Removes every entry for which `keep` returns false.
    ///
    /// Locks one shard at a time, so foreground calls on other shards are
    /// never blocked. Returns the number of entries removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Entry<K, V>) -> bool,
    {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            let mut pos = guard.len();
            while pos > 0 {
                pos -= 1;
                if !keep(&guard.slots[pos]) {
                    guard.remove_at(pos);
                    removed += 1;
                }
            }
        }
        self.len.fetch_sub(removed, Ordering::Relaxed);
        removed
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            removed += guard.len();
            guard.index.clear();
            guard.slots.clear();
        }
        self.len.fetch_sub(removed, Ordering::Relaxed);
        removed
    }

    // == Sampling ==
    /// Returns up to `count` `(key, last_access_nanos)` candidates for eviction.
    ///
    /// When the store holds no more than `count` entries every entry is
    /// returned. Otherwise candidates are drawn at random (with replacement):
    /// pick a random shard, walk forward to the first non-empty one, pick a
    /// random slot in it.
    pub fn sample_recency(&self, count: usize) -> Vec<(K, i64)> {
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return out;
        }

        if self.len() <= count {
            self.for_each(|entry| out.push((entry.key.clone(), entry.last_access_nanos())));
            return out;
        }

        let mut rng = rand::thread_rng();
        let shard_count = self.shards.len();
        for _ in 0..count {
            let start = rng.gen_range(0..shard_count);
            for offset in 0..shard_count {
                let guard = self.shards[(start + offset) & self.mask].read();
                if guard.len() == 0 {
                    continue;
                }
                let entry = &guard.slots[rng.gen_range(0..guard.len())];
                out.push((entry.key.clone(), entry.last_access_nanos()));
                break;
            }
        }
        out
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
