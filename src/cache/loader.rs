//! Load Coordinator Module
//!
//! Single-flight registry for in-flight loads. For any key at most one
//! caller (the leader) runs the loader; concurrent callers for the same key
//! (followers) subscribe to the leader's result instead of loading again.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::warn;

use crate::error::Result;

/// Slot a leader publishes into. `None` while the load is running.
type Published<V> = Option<Result<V>>;

// == Registration ==
/// Role assigned to a caller that missed the store.
#[derive(Debug)]
pub enum Registration<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// The caller must run the loader and complete the ticket
    Leader(LoadTicket<'a, K, V>),
    /// Another caller is loading; await its result
    Follower(Follower<V>),
    /// The value showed up in the store while registering
    Ready(V),
}

// == Load Coordinator ==
/// Sharded registry of in-flight loads.
#[derive(Debug)]
pub struct LoadCoordinator<K, V> {
    shards: Box<[Mutex<HashMap<K, watch::Receiver<Published<V>>>>]>,
    hasher: RandomState,
    mask: usize,
}

impl<K, V> LoadCoordinator<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(shard_count: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            mask: count - 1,
        }
    }

    fn shard_for(&self, key: &K) -> &Mutex<HashMap<K, watch::Receiver<Published<V>>>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash & self.mask]
    }

    // == Register ==
    /// Decides the caller's role for `key`.
    ///
    /// Under the registry shard lock: join an existing load if there is one,
    /// otherwise run `recheck` against the store (a load may have finished
    /// between the caller's miss and now), otherwise register a new load
    /// and make the caller its leader. Exactly one of any set of racing
    /// callers becomes leader.
    ///
    /// `recheck` runs with the registry shard locked. It may take store
    /// locks but must not touch this coordinator.
    pub fn register<F>(&self, key: &K, recheck: F) -> Registration<'_, K, V>
    where
        F: FnOnce() -> Option<V>,
    {
        let mut pending = self.shard_for(key).lock();

        if let Some(rx) = pending.get(key) {
            return Registration::Follower(Follower { rx: rx.clone() });
        }

        if let Some(value) = recheck() {
            return Registration::Ready(value);
        }

        let (tx, rx) = watch::channel(None);
        pending.insert(key.clone(), rx);

        Registration::Leader(LoadTicket {
            coordinator: self,
            key: key.clone(),
            tx,
            finished: false,
        })
    }

    fn unregister(&self, key: &K) {
        self.shard_for(key).lock().remove(key);
    }

    // == Introspection ==
    /// Returns true if a load for `key` is currently running.
    pub fn is_loading(&self, key: &K) -> bool {
        self.shard_for(key).lock().contains_key(key)
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}

// == Load Ticket ==
/// Leadership of one in-flight load.
///
/// Completing the ticket unregisters the load and publishes the outcome to
/// every follower. Dropping it without completing (the leader was cancelled
/// or its loader panicked) unregisters the load and closes the channel, so
/// followers stop waiting.
#[derive(Debug)]
pub struct LoadTicket<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    coordinator: &'a LoadCoordinator<K, V>,
    key: K,
    tx: watch::Sender<Published<V>>,
    finished: bool,
}

impl<'a, K, V> LoadTicket<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Publishes the outcome. The slot is unregistered first, so a caller
    /// arriving after this returns starts from the store, not from this load.
    pub fn complete(mut self, outcome: Result<V>) {
        self.finish();
        self.tx.send_replace(Some(outcome));
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.coordinator.unregister(&self.key);
        }
    }
}

impl<K, V> Drop for LoadTicket<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.finished {
            let followers = self.tx.receiver_count().saturating_sub(1);
            warn!(followers, "In-flight load abandoned by its leader");
            self.finish();
        }
    }
}

// == Follower ==
/// A caller waiting on someone else's load.
#[derive(Debug)]
pub struct Follower<V> {
    rx: watch::Receiver<Published<V>>,
}

impl<V: Clone> Follower<V> {
    /// Waits for the leader's outcome.
    ///
    /// Returns `None` if the leader went away without publishing. Dropping
    /// this future only stops this caller from waiting; the load continues.
    pub async fn wait(mut self) -> Option<Result<V>> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        }
    }
}
