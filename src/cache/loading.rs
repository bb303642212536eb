//! Loading Cache Module
//!
//! Public facade composing the entry store, expiration and eviction
//! policies, load coordinator and statistics recorder.

use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{
    CacheStatsSnapshot, Clock, EntryStore, ExpirationPolicy, LoadCoordinator, Lookup,
    MonotonicClock, Registration, SampledLru, StatsRecorder,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Shared State ==
#[derive(Debug)]
struct Inner<K, V> {
    config: CacheConfig,
    store: EntryStore<K, V>,
    loads: LoadCoordinator<K, V>,
    expiry: ExpirationPolicy,
    eviction: SampledLru,
    stats: StatsRecorder,
    clock: Arc<dyn Clock>,
}

// == Weak Handle ==
/// Non-owning handle used by background tasks.
#[derive(Debug)]
pub(crate) struct WeakCache<K, V> {
    inner: Weak<Inner<K, V>>,
}

impl<K, V> WeakCache<K, V> {
    pub(crate) fn upgrade(&self) -> Option<LoadingCache<K, V>> {
        self.inner.upgrade().map(|inner| LoadingCache { inner })
    }
}

// == Loading Cache ==
/// Concurrent, bounded, TTL-expiring, single-flight loading cache.
///
/// Cloning is cheap and yields another handle to the same cache. Each cache
/// built with [`LoadingCache::new`] is independent of every other.
///
/// # Loader contract
/// The loader passed to [`get_or_load`](Self::get_or_load) may be slow or
/// fail, but it must not call back into the same cache for the same key.
/// Such a call would wait on its own in-flight load and never finish; this
/// is not detected.
///
/// # Example
/// ```no_run
/// # async fn demo() -> loadcache::error::Result<()> {
/// use loadcache::{CacheConfig, LoadingCache};
///
/// let cache: LoadingCache<String, String> = LoadingCache::new(CacheConfig::default())?;
/// let value = cache
///     .get_or_load("hello".to_string(), |key| async move {
///         Ok::<_, std::io::Error>(key.to_uppercase())
///     })
///     .await?;
/// assert_eq!(value, "HELLO");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LoadingCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for LoadingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> LoadingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache from a validated configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Creates a cache that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let shards = config.effective_shard_count();
        let inner = Inner {
            store: EntryStore::new(shards),
            loads: LoadCoordinator::new(shards),
            expiry: ExpirationPolicy::new(config.time_to_live),
            eviction: SampledLru::new(config.capacity(), config.sample_size),
            stats: StatsRecorder::new(),
            clock,
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // == Get ==
    /// Returns the cached value if present and fresh. Never loads.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key);
        match found {
            Some(_) => self.inner.stats.record_hit(),
            None => self.inner.stats.record_miss(),
        }
        found
    }

    // == Get Or Load ==
    /// Returns the cached value, loading it with `loader` on a miss.
    ///
    /// Concurrent callers for the same missing key share one loader call.
    /// A follower waits up to the configured `wait_timeout` (forever if
    /// zero).
    pub async fn get_or_load<F, Fut, E>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        let timeout = match self.inner.config.wait_timeout {
            t if t.is_zero() => None,
            t => Some(t),
        };
        self.get_or_load_with_timeout(key, timeout, loader).await
    }

    /// Like [`get_or_load`](Self::get_or_load) with an explicit follower wait bound.
    ///
    /// The bound applies only while waiting on another caller's load. A
    /// follower that times out gets [`CacheError::Timeout`]; the load it was
    /// waiting on keeps running and still installs its result.
    pub async fn get_or_load_with_timeout<F, Fut, E>(
        &self,
        key: K,
        timeout: Option<Duration>,
        loader: F,
    ) -> Result<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        let inner = &self.inner;

        if let Some(value) = self.lookup(&key) {
            inner.stats.record_hit();
            return Ok(value);
        }
        inner.stats.record_miss();

        let ticket = loop {
            match inner.loads.register(&key, || self.lookup(&key)) {
                Registration::Ready(value) => return Ok(value),
                Registration::Leader(ticket) => break ticket,
                Registration::Follower(follower) => {
                    let outcome = match timeout {
                        Some(limit) => tokio::time::timeout(limit, follower.wait())
                            .await
                            .map_err(|_| CacheError::Timeout(limit))?,
                        None => follower.wait().await,
                    };
                    match outcome {
                        Some(result) => return result,
                        // Leader vanished without publishing; contend again
                        None => debug!("Re-registering after abandoned load"),
                    }
                }
            }
        };

        debug!("Loading value for missing key");
        let outcome = match loader(key.clone()).await {
            Ok(value) => {
                self.install(key, value.clone());
                inner.stats.record_load_success();
                Ok(value)
            }
            Err(err) => {
                inner.stats.record_load_failure();
                let err = CacheError::load(err);
                warn!(error = %err, "Loader failed, nothing cached");
                Err(err)
            }
        };

        ticket.complete(outcome.clone());
        outcome
    }

    // == Put ==
    /// Inserts a value directly, bypassing any loader.
    ///
    /// Overwrites an existing entry and restarts its TTL.
    pub fn put(&self, key: K, value: V) {
        self.install(key, value);
    }

    // == Invalidate ==
    /// Removes the entry for `key`. Absent keys are a no-op.
    ///
    /// A load already in flight for the key is not cancelled and will
    /// install its result when it completes.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.inner.store.remove(key).map(|entry| entry.value)
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.inner.store.clear();
        debug!(removed, "Invalidated all entries");
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries in one pass.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let inner = &self.inner;
        if !inner.expiry.is_enabled() {
            return 0;
        }

        let now = inner.clock.now_nanos();
        let removed = inner
            .store
            .retain(|entry| !inner.expiry.is_expired(entry, now));
        inner.stats.record_expirations(removed as u64);
        removed
    }

    /// Starts the periodic expiration sweep, if one is configured.
    ///
    /// Returns `None` when `sweep_interval` or `time_to_live` is zero. Must be
    /// called within a tokio runtime.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.inner.config.sweep_interval;
        if interval.is_zero() || !self.inner.expiry.is_enabled() {
            return None;
        }
        Some(crate::tasks::spawn_sweep_task(self, interval))
    }

    // == Introspection ==
    /// Returns true if a fresh entry exists. Does not count as a hit or miss.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.inner.clock.now_nanos();
        self.inner.store.contains(key, now, &self.inner.expiry)
    }

    /// Returns the current number of entries, including any not yet swept.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Number of loads currently running.
    pub fn loads_in_flight(&self) -> usize {
        self.inner.loads.in_flight()
    }

    /// Handle that does not keep the cache alive.
    pub(crate) fn downgrade(&self) -> WeakCache<K, V> {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Internals ==
    /// Store lookup with lazy expiration. Records expirations, not hits or misses.
    fn lookup(&self, key: &K) -> Option<V> {
        let inner = &self.inner;
        let now = inner.clock.now_nanos();
        match inner.store.lookup(key, now, &inner.expiry) {
            Lookup::Hit(value) => Some(value),
            Lookup::Expired => {
                inner.stats.record_expirations(1);
                debug!("Removed expired entry on lookup");
                None
            }
            Lookup::Absent => None,
        }
    }

    /// Inserts and then brings the store back within capacity.
    fn install(&self, key: K, value: V) {
        let inner = &self.inner;
        let now = inner.clock.now_nanos();
        inner.store.insert(key.clone(), value, now);
        inner.eviction.enforce(&inner.store, &inner.stats, Some(&key));
    }
}
