//! TTL Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LoadingCache;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task sleeps for `interval` between runs and removes stale entries
/// one store shard at a time, so foreground calls only wait for the shard
/// being swept. It holds a weak handle and exits on its own once every
/// `LoadingCache` handle has been dropped; it can also be aborted through
/// the returned `JoinHandle`.
///
/// # Arguments
/// * `cache` - Cache to sweep
/// * `interval` - Time between sweeps
///
/// # Example
/// ```ignore
/// let cache = LoadingCache::new(CacheConfig::default())?;
/// let sweep_handle = spawn_sweep_task(&cache, Duration::from_secs(1));
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task<K, V>(cache: &LoadingCache<K, V>, interval: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let weak = cache.downgrade();

    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting TTL sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache dropped, stopping TTL sweep task");
                break;
            };
            let removed = cache.cleanup_expired();

            if removed > 0 {
                info!(removed, "TTL sweep removed expired entries");
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
