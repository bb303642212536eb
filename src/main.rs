//! Loadcache demo
//!
//! Exercises a loading cache the way a caller would: seed a value, load
//! through a slow upstream, fan many concurrent callers into one key, let
//! entries expire and reload.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadcache::{CacheConfig, LoadingCache};

const FAN_IN_CALLERS: usize = 50;
const UPSTREAM_LATENCY: Duration = Duration::from_millis(100);

/// Stand-in for a slow data source.
async fn fetch_from_upstream(key: String, calls: Arc<AtomicUsize>) -> anyhow::Result<String> {
    calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(UPSTREAM_LATENCY).await;
    Ok(key.to_uppercase())
}

/// Main entry point for the loading cache demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache and start the TTL sweep
/// 4. Seed, load, fan in, expire and reload
/// 5. Log the final statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting loadcache demo");

    let config = CacheConfig::from_env_checked().context("invalid cache configuration")?;
    info!(
        "Configuration loaded: max_entries={}, ttl={:?}, sweep_interval={:?}, sample_size={}",
        config.max_entries, config.time_to_live, config.sweep_interval, config.sample_size
    );
    let ttl = config.time_to_live;

    let cache: LoadingCache<String, String> = LoadingCache::new(config)?;
    let sweep_handle = cache.spawn_sweeper();
    let calls = Arc::new(AtomicUsize::new(0));

    // Seeded entry is served without a load
    cache.put("initial".to_string(), "INITIAL-CACHED-VALUE".to_string());
    info!("Initial cache value: {:?}", cache.get(&"initial".to_string()));

    // First call loads, second is a hit
    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let value = cache
            .get_or_load("hello".to_string(), |k| fetch_from_upstream(k, calls))
            .await?;
        info!("hello -> {}", value);
    }

    // Many concurrent callers, one upstream call
    let before = calls.load(Ordering::SeqCst);
    let started = Instant::now();
    let handles: Vec<_> = (0..FAN_IN_CALLERS)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_load("x".to_string(), |k| fetch_from_upstream(k, calls))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }
    info!(
        "Fan-in: {} callers, {} upstream call(s), {:?} elapsed",
        FAN_IN_CALLERS,
        calls.load(Ordering::SeqCst) - before,
        started.elapsed()
    );

    // Let entries expire, then reload
    if ttl.is_zero() {
        warn!("TTL disabled, skipping expiration step");
    } else {
        tokio::time::sleep(ttl + Duration::from_millis(100)).await;
        let calls_before = calls.load(Ordering::SeqCst);
        let value = cache
            .get_or_load("hello".to_string(), |k| fetch_from_upstream(k, Arc::clone(&calls)))
            .await?;
        info!(
            "After expiration: hello -> {} ({} new upstream call)",
            value,
            calls.load(Ordering::SeqCst) - calls_before
        );
    }

    let stats = cache.stats();
    info!("Cache stats: {}", serde_json::to_string(&stats)?);
    info!("Hit rate: {:.2}", stats.hit_rate());

    if let Some(handle) = sweep_handle {
        handle.abort();
    }
    info!("Demo complete");
    Ok(())
}
