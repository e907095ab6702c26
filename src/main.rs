//! shardcache demo
//!
//! Runs a mixed writer/reader/deleter workload against a cache for a few
//! seconds, then flushes it and prints statistics as JSON.
//!
//! # Environment Variables
//! - `CACHE_*` - cache options, see `Config::from_env`
//! - `DEMO_DURATION_SECS` - how long the workload runs (default: 5)

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardcache::{Cache, CacheError, Config};

const READERS: usize = 10;
const KEY_SPACE: u64 = 20;

#[derive(Debug, Clone)]
struct Record {
    id: u64,
    label: String,
}

impl Record {
    fn new(id: u64) -> Self {
        Self {
            id,
            label: format!("record-{}", id),
        }
    }

    fn is_valid_for(&self, id: u64) -> bool {
        self.id == id && self.label == format!("record-{}", id)
    }
}

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache, starting its background sweep
/// 4. Run the workload until the deadline or Ctrl+C
/// 5. Flush the cache, stop the sweep and print statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting shardcache demo");

    let reclaimed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&reclaimed);
    let config = Config::from_env().with_on_evicted(move |_, _: Arc<Record>| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    info!("Configuration loaded: {:?}", config);

    let run_for = env::var("DEMO_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(5));

    let shutdown = CancellationToken::new();
    let cache = Cache::new(config, shutdown.clone()).context("failed to create cache")?;

    let stop = shutdown.child_token();
    let mut workers = Vec::with_capacity(READERS + 2);
    workers.push(tokio::spawn(writer(cache.clone(), stop.clone())));
    workers.push(tokio::spawn(deleter(cache.clone(), stop.clone())));
    for _ in 0..READERS {
        workers.push(tokio::spawn(reader(cache.clone(), stop.clone())));
    }

    tokio::select! {
        _ = tokio::time::sleep(run_for) => {
            info!("Workload finished after {:?}", run_for);
        }
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, stopping workload...");
        }
    }

    stop.cancel();
    for worker in workers {
        worker.await.context("worker task failed")??;
    }

    cache.flush();
    shutdown.cancel();
    warn!("Expiry sweep cancelled");

    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        "Reclaimed {} records through the eviction callback",
        reclaimed.load(Ordering::Relaxed)
    );

    Ok(())
}

async fn writer(cache: Cache<Arc<Record>>, stop: CancellationToken) -> anyhow::Result<()> {
    let mut next = 0u64;
    while !stop.is_cancelled() {
        cache.set(next.to_string(), Arc::new(Record::new(next)))?;
        next += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    info!("Writer stored {} records", next);
    Ok(())
}

async fn reader(cache: Cache<Arc<Record>>, stop: CancellationToken) -> anyhow::Result<()> {
    let mut round = 0u64;
    while !stop.is_cancelled() {
        let id = round % KEY_SPACE;
        match cache.get(&id.to_string()) {
            Ok(record) if !record.is_valid_for(id) => bail!("data corrupted for key {}", id),
            Ok(_) => {}
            Err(err) if err.is_not_found() || err.is_expired() => {}
            Err(other) => return Err(other.into()),
        }
        round += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    Ok(())
}

async fn deleter(cache: Cache<Arc<Record>>, stop: CancellationToken) -> anyhow::Result<()> {
    let mut next = 0u64;
    while !stop.is_cancelled() {
        let key = (next * 2).to_string();
        if cache.delete(&key)? {
            next += 1;
            if !matches!(cache.get(&key), Err(CacheError::NotFound(_))) {
                bail!("found key {} after it was deleted", key);
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    info!("Deleter removed {} records", next);
    Ok(())
}
