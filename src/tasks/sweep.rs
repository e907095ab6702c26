//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache items.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::store::Inner;

/// Spawns a background task that sweeps expired items every `interval`.
///
/// The first sweep runs one interval after spawning. The task stops when
/// `shutdown` is cancelled or when the cache it sweeps has been dropped; once
/// cancellation is observed no further sweep is started. A panicking eviction
/// callback also stops the task, with an error logged.
///
/// # Arguments
/// * `runtime` - Runtime the task is spawned on
/// * `cache` - Weak reference to the cache state
/// * `interval` - Time between sweeps, must be non-zero
/// * `shutdown` - Cancellation signal that ends the task
pub(crate) fn spawn_sweep_task<V>(
    runtime: &Handle,
    cache: Weak<Inner<V>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    runtime.spawn(async move {
        info!("Starting expiry sweep task with interval of {:?}", interval);

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, stopping expiry sweep");
                break;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let removed = cache.delete_expired(Instant::now());
                cache.record_sweep();
                removed
            }));
            drop(cache);

            let Ok(removed) = outcome else {
                error!("Expiry sweep aborted: eviction callback panicked");
                break;
            };

            if removed > 0 {
                info!("Expiry sweep: removed {} expired items", removed);
            } else {
                debug!("Expiry sweep: no expired items found");
            }
        }

        info!("Expiry sweep task stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::cache::{Cache, Ttl};
    use crate::config::Config;

    fn sweeping_config(ttl: Duration, interval: Duration) -> Config<String> {
        Config::default()
            .with_default_ttl(Ttl::After(ttl))
            .with_sweep_interval(interval)
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evictions);
        let config = sweeping_config(Duration::from_millis(50), Duration::from_millis(100))
            .with_on_evicted(move |key, value| {
                assert_eq!(key, "expire_soon");
                assert_eq!(value, "value");
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let cache = Cache::new(config, CancellationToken::new()).unwrap();

        cache.set("expire_soon", "value".to_string()).unwrap();

        // Two sweep intervals after insertion
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(cache.keys().is_empty(), "Expired entry should have been swept");
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert!(cache.stats().sweeps >= 1);
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let config = sweeping_config(Duration::from_secs(3600), Duration::from_millis(50));
        let cache = Cache::new(config, CancellationToken::new()).unwrap();

        cache.set("long_lived", "value".to_string()).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get("long_lived").unwrap(), "value");
    }

    #[tokio::test]
    async fn test_sweep_task_stops_when_callback_panics() {
        let config = sweeping_config(Duration::from_millis(10), Duration::from_millis(30))
            .with_on_evicted(|_, _| panic!("eviction callback failure"));
        let cache = Cache::new(config, CancellationToken::new()).unwrap();

        cache.set("k", "v".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The item was removed before its callback ran
        assert!(cache.is_empty());
        assert!(!cache.is_sweeping(), "Task should stop after a callback panic");
        assert_eq!(cache.stats().sweeps, 0);
    }

    #[tokio::test]
    async fn test_sweep_task_stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let config = sweeping_config(Duration::from_millis(10), Duration::from_millis(50));
        let cache = Cache::new(config, shutdown.clone()).unwrap();
        assert!(cache.is_sweeping());

        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cache.is_sweeping(), "Task should be finished after cancel");

        // Nothing is swept once the task has stopped
        cache.set("k", "v".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.keys(), vec!["k".to_string()]);
        assert_eq!(cache.stats().sweeps, 0);
    }
}
