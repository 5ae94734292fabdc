//! Interval-driven polling above the query executor.
//!
//! Used for state that changes server-side asynchronously, such as a
//! campaign's send status: every tick forces a refetch regardless of
//! staleness, a tick that finds a fetch already in flight is a no-op, and
//! stopping is immediate — a tick scheduled but not yet fired never fires.
//! An in-flight request is not aborted by a stop; it completes and updates
//! the cache.

use crate::query::{Fetcher, QueryExecutor};
use crate::store::QueryKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Configuration for polling one key.
#[derive(Clone)]
pub struct PollConfig {
    /// The key to poll.
    pub key: QueryKey,
    /// Tick cadence.
    pub interval: Duration,
    /// Fetcher invoked on each tick.
    pub fetcher: Arc<dyn Fetcher>,
}

struct ActivePoll {
    enabled_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Re-invokes a query at a fixed cadence while polling for the key is
/// enabled.
pub struct PollingWatcher {
    executor: Arc<QueryExecutor>,
    active: Mutex<HashMap<QueryKey, ActivePoll>>,
}

impl PollingWatcher {
    /// Create a watcher over a shared executor.
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self {
            executor,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, ActivePoll>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start polling a key. Restarting an already-polled key replaces the
    /// previous poll.
    pub fn start(&self, config: PollConfig) {
        let (enabled_tx, mut enabled_rx) = watch::channel(true);

        let executor = self.executor.clone();
        let key = config.key.clone();
        let fetcher = config.fetcher.clone();
        let interval = config.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A tick that falls due while a fetch is still running is
            // skipped, never queued.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick fires immediately; consume it so the
            // first real poll happens one interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = enabled_rx.changed() => {
                        if changed.is_err() || !*enabled_rx.borrow() {
                            debug!(key = %key, "poll loop stopped");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !*enabled_rx.borrow() {
                            break;
                        }
                        if executor.is_in_flight(&key) {
                            debug!(key = %key, "poll tick skipped, fetch in flight");
                            continue;
                        }
                        // A poll always attempts a refetch, not only when
                        // stale. The fetch itself runs as a detached task,
                        // so a stop during this await lets it complete.
                        let _ = executor.refetch(&key, &fetcher).await;
                    }
                }
            }
        });

        let previous = self.lock_active().insert(
            config.key.clone(),
            ActivePoll { enabled_tx, task },
        );
        if let Some(previous) = previous {
            let _ = previous.enabled_tx.send(false);
        }
        info!(key = %config.key, interval_ms = interval.as_millis() as u64, "polling started");
    }

    /// Stop polling a key.
    ///
    /// Immediate and total: no further tick fires for the key after this
    /// returns, including ticks already scheduled. An in-flight fetch is not
    /// aborted and will still update the cache on completion.
    pub fn stop(&self, key: &QueryKey) {
        if let Some(poll) = self.lock_active().remove(key) {
            let _ = poll.enabled_tx.send(false);
            info!(key = %key, "polling stopped");
        }
    }

    /// Whether the key is currently being polled.
    pub fn is_active(&self, key: &QueryKey) -> bool {
        let mut active = self.lock_active();
        // Drop finished loops lazily.
        if let Some(poll) = active.get(key) {
            if poll.task.is_finished() {
                active.remove(key);
                return false;
            }
            return true;
        }
        false
    }

    /// Stop every active poll. Called when the session ends.
    pub fn stop_all(&self) {
        let mut active = self.lock_active();
        for (key, poll) in active.drain() {
            let _ = poll.enabled_tx.send(false);
            debug!(key = %key, "polling stopped");
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::query::QueryOptions;
    use crate::store::CacheStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TickFetcher {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Fetcher for TickFetcher {
        async fn fetch(&self, _key: &QueryKey) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"tick": call}))
        }
    }

    fn tick_fetcher() -> (Arc<dyn Fetcher>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (Arc::new(TickFetcher { calls: calls.clone() }), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fetches_on_each_tick() {
        let executor = Arc::new(QueryExecutor::new(CacheStore::new()));
        let watcher = PollingWatcher::new(executor.clone());
        let key = QueryKey::item("campaign-status", 1);
        let (fetcher, calls) = tick_fetcher();

        watcher.start(PollConfig {
            key: key.clone(),
            interval: Duration::from_secs(5),
            fetcher,
        });

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Cache reflects the most recent poll.
        let snapshot = executor.snapshot(&key);
        assert_eq!(snapshot.data, Some(json!({"tick": 3})));

        watcher.stop(&key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_scheduled_tick() {
        let executor = Arc::new(QueryExecutor::new(CacheStore::new()));
        let watcher = PollingWatcher::new(executor);
        let key = QueryKey::item("campaign-status", 2);
        let (fetcher, calls) = tick_fetcher();

        watcher.start(PollConfig {
            key: key.clone(),
            interval: Duration::from_secs(5),
            fetcher,
        });

        // One tick fires, then stop mid-interval: the already-scheduled next
        // tick must not fire no matter how long we wait.
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        watcher.stop(&key);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_means_no_fetch() {
        let executor = Arc::new(QueryExecutor::new(CacheStore::new()));
        let watcher = PollingWatcher::new(executor);
        let key = QueryKey::item("campaign-status", 3);
        let (fetcher, calls) = tick_fetcher();

        watcher.start(PollConfig {
            key: key.clone(),
            interval: Duration::from_secs(5),
            fetcher,
        });

        watcher.stop(&key);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!watcher.is_active(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_ticks_do_not_stack() {
        struct SlowFetcher {
            calls: Arc<AtomicU32>,
        }

        #[async_trait]
        impl Fetcher for SlowFetcher {
            async fn fetch(&self, _key: &QueryKey) -> Result<Value> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                // Each fetch spans multiple poll intervals.
                tokio::time::sleep(Duration::from_secs(12)).await;
                Ok(json!({}))
            }
        }

        let executor = Arc::new(QueryExecutor::new(CacheStore::new()));
        let watcher = PollingWatcher::new(executor);
        let key = QueryKey::item("campaign-status", 4);
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher: Arc<dyn Fetcher> = Arc::new(SlowFetcher { calls: calls.clone() });

        watcher.start(PollConfig {
            key: key.clone(),
            interval: Duration::from_secs(5),
            fetcher,
        });

        // 30s with a 5s interval would be 6 ticks, but each 12s fetch
        // swallows the ticks that fall due while it runs.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let fired = calls.load(Ordering::SeqCst);
        assert!(
            fired <= 3,
            "ticks stacked behind a slow fetch: {} fetches in 30s",
            fired
        );

        watcher.stop(&key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_refetches_even_when_fresh() {
        let store = CacheStore::new();
        let executor = Arc::new(QueryExecutor::new(store.clone()));
        let key = QueryKey::item("campaign-status", 5);
        let (fetcher, calls) = tick_fetcher();

        // Seed a fresh entry; a plain read would not refetch it.
        executor.refetch(&key, &fetcher).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let fresh = executor
            .run(&key, &fetcher, &QueryOptions::default())
            .await;
        assert!(fresh.data.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let watcher = PollingWatcher::new(executor);
        watcher.start(PollConfig {
            key: key.clone(),
            interval: Duration::from_secs(5),
            fetcher,
        });

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2, "poll must ignore freshness");

        watcher.stop(&key);
    }
}
