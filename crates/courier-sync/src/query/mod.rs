//! Fetch-and-cache driver.
//!
//! `QueryExecutor` decides, per read, whether the cached entry is good
//! enough or a fetch is needed, and guarantees at most one outstanding fetch
//! per key: concurrent requesters attach to the in-flight fetch instead of
//! issuing their own. Fetches run as independent tasks, so they complete and
//! update the cache even if every awaiter has gone away.

mod traits;

pub use traits::{fetcher_fn, mutator_fn, Fetcher, FetcherFn, Mutator, MutatorFn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::store::{CacheEntry, CacheStore, QueryKey, QueryStatus};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Per-query staleness and gating options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// How long fetched data stays fresh before a read triggers a refetch.
    pub stale_after: Duration,
    /// When false, all fetch attempts are suppressed regardless of
    /// staleness. Used for manual-trigger-only queries such as previews.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_after: SyncConfig::DEFAULT_STALE_AFTER,
            enabled: true,
        }
    }
}

impl QueryOptions {
    /// Options that never consider data stale by age.
    pub fn manual_only() -> Self {
        Self {
            stale_after: Duration::MAX,
            enabled: false,
        }
    }

    /// Override the freshness window.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Read-side view of a cache entry, handed to presentation collaborators.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    /// Lifecycle status of the underlying entry.
    pub status: QueryStatus,
    /// Last successfully fetched value, possibly stale.
    pub data: Option<Value>,
    /// Last fetch error message, if the most recent fetch failed.
    pub error: Option<String>,
}

impl QuerySnapshot {
    fn from_entry(entry: Option<CacheEntry>) -> Self {
        match entry {
            Some(entry) => Self {
                status: entry.status,
                data: entry.data,
                error: entry.error,
            },
            None => Self {
                status: QueryStatus::Idle,
                data: None,
                error: None,
            },
        }
    }

    /// Deserialize the snapshot data into a typed model.
    ///
    /// Returns `None` when no data is available or it does not match the
    /// expected shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Outcome published to everyone attached to an in-flight fetch.
type FetchOutcome = std::result::Result<Value, Arc<SyncError>>;
type InFlightMap = HashMap<QueryKey, watch::Receiver<Option<FetchOutcome>>>;

/// Drives fetch-and-cache for keys, deduplicating concurrent requests and
/// enforcing the staleness/enabled policy.
pub struct QueryExecutor {
    store: Arc<CacheStore>,
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl QueryExecutor {
    /// Create an executor over a shared store.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The store this executor reads and writes.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Read a key, fetching as needed.
    ///
    /// Fresh data returns immediately. Stale-but-available data returns
    /// immediately while a background refetch is started. A key with no data
    /// yet awaits the (possibly shared) fetch. With `enabled = false` no
    /// fetch is ever started and the current entry is returned as-is.
    pub async fn run(
        &self,
        key: &QueryKey,
        fetcher: &Arc<dyn Fetcher>,
        options: &QueryOptions,
    ) -> QuerySnapshot {
        let entry = self.store.get(key);
        let has_data = entry.as_ref().is_some_and(|e| e.data.is_some());
        let stale = entry
            .as_ref()
            .map_or(true, |e| e.is_stale(options.stale_after, Utc::now()));

        if !options.enabled {
            return QuerySnapshot::from_entry(entry);
        }

        if !stale {
            debug!(key = %key, "cache hit (fresh)");
            return QuerySnapshot::from_entry(entry);
        }

        if has_data {
            // Stale-while-revalidate: serve the stale value, refresh behind it.
            debug!(key = %key, "cache hit (stale), refetching in background");
            let _ = self.spawn_or_attach(key, fetcher);
            return QuerySnapshot::from_entry(entry);
        }

        let mut rx = self.spawn_or_attach(key, fetcher);
        Self::await_outcome(&mut rx).await;
        QuerySnapshot::from_entry(self.store.get(key))
    }

    /// Force a fetch regardless of staleness and await its completion.
    ///
    /// Still deduplicates: if a fetch is already in flight for the key, this
    /// attaches to it rather than starting another.
    pub async fn refetch(&self, key: &QueryKey, fetcher: &Arc<dyn Fetcher>) -> QuerySnapshot {
        let mut rx = self.spawn_or_attach(key, fetcher);
        Self::await_outcome(&mut rx).await;
        QuerySnapshot::from_entry(self.store.get(key))
    }

    /// Current snapshot without any fetch side effects.
    pub fn snapshot(&self, key: &QueryKey) -> QuerySnapshot {
        QuerySnapshot::from_entry(self.store.get(key))
    }

    /// Whether a fetch is currently outstanding for the key.
    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.lock_in_flight().contains_key(key)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlightMap> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a fetch task for the key, or attach to the one already running.
    fn spawn_or_attach(
        &self,
        key: &QueryKey,
        fetcher: &Arc<dyn Fetcher>,
    ) -> watch::Receiver<Option<FetchOutcome>> {
        let mut in_flight = self.lock_in_flight();
        if let Some(rx) = in_flight.get(key) {
            debug!(key = %key, "attached to in-flight fetch");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx.clone());
        drop(in_flight);

        self.store.mark_loading(key);

        let store = self.store.clone();
        let fetcher = fetcher.clone();
        let in_flight = self.in_flight.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = match fetcher.fetch(&key).await {
                Ok(value) => {
                    store.record_success(&key, value.clone());
                    Ok(value)
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "fetch failed");
                    store.record_error(&key, err.to_string());
                    Err(Arc::new(err))
                }
            };
            // Clear the in-flight slot before publishing, so an awaiter that
            // observes the outcome can immediately start a new fetch.
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    async fn await_outcome(rx: &mut watch::Receiver<Option<FetchOutcome>>) {
        // The sender only drops after publishing, so an error here still
        // means the fetch finished and the store holds the result.
        let _ = rx.wait_for(Option::is_some).await;
    }
}
