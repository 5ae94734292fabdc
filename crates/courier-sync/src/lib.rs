//! Courier Sync - client-side data synchronization core for the Courier
//! campaign dashboard.
//!
//! This crate keeps named, server-derived entities (campaigns, campaign
//! status, performance analytics) coherent across concurrent readers,
//! periodic polling, and user-triggered mutations. It owns the keyed cache,
//! the fetch dedupe policy, the mutation-to-invalidation cascade, the status
//! poller, and the analytics fallback merge. The HTTP transport and the
//! rendering layer are external collaborators behind the [`Fetcher`] and
//! [`Mutator`] contracts.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_sync::{campaigns, SyncClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = SyncClient::new();
//!
//!     // Read the campaign list; concurrent readers share one fetch.
//!     let list = client.query(campaigns::campaigns_key(), list_fetcher());
//!     let snapshot = list.read().await;
//!     println!("campaign list loaded: {:?}", snapshot.status);
//!
//!     // Pause a campaign; its list/detail/status keys go stale.
//!     let pause = client.mutation(pause_mutator(), campaigns::after_change(7));
//!     pause.execute(serde_json::json!({"id": 7})).await.unwrap();
//! }
//! ```

pub mod analytics;
pub mod campaigns;
pub mod config;
pub mod error;
pub mod mutation;
pub mod poll;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use analytics::{merge as merge_analytics, AnalyticsDefaults, AnalyticsView, PerformanceAnalytics};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use mutation::{InvalidationRule, InvalidationTarget, MutationCoordinator, StaticTargets};
pub use poll::{PollConfig, PollingWatcher};
pub use query::{
    fetcher_fn, mutator_fn, Fetcher, Mutator, QueryExecutor, QueryOptions, QuerySnapshot,
};
pub use store::{CacheEntry, CacheEvent, CacheStore, QueryKey, QueryStatus, Subscription};

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle status of a mutation invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    /// Not yet executed.
    Idle,
    /// Execution in progress.
    Running,
    /// Last execution succeeded.
    Success,
    /// Last execution failed.
    Error,
}

/// Session-scoped entry point for the sync core.
///
/// Owns the one shared [`CacheStore`] for the session and hands out read and
/// mutation handles bound to it. Constructed explicitly at session start and
/// passed to consumers; tests build a fresh client per test for isolation.
pub struct SyncClient {
    config: SyncConfig,
    store: Arc<CacheStore>,
    executor: Arc<QueryExecutor>,
    watcher: PollingWatcher,
    coordinator: Arc<MutationCoordinator>,
}

impl SyncClient {
    /// Create a client with default staleness and polling cadence.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Create a client with explicit cadence configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        let store = CacheStore::new();
        let executor = Arc::new(QueryExecutor::new(store.clone()));
        let watcher = PollingWatcher::new(executor.clone());
        let coordinator = Arc::new(MutationCoordinator::new(store.clone()));
        Self {
            config,
            store,
            executor,
            watcher,
            coordinator,
        }
    }

    /// The session's shared cache store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// The session's query executor.
    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    /// The session's polling watcher.
    pub fn watcher(&self) -> &PollingWatcher {
        &self.watcher
    }

    /// The session's cadence configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A read handle for a key, using the session's default freshness
    /// window.
    pub fn query(&self, key: QueryKey, fetcher: Arc<dyn Fetcher>) -> QueryHandle {
        self.query_with_options(
            key,
            fetcher,
            QueryOptions::default().with_stale_after(self.config.stale_after),
        )
    }

    /// A read handle with per-query options, e.g. a manual-trigger-only
    /// preview query.
    pub fn query_with_options(
        &self,
        key: QueryKey,
        fetcher: Arc<dyn Fetcher>,
        options: QueryOptions,
    ) -> QueryHandle {
        QueryHandle {
            executor: self.executor.clone(),
            key,
            fetcher,
            options,
        }
    }

    /// A mutation invoker bound to an invalidation rule.
    pub fn mutation(
        &self,
        mutator: Arc<dyn Mutator>,
        rule: impl InvalidationRule + 'static,
    ) -> MutationHandle {
        MutationHandle {
            coordinator: self.coordinator.clone(),
            mutator,
            rule: Box::new(rule),
            status: Mutex::new(MutationStatus::Idle),
        }
    }

    /// Start polling a key at the session's status cadence.
    ///
    /// Callers stop the key once they observe a terminal status.
    pub fn poll_status(&self, key: QueryKey, fetcher: Arc<dyn Fetcher>) {
        self.watcher.start(PollConfig {
            key,
            interval: self.config.status_poll_interval,
            fetcher,
        });
    }

    /// Start polling a key at an explicit cadence.
    pub fn poll_every(&self, key: QueryKey, interval: Duration, fetcher: Arc<dyn Fetcher>) {
        self.watcher.start(PollConfig {
            key,
            interval,
            fetcher,
        });
    }
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key read handle exposed to presentation collaborators: the current
/// `{data, status, error}` plus `refetch()`.
pub struct QueryHandle {
    executor: Arc<QueryExecutor>,
    key: QueryKey,
    fetcher: Arc<dyn Fetcher>,
    options: QueryOptions,
}

impl QueryHandle {
    /// The key this handle reads.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Read the key, fetching if absent or stale per the handle's options.
    pub async fn read(&self) -> QuerySnapshot {
        self.executor.run(&self.key, &self.fetcher, &self.options).await
    }

    /// Force a refetch regardless of staleness and await it.
    pub async fn refetch(&self) -> QuerySnapshot {
        self.executor.refetch(&self.key, &self.fetcher).await
    }

    /// Current snapshot without fetch side effects.
    pub fn snapshot(&self) -> QuerySnapshot {
        self.executor.snapshot(&self.key)
    }

    /// Subscribe to change notifications for this key. The entry is evicted
    /// once the last subscription for the key is dropped.
    pub fn subscribe(&self, listener: store::CacheListener) -> Subscription {
        self.executor.store().subscribe(self.key.clone(), listener)
    }
}

/// Mutation invoker exposed to presentation collaborators: `execute(input)`
/// plus a status.
pub struct MutationHandle {
    coordinator: Arc<MutationCoordinator>,
    mutator: Arc<dyn Mutator>,
    rule: Box<dyn InvalidationRule>,
    status: Mutex<MutationStatus>,
}

impl MutationHandle {
    /// Run the mutation. On success the handle's invalidation rule is
    /// applied once; the mutator's result is returned unchanged.
    pub async fn execute(&self, input: serde_json::Value) -> Result<serde_json::Value> {
        self.set_status(MutationStatus::Running);
        let outcome = self
            .coordinator
            .execute(&self.mutator, input, self.rule.as_ref())
            .await;
        self.set_status(match outcome {
            Ok(_) => MutationStatus::Success,
            Err(_) => MutationStatus::Error,
        });
        outcome
    }

    /// The status of the most recent execution.
    pub fn status(&self) -> MutationStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: MutationStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_client_query_roundtrip() {
        let client = SyncClient::new();
        let fetcher = fetcher_fn(|_key| async move { Ok(json!([{"id": 1, "name": "Promo"}])) });
        let handle = client.query(campaigns::campaigns_key(), fetcher);

        let snapshot = handle.read().await;
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.data, Some(json!([{"id": 1, "name": "Promo"}])));
    }

    #[tokio::test]
    async fn test_mutation_handle_tracks_status() {
        let client = SyncClient::new();
        let ok = client.mutation(
            mutator_fn(|input| async move { Ok(input) }),
            StaticTargets(vec![]),
        );
        assert_eq!(ok.status(), MutationStatus::Idle);
        ok.execute(json!({})).await.unwrap();
        assert_eq!(ok.status(), MutationStatus::Success);

        let failing = client.mutation(
            mutator_fn(|_| async move { Err(SyncError::mutation("rejected")) }),
            StaticTargets(vec![]),
        );
        let _ = failing.execute(json!({})).await;
        assert_eq!(failing.status(), MutationStatus::Error);
    }

    #[tokio::test]
    async fn test_mutation_marks_list_stale_for_next_read() {
        let client = SyncClient::new();
        let fetcher = fetcher_fn(|_key| async move { Ok(json!([])) });
        let handle = client.query(campaigns::campaigns_key(), fetcher);
        handle.read().await;

        let create = client.mutation(
            mutator_fn(|input| async move { Ok(input) }),
            campaigns::after_create(),
        );
        create.execute(json!({"name": "New"})).await.unwrap();

        let entry = client.store().get(&campaigns::campaigns_key()).unwrap();
        assert!(entry.fetched_at.is_none());
        assert_eq!(entry.status, QueryStatus::Idle);
    }
}
