//! Keyed cache of query results.
//!
//! The store is the single shared table behind every query, mutation and
//! poll in a session. All operations are synchronous and atomic with respect
//! to each other; the async world only touches the store through these
//! operations, never mid-await. Invalidation is lazy: it marks entries stale
//! and notifies subscribers, and the next read decides whether to refetch.

mod entry;
mod key;

pub use entry::{CacheEntry, QueryStatus};
pub use key::QueryKey;

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;
use uuid::Uuid;

/// Notification emitted to subscribers when an entry changes.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// The key whose entry changed.
    pub key: QueryKey,
    /// The entry's status after the change.
    pub status: QueryStatus,
}

/// Subscriber callback. Invoked synchronously after every entry change.
pub type CacheListener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

struct StoreState {
    entries: HashMap<QueryKey, CacheEntry>,
    subscribers: HashMap<QueryKey, Vec<(Uuid, CacheListener)>>,
}

/// In-memory keyed table of query results with subscriber notification.
///
/// One instance is shared per application session and injected into the
/// executor, coordinator and poller; tests construct fresh instances.
pub struct CacheStore {
    state: Mutex<StoreState>,
    // Weak handle to the owning Arc, so subscription guards can unsubscribe
    // without keeping the store alive.
    self_ref: Weak<CacheStore>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                subscribers: HashMap::new(),
            }),
            self_ref: self_ref.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        // Listener callbacks run outside the lock, so the only way to poison
        // it is a panic inside the store itself. Propagate rather than limp.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a snapshot of the entry for a key, if one exists.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Number of live entries. Primarily for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record the start of a fetch.
    ///
    /// Creates the entry on first read of a key. Entries that already hold
    /// data keep reporting `Success` during a background refetch; only a
    /// first fetch shows `Loading`.
    pub fn mark_loading(&self, key: &QueryKey) {
        let listeners;
        {
            let mut state = self.lock();
            let status = {
                let entry = state
                    .entries
                    .entry(key.clone())
                    .or_insert_with(CacheEntry::new);
                if entry.data.is_none() {
                    entry.status = QueryStatus::Loading;
                }
                entry.status
            };
            listeners = snapshot_listeners(&state, key, status);
        }
        notify(listeners);
    }

    /// Record a successful fetch: replace data, clear the error, stamp the
    /// fetch time.
    pub fn record_success(&self, key: &QueryKey, data: Value) {
        let listeners;
        {
            let mut state = self.lock();
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(CacheEntry::new);
            entry.data = Some(data);
            entry.error = None;
            entry.status = QueryStatus::Success;
            entry.fetched_at = Some(Utc::now());
            listeners = snapshot_listeners(&state, key, QueryStatus::Success);
        }
        debug!(key = %key, "cache updated");
        notify(listeners);
    }

    /// Record a failed fetch. Previously cached data is preserved.
    pub fn record_error(&self, key: &QueryKey, message: impl Into<String>) {
        let message = message.into();
        let listeners;
        {
            let mut state = self.lock();
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(CacheEntry::new);
            entry.error = Some(message.clone());
            entry.status = QueryStatus::Error;
            listeners = snapshot_listeners(&state, key, QueryStatus::Error);
        }
        debug!(key = %key, error = %message, "fetch error recorded");
        notify(listeners);
    }

    /// Invalidate a single key.
    ///
    /// Clears the fetch timestamp so the next read refetches, resets status
    /// to `Idle`, keeps the data, and synchronously notifies subscribers so
    /// the UI can show a background-refresh indicator. Does not fetch.
    ///
    /// Returns `true` if an entry existed for the key.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let (existed, listeners) = {
            let mut state = self.lock();
            let existed = match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.fetched_at = None;
                    entry.status = QueryStatus::Idle;
                    true
                }
                None => false,
            };
            (existed, snapshot_listeners(&state, key, QueryStatus::Idle))
        };
        if existed {
            debug!(key = %key, "invalidated");
            notify(listeners);
        }
        existed
    }

    /// Invalidate every entry belonging to a resource name, regardless of
    /// parameters: invalidating `campaign` covers `campaign:1`, `campaign:2`
    /// and the bare `campaign` key.
    ///
    /// Returns the number of entries invalidated.
    pub fn invalidate_resource(&self, resource: &str) -> usize {
        let (count, notifications) = {
            let mut state = self.lock();
            let keys: Vec<QueryKey> = state
                .entries
                .keys()
                .filter(|k| k.matches_resource(resource))
                .cloned()
                .collect();
            for key in &keys {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.fetched_at = None;
                    entry.status = QueryStatus::Idle;
                }
            }
            let notifications: Vec<Vec<(CacheListener, CacheEvent)>> = keys
                .iter()
                .map(|key| snapshot_listeners(&state, key, QueryStatus::Idle))
                .collect();
            (keys.len(), notifications)
        };
        if count > 0 {
            debug!(resource, count, "resource invalidated");
        }
        for listeners in notifications {
            notify(listeners);
        }
        count
    }

    /// Subscribe to changes for a key.
    ///
    /// The listener fires synchronously after every status change for the
    /// key. Dropping the returned guard (or calling `unsubscribe`) removes
    /// the listener; when the last subscriber for a key is gone, the entry
    /// itself is evicted.
    pub fn subscribe(&self, key: QueryKey, listener: CacheListener) -> Subscription {
        let id = Uuid::new_v4();
        {
            let mut state = self.lock();
            state
                .subscribers
                .entry(key.clone())
                .or_default()
                .push((id, listener));
        }
        Subscription {
            store: self.self_ref.clone(),
            key,
            id,
        }
    }

    fn unsubscribe(&self, key: &QueryKey, id: Uuid) {
        let mut state = self.lock();
        let now_empty = match state.subscribers.get_mut(key) {
            Some(listeners) => {
                listeners.retain(|(listener_id, _)| *listener_id != id);
                listeners.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.subscribers.remove(key);
            // Reference-counted eviction: no subscriber left, drop the entry.
            if state.entries.remove(key).is_some() {
                debug!(key = %key, "entry evicted (no subscribers remain)");
            }
        }
    }

    /// Number of active subscribers for a key. Primarily for diagnostics.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.lock()
            .subscribers
            .get(key)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

/// Handle for an active subscription. Unsubscribes on drop.
pub struct Subscription {
    store: Weak<CacheStore>,
    key: QueryKey,
    id: Uuid,
}

impl Subscription {
    /// Explicitly remove the listener. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}

    /// The key this subscription observes.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.key, self.id);
        }
    }
}

fn snapshot_listeners(
    state: &StoreState,
    key: &QueryKey,
    status: QueryStatus,
) -> Vec<(CacheListener, CacheEvent)> {
    match state.subscribers.get(key) {
        Some(listeners) => {
            let event = CacheEvent {
                key: key.clone(),
                status,
            };
            listeners
                .iter()
                .map(|(_, listener)| (listener.clone(), event.clone()))
                .collect()
        }
        None => Vec::new(),
    }
}

// Listeners run after the state lock is released so a listener may re-enter
// the store (read a snapshot, schedule a refetch) without deadlocking.
fn notify(listeners: Vec<(CacheListener, CacheEvent)>) {
    for (listener, event) in listeners {
        listener(&event);
    }
}
