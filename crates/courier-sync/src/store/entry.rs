//! Cache entry and status bookkeeping.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

/// Lifecycle status of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No fetch has been attempted, or the entry was invalidated.
    Idle,
    /// First fetch is in flight and no data is available yet.
    Loading,
    /// Last fetch succeeded; `data` is current (or stale but available).
    Success,
    /// Last fetch failed; any previously fetched `data` is still available.
    Error,
}

/// A cached query result with staleness bookkeeping.
///
/// `data` is only ever replaced by a successful fetch. A failed fetch records
/// the error alongside the last-known data so readers can keep rendering it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Current lifecycle status.
    pub status: QueryStatus,
    /// Last successfully fetched value, retained across subsequent errors.
    pub data: Option<Value>,
    /// Last fetch error message, cleared on the next successful fetch.
    pub error: Option<String>,
    /// When the last successful fetch completed. `None` after invalidation.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub(crate) fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
        }
    }

    /// Whether the entry is eligible for refetch on the next access.
    ///
    /// An entry with no recorded fetch time (never fetched, or invalidated)
    /// is always stale.
    pub fn is_stale(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        match self.fetched_at {
            None => true,
            Some(fetched_at) => {
                let age = now.signed_duration_since(fetched_at);
                match chrono::Duration::from_std(stale_after) {
                    Ok(window) => age >= window,
                    // A window too large for chrono means the entry never
                    // goes stale by age.
                    Err(_) => false,
                }
            }
        }
    }
}
