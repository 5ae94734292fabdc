//! Centralized configuration for the sync core.
//!
//! The staleness and polling cadences observed in the dashboard are treated
//! as configuration with sensible defaults, not load-bearing constants:
//! callers override them per session or per query.

use std::time::Duration;

/// Session-wide defaults for staleness and polling cadence.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a cached value stays fresh before a read triggers a
    /// background refetch.
    pub stale_after: Duration,
    /// Cadence for background refresh of long-lived list queries.
    pub background_refetch_interval: Duration,
    /// Cadence for polling server-side status transitions.
    pub status_poll_interval: Duration,
}

impl SyncConfig {
    /// Default freshness window (2 minutes).
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);
    /// Default background refetch cadence (5 minutes).
    pub const DEFAULT_BACKGROUND_REFETCH: Duration = Duration::from_secs(300);
    /// Default status poll cadence (5 seconds).
    pub const DEFAULT_STATUS_POLL: Duration = Duration::from_secs(5);
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_after: Self::DEFAULT_STALE_AFTER,
            background_refetch_interval: Self::DEFAULT_BACKGROUND_REFETCH,
            status_poll_interval: Self::DEFAULT_STATUS_POLL,
        }
    }
}
