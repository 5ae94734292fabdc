//! Error types for the Courier sync core.
//!
//! The taxonomy follows the three failure surfaces of the sync layer:
//! fetch failures (recorded on the cache entry, never destructive), mutation
//! failures (surfaced to the initiating caller only), and invalidation
//! failures (reported out-of-band, never downgrading a mutation's success).

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A fetcher rejected. Recorded on the cache entry for the affected key;
    /// previously cached data is preserved.
    #[error("Fetch failed: {message}")]
    Fetch {
        message: String,
        /// HTTP-like status classification from the transport, if any.
        status: Option<u16>,
        /// Optional server-provided detail message.
        detail: Option<String>,
    },

    /// A mutator rejected. Never touches the cache.
    #[error("Mutation failed: {message}")]
    Mutation {
        message: String,
        /// Optional server-provided detail message.
        detail: Option<String>,
    },

    /// An invalidation rule could not be applied after a successful mutation.
    #[error("Invalidation failed: {message}")]
    Invalidation { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SyncError {
    /// Create a fetch error with no transport classification.
    pub fn fetch(message: impl Into<String>) -> Self {
        SyncError::Fetch {
            message: message.into(),
            status: None,
            detail: None,
        }
    }

    /// Create a fetch error carrying an HTTP-like status and server detail.
    pub fn fetch_with_status(
        message: impl Into<String>,
        status: u16,
        detail: Option<String>,
    ) -> Self {
        SyncError::Fetch {
            message: message.into(),
            status: Some(status),
            detail,
        }
    }

    /// Create a mutation error.
    pub fn mutation(message: impl Into<String>) -> Self {
        SyncError::Mutation {
            message: message.into(),
            detail: None,
        }
    }

    /// The server-provided detail message, if the transport supplied one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            SyncError::Fetch { detail, .. } | SyncError::Mutation { detail, .. } => {
                detail.as_deref()
            }
            _ => None,
        }
    }

    /// The HTTP-like status classification, if the transport supplied one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Fetch { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if this error should trigger a retry on the next read or poll.
    ///
    /// Client-side classification errors (4xx) will fail the same way again;
    /// everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch { status, .. } => {
                !matches!(status, Some(code) if (400..500).contains(code))
            }
            SyncError::Mutation { .. } => false,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::fetch("connection reset");
        assert_eq!(err.to_string(), "Fetch failed: connection reset");
    }

    #[test]
    fn test_detail_preserved() {
        let err = SyncError::fetch_with_status(
            "request rejected",
            404,
            Some("Campaign not found".into()),
        );
        assert_eq!(err.detail(), Some("Campaign not found"));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::fetch("timeout").is_retryable());
        assert!(SyncError::fetch_with_status("server error", 500, None).is_retryable());
        assert!(!SyncError::fetch_with_status("not found", 404, None).is_retryable());
        assert!(!SyncError::mutation("rejected").is_retryable());
    }
}
