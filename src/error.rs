//! Error types for boardgame_sync

use std::fmt;
use thiserror::Error;

/// Which refresh operation an error or guard refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Full or new-items-only collection refresh
    Collection,
    /// Per-item detail refresh
    Details,
}

impl fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshKind::Collection => write!(f, "collection"),
            RefreshKind::Details => write!(f, "details"),
        }
    }
}

/// Unified error type for boardgame_sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// BGG kept answering "accepted, still processing" until the retry budget ran out
    #[error("BGG still processing after {attempts} attempts")]
    TransientUnavailable { attempts: u32 },
    /// BGG answered with a non-success status other than the processing signal
    #[error("BGG error status: {0}")]
    Upstream(reqwest::StatusCode),
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Response body did not have the expected XML structure
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Database operation failed
    #[error("Database error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Another refresh of the same kind is still running
    #[error("A {0} refresh is already running")]
    RefreshInProgress(RefreshKind),
    /// Configuration value rejected at start-up
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Whether the failed request is worth repeating within the retry budget
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<quick_xml::DeError> for SyncError {
    fn from(err: quick_xml::DeError) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

/// Result alias for boardgame_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_unavailable_mentions_attempts() {
        let err = SyncError::TransientUnavailable { attempts: 5 };
        assert_eq!(err.to_string(), "BGG still processing after 5 attempts");
    }

    #[test]
    fn refresh_in_progress_names_kind() {
        let err = SyncError::RefreshInProgress(RefreshKind::Details);
        assert_eq!(err.to_string(), "A details refresh is already running");
    }

    #[test]
    fn upstream_is_not_transient() {
        let err = SyncError::Upstream(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.is_transient());
    }
}
