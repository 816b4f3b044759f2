// ABOUTME: Typed errors for failures callers need to tell apart
// ABOUTME: Everything else travels as anyhow::Error with context attached

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or unusable settings. Raised before any run starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote admin API answered with a non-success HTTP status.
    #[error("remote API returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// The remote admin API answered 200 but reported GraphQL errors.
    #[error("remote API reported errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("an incremental sync run is already in progress")]
    AlreadyRunning,

    #[error("{operation} for {entity_name} {entity_id} timed out after {after:?}")]
    Timeout {
        entity_name: String,
        entity_id: String,
        operation: String,
        after: Duration,
    },
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }

    /// True for failures that a later retry may get past.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Remote { status, .. } => *status >= 500 || *status == 429,
            SyncError::Timeout { .. } => true,
            SyncError::Config(_) | SyncError::GraphQl(_) | SyncError::AlreadyRunning => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_failures() {
        let server = SyncError::Remote {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(server.is_transient());

        let rejected = SyncError::Remote {
            status: 400,
            message: "bad input".to_string(),
        };
        assert!(!rejected.is_transient());
        assert!(!SyncError::GraphQl(vec!["slug taken".to_string()]).is_transient());
    }

    #[test]
    fn graphql_errors_join_messages() {
        let err = SyncError::GraphQl(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "remote API reported errors: a; b");
    }
}
