//! Error types for the Planboard sync engine

use reqwest::StatusCode;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync engine error type
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Remote { status: StatusCode, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task already exists: {0}")]
    DuplicateId(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid sync endpoint: {0}")]
    InvalidEndpoint(String),
}

impl SyncError {
    /// Whether the failure came from the network layer.
    ///
    /// Transport failures are expected while offline and are retried by the
    /// next scheduled cycle.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Http(_) | SyncError::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let remote = SyncError::Remote {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream".to_string(),
        };
        assert!(remote.is_transport());
        assert!(remote.to_string().contains("502"));

        assert!(!SyncError::DuplicateId("t1".to_string()).is_transport());
        assert!(!SyncError::NotFound("t1".to_string()).is_transport());
    }
}
