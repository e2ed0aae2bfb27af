//! Error types.

use thiserror::Error;

use crate::resource::ObjectKey;

/// Errors surfaced by a reconcile pass.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation failed, either by returning `requeue_on_error` or a raw error.
    #[error("operation {operation} failed: {source:#}")]
    Step {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Name of the operation that ended the pass.
    pub fn operation(&self) -> &str {
        match self {
            Error::Step { operation, .. } => operation,
        }
    }

    /// The raw error returned by the operation.
    pub fn step_error(&self) -> &anyhow::Error {
        match self {
            Error::Step { source, .. } => source,
        }
    }
}

/// Result type for reconcile passes.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by a [`ResourceClient`](crate::client::ResourceClient).
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Resource does not exist (or no longer exists).
    #[error("not found: {0}")]
    NotFound(ObjectKey),

    /// Resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(ObjectKey),

    /// Concurrent update detected (optimistic concurrency control).
    #[error("conflict on {key}: expected version {expected}, got {actual}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// Internal error.
    #[error("internal: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display_includes_operation_and_cause() {
        let err = Error::Step {
            operation: "publish-status".to_string(),
            source: anyhow::anyhow!("connection refused").context("update failed"),
        };
        let msg = err.to_string();
        assert!(msg.contains("publish-status"));
        assert!(msg.contains("update failed"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.operation(), "publish-status");
    }

    #[test]
    fn test_client_error_classification() {
        let key = ObjectKey::new("default", "web");
        assert!(ClientError::NotFound(key.clone()).is_not_found());
        assert!(
            ClientError::Conflict {
                key,
                expected: 1,
                actual: 2
            }
            .is_conflict()
        );
        assert!(!ClientError::Internal("x".into()).is_conflict());
    }
}
