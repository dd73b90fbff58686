//! Replica error types.

use catalog_store::StoreError;
use messaging::HandlerError;
use thiserror::Error;

/// Errors that can occur while applying a replica event.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The payload did not decode into the expected event.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The catalog store rejected the change.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for replica results.
pub type Result<T> = std::result::Result<T, ReplicaError>;

impl From<ReplicaError> for HandlerError {
    fn from(err: ReplicaError) -> Self {
        match err {
            ReplicaError::Deserialization(e) => HandlerError::Deserialization(e),
            ReplicaError::Store(e) => HandlerError::storage(e),
        }
    }
}
