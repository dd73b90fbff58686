//! Messaging error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error carried by handler failures that originate outside this crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by event handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload did not match the expected event shape.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A storage operation failed while applying the event.
    #[error("Storage error: {0}")]
    Storage(#[source] BoxError),

    /// Any other handler-specific failure.
    #[error("Handler error: {0}")]
    Other(String),
}

impl HandlerError {
    /// Wraps a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        HandlerError::Storage(Box::new(err))
    }
}

/// Errors raised while talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The AMQP client reported an error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// A publish did not complete in time.
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// An event could not be published.
    #[error("Publish error: {0}")]
    Publish(String),
}
