//! Event handler trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::HandlerError;

/// Processes the payload of one inbound event.
///
/// A handler has no identity beyond the pattern it is registered under in a
/// [`RoutingTable`](crate::RoutingTable). The payload is opaque bytes; each
/// handler decodes the shape it expects.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles a single event payload.
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        (self.f)(payload)
    }
}

/// Wraps a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}
