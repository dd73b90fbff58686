//! Catch-all event observer.

use async_trait::async_trait;
use common::GenericEvent;
use messaging::{EventHandler, HandlerError};

/// Logs every event it receives and never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatchAllObserver;

#[async_trait]
impl EventHandler for CatchAllObserver {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        match serde_json::from_slice::<GenericEvent>(payload) {
            Ok(event) => tracing::info!(event_type = %event.event_type, "observed event"),
            Err(e) => tracing::warn!(error = %e, "observed event with unreadable envelope"),
        }
        tracing::debug!(body = %String::from_utf8_lossy(payload), "raw event body");
        Ok(())
    }
}
