//! Customer stub synchronization.

use async_trait::async_trait;
use catalog_store::CatalogStore;
use common::CustomerEvent;
use messaging::{EventHandler, HandlerError};

use crate::{Result, StubAction};

/// Keeps the local customer stubs in sync with customer lifecycle events.
pub struct CustomerEventHandler<S> {
    store: S,
    action: StubAction,
}

impl<S: CatalogStore> CustomerEventHandler<S> {
    pub fn new(store: S, action: StubAction) -> Self {
        Self { store, action }
    }

    async fn apply(&self, payload: &[u8]) -> Result<()> {
        let event: CustomerEvent = serde_json::from_slice(payload)?;
        let id = event.customer.id;

        match self.action {
            StubAction::Created => {
                self.store.insert_customer(id).await?;
                tracing::info!(customer_id = %id, "customer stub created");
            }
            StubAction::Updated => {
                self.store.upsert_customer(id).await?;
                tracing::info!(customer_id = %id, "customer stub updated");
            }
            StubAction::Deleted => {
                let removed = self.store.delete_customer(id).await?;
                if removed == 0 {
                    tracing::info!(customer_id = %id, "customer stub already absent");
                } else {
                    tracing::info!(customer_id = %id, "customer stub deleted");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: CatalogStore + 'static> EventHandler for CustomerEventHandler<S> {
    #[tracing::instrument(skip(self, payload), fields(action = %self.action))]
    async fn handle(&self, payload: &[u8]) -> std::result::Result<(), HandlerError> {
        Ok(self.apply(payload).await?)
    }
}
