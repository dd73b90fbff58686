//! Order stub synchronization and stock reservation.

use std::time::Duration;

use async_trait::async_trait;
use catalog_store::CatalogStore;
use common::OrderEvent;
use messaging::{EventHandler, HandlerError};

use crate::{Reservation, Result, StubAction};

/// Keeps the local order stubs in sync and reserves stock for new orders.
///
/// On `Created` the stub is ensured first, outside the unit of work, and then
/// one [`Reservation`] runs for the event's product list. A failed
/// reservation is logged, never returned as an error. Redelivering the same
/// created event reserves again.
pub struct OrderEventHandler<S> {
    store: S,
    action: StubAction,
    unit_of_work_timeout: Duration,
}

impl<S: CatalogStore> OrderEventHandler<S> {
    pub fn new(store: S, action: StubAction, unit_of_work_timeout: Duration) -> Self {
        Self {
            store,
            action,
            unit_of_work_timeout,
        }
    }

    async fn apply(&self, payload: &[u8]) -> Result<()> {
        let event: OrderEvent = serde_json::from_slice(payload)?;
        let order = event.order;

        match self.action {
            StubAction::Created => {
                if !self.store.upsert_order(order.order_id).await? {
                    tracing::warn!(order_id = %order.order_id, "order stub already present");
                }
                let mut reservation = Reservation::new(order.order_id, order.product_ids);
                reservation
                    .execute(&self.store, self.unit_of_work_timeout)
                    .await;
            }
            StubAction::Updated => {
                self.store.upsert_order(order.order_id).await?;
                tracing::info!(order_id = %order.order_id, "order stub updated");
            }
            StubAction::Deleted => {
                let removed = self.store.delete_order(order.order_id).await?;
                if removed == 0 {
                    tracing::info!(order_id = %order.order_id, "order stub already absent");
                } else {
                    tracing::info!(order_id = %order.order_id, "order stub deleted");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: CatalogStore + 'static> EventHandler for OrderEventHandler<S> {
    #[tracing::instrument(skip(self, payload), fields(action = %self.action))]
    async fn handle(&self, payload: &[u8]) -> std::result::Result<(), HandlerError> {
        Ok(self.apply(payload).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store::{InMemoryCatalogStore, NewProduct, OrderId};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn event(event_type: &str, order_id: i64, product_ids: &[i64]) -> Vec<u8> {
        serde_json::json!({
            "type": event_type,
            "order": { "orderId": order_id, "customerId": 1, "productIds": product_ids },
            "timestamp": "2024-05-01T10:00:00Z",
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_created_ensures_stub_even_when_out_of_stock() {
        let store = InMemoryCatalogStore::new();
        let product = store.create_product(NewProduct::new("P", 0)).await.unwrap();
        let handler = OrderEventHandler::new(store.clone(), StubAction::Created, TIMEOUT);

        handler
            .handle(&event("order.created", 8, &[product.id.as_i64()]))
            .await
            .unwrap();

        assert!(store.order_exists(OrderId::new(8)).await.unwrap());
        assert!(store.order_products(OrderId::new(8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_removes_stub_and_rows() {
        let store = InMemoryCatalogStore::new();
        let product = store.create_product(NewProduct::new("P", 2)).await.unwrap();
        let created = OrderEventHandler::new(store.clone(), StubAction::Created, TIMEOUT);
        let deleted = OrderEventHandler::new(store.clone(), StubAction::Deleted, TIMEOUT);

        created
            .handle(&event("order.created", 2, &[product.id.as_i64()]))
            .await
            .unwrap();
        deleted
            .handle(&event("order.deleted", 2, &[]))
            .await
            .unwrap();
        deleted
            .handle(&event("order.deleted", 2, &[]))
            .await
            .unwrap();

        assert!(!store.order_exists(OrderId::new(2)).await.unwrap());
        assert_eq!(store.order_product_count().await, 0);
    }

    #[tokio::test]
    async fn test_updated_upserts_stub() {
        let store = InMemoryCatalogStore::new();
        let handler = OrderEventHandler::new(store.clone(), StubAction::Updated, TIMEOUT);

        handler
            .handle(&event("order.updated", 6, &[]))
            .await
            .unwrap();

        assert!(store.order_exists(OrderId::new(6)).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_order_is_rejected() {
        let handler = OrderEventHandler::new(InMemoryCatalogStore::new(), StubAction::Created, TIMEOUT);

        let err = handler.handle(b"[]").await.unwrap_err();

        assert!(matches!(err, HandlerError::Deserialization(_)));
    }
}
