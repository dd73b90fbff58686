//! JSON envelopes for domain events carried on the `events` exchange.
//!
//! Every envelope has a `type` (equal to its routing key) and an RFC 3339
//! `timestamp`. Unknown fields are ignored so that richer payloads from the
//! owning services still decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, OrderId, Product, ProductId};

/// Routing keys of the events this service produces and consumes.
pub mod routing_keys {
    pub const CUSTOMER_CREATED: &str = "customer.created";
    pub const CUSTOMER_UPDATED: &str = "customer.updated";
    pub const CUSTOMER_DELETED: &str = "customer.deleted";

    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_UPDATED: &str = "order.updated";
    pub const ORDER_DELETED: &str = "order.deleted";

    pub const PRODUCT_CREATED: &str = "product.created";
    pub const PRODUCT_UPDATED: &str = "product.updated";
    pub const PRODUCT_DELETED: &str = "product.deleted";

    /// Matches every routing key.
    pub const ALL: &str = "#";
}

/// Minimal view of any event, used when only the type is of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Customer fields this service cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub id: CustomerId,
}

/// Event published by the customers service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub customer: CustomerPayload,
    pub timestamp: DateTime<Utc>,
}

/// Order fields this service cares about.
///
/// `product_ids` may repeat an id; each occurrence is one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_id: OrderId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
}

/// Event published by the orders service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub order: OrderPayload,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle events this service publishes for its products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductEventType {
    #[serde(rename = "product.created")]
    Created,
    #[serde(rename = "product.updated")]
    Updated,
    #[serde(rename = "product.deleted")]
    Deleted,
}

impl ProductEventType {
    /// Returns the routing key the event is published under.
    pub fn routing_key(&self) -> &'static str {
        match self {
            ProductEventType::Created => routing_keys::PRODUCT_CREATED,
            ProductEventType::Updated => routing_keys::PRODUCT_UPDATED,
            ProductEventType::Deleted => routing_keys::PRODUCT_DELETED,
        }
    }
}

impl std::fmt::Display for ProductEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.routing_key())
    }
}

/// Event published by this service when a product changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEvent {
    #[serde(rename = "type")]
    pub event_type: ProductEventType,
    pub product: Product,
    pub timestamp: DateTime<Utc>,
}

impl ProductEvent {
    /// Wraps a product snapshot, stamped with the current time.
    pub fn new(event_type: ProductEventType, product: Product) -> Self {
        Self {
            event_type,
            product,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProductDetails;

    #[test]
    fn decodes_order_event_with_repeated_products() {
        let body = r#"{
            "type": "order.created",
            "order": { "orderId": 12, "customerId": 3, "productIds": [1, 1, 2] },
            "timestamp": "2025-01-15T10:00:00Z"
        }"#;

        let event: OrderEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.event_type, "order.created");
        assert_eq!(event.order.order_id, OrderId::new(12));
        assert_eq!(event.order.customer_id, Some(CustomerId::new(3)));
        assert_eq!(
            event.order.product_ids,
            vec![ProductId::new(1), ProductId::new(1), ProductId::new(2)]
        );
    }

    #[test]
    fn order_event_without_products_decodes_to_empty_list() {
        let body = r#"{"type":"order.deleted","order":{"orderId":4},"timestamp":"2025-01-15T10:00:00Z"}"#;
        let event: OrderEvent = serde_json::from_str(body).unwrap();
        assert!(event.order.product_ids.is_empty());
        assert!(event.order.customer_id.is_none());
    }

    #[test]
    fn customer_event_ignores_unknown_fields() {
        let body = r#"{
            "type": "customer.created",
            "customer": { "id": 5, "name": "Ada", "email": "ada@example.com" },
            "timestamp": "2025-01-15T10:00:00Z"
        }"#;

        let event: CustomerEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.customer.id, CustomerId::new(5));
    }

    #[test]
    fn generic_event_only_requires_type() {
        let event: GenericEvent = serde_json::from_str(r#"{"type":"anything.happened"}"#).unwrap();
        assert_eq!(event.event_type, "anything.happened");
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn product_event_type_serializes_as_routing_key() {
        let product = Product {
            id: ProductId::new(1),
            name: "Espresso beans".to_string(),
            stock: 10,
            details: ProductDetails::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let event = ProductEvent::new(ProductEventType::Updated, product);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "product.updated");
        assert_eq!(json["product"]["id"], 1);
        assert_eq!(ProductEventType::Deleted.routing_key(), "product.deleted");
    }
}
