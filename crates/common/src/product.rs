//! Catalog models owned by this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderId, ProductId};

/// Descriptive attributes of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

/// A product with its available stock.
///
/// `stock` is never negative: the reservation path only decrements it while
/// it is strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub stock: u32,
    pub details: ProductDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One reserved unit of a product for an order.
///
/// Rows are not unique per `(order_id, product_id)`: an order holding three
/// units of a product has three rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProduct {
    pub order_id: OrderId,
    pub product_id: ProductId,
}

impl OrderProduct {
    pub fn new(order_id: OrderId, product_id: ProductId) -> Self {
        Self {
            order_id,
            product_id,
        }
    }
}
