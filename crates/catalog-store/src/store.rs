use async_trait::async_trait;
use serde::Deserialize;

use crate::{CustomerId, OrderId, OrderProduct, Product, ProductDetails, ProductId, Result};

/// Fields supplied when creating or replacing a product.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub stock: u32,
    #[serde(default)]
    pub details: ProductDetails,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, stock: u32) -> Self {
        Self {
            name: name.into(),
            stock,
            details: ProductDetails::default(),
        }
    }

    pub fn with_details(mut self, details: ProductDetails) -> Self {
        self.details = details;
        self
    }
}

/// A unit of work over product stock and order-product rows.
///
/// Nothing done through a transaction is visible to other readers until
/// [`commit`](StockTransaction::commit). Dropping a transaction without
/// committing discards every change made through it.
#[async_trait]
pub trait StockTransaction: Send {
    /// Decrements the stock of a product by one if it is strictly positive.
    ///
    /// Returns `false` when the product has no stock left or does not exist;
    /// the row is left untouched in that case.
    async fn decrement_stock(&mut self, product_id: ProductId) -> Result<bool>;

    /// Inserts order-product rows as a single batch.
    async fn insert_order_products(&mut self, rows: &[OrderProduct]) -> Result<()>;

    /// Makes every change of this unit of work durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every change of this unit of work.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage for the product catalog and the local replicas.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Creates a product and returns it with its assigned id.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    /// Retrieves a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Replaces the fields of an existing product.
    ///
    /// Returns None if the product doesn't exist.
    async fn replace_product(&self, id: ProductId, product: NewProduct)
    -> Result<Option<Product>>;

    /// Deletes a product, returning the deleted row.
    ///
    /// Returns None if the product doesn't exist.
    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists the products reserved for an order, one entry per reserved unit.
    async fn products_for_order(&self, order_id: OrderId) -> Result<Vec<Product>>;

    /// Inserts a customer stub. Fails with `Duplicate` if it already exists.
    async fn insert_customer(&self, id: CustomerId) -> Result<()>;

    /// Inserts a customer stub or leaves an existing one in place.
    async fn upsert_customer(&self, id: CustomerId) -> Result<()>;

    /// Deletes a customer stub, returning the number of rows removed.
    async fn delete_customer(&self, id: CustomerId) -> Result<u64>;

    /// Checks whether a customer stub exists.
    async fn customer_exists(&self, id: CustomerId) -> Result<bool>;

    /// Inserts an order stub or leaves an existing one in place.
    ///
    /// Returns `true` if a new stub was created.
    async fn upsert_order(&self, id: OrderId) -> Result<bool>;

    /// Deletes an order stub and its order-product rows, returning the number
    /// of stubs removed.
    async fn delete_order(&self, id: OrderId) -> Result<u64>;

    /// Checks whether an order stub exists.
    async fn order_exists(&self, id: OrderId) -> Result<bool>;

    /// Lists the order-product rows of an order in insertion order.
    async fn order_products(&self, order_id: OrderId) -> Result<Vec<OrderProduct>>;

    /// Begins a unit of work for stock reservation.
    async fn begin(&self) -> Result<Box<dyn StockTransaction>>;
}
