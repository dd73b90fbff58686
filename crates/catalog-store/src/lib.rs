//! Storage for the product catalog and the local replicas of foreign aggregates.
//!
//! - [`CatalogStore`]: products, customer/order stubs and order-product rows
//! - [`StockTransaction`]: the unit of work used to reserve stock for an order
//! - [`PostgresCatalogStore`] and [`InMemoryCatalogStore`] implementations

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{CustomerId, OrderId, OrderProduct, Product, ProductDetails, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;
pub use store::{CatalogStore, NewProduct, StockTransaction};
