//! Shared types for the product catalog service.
//!
//! - identifiers for products and the foreign `Customer`/`Order` aggregates
//! - the locally owned [`Product`] model and the [`OrderProduct`] join row
//! - JSON envelopes for the domain events exchanged through the broker

pub mod events;
pub mod product;
pub mod types;

pub use events::{
    CustomerEvent, CustomerPayload, GenericEvent, OrderEvent, OrderPayload, ProductEvent,
    ProductEventType, routing_keys,
};
pub use product::{OrderProduct, Product, ProductDetails};
pub use types::{CustomerId, OrderId, ProductId};
