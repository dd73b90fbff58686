//! Inbound event routing for the product service.
//!
//! This crate provides the consuming side of the event bus:
//! - [`Pattern`] and [`binding_key`] for wildcard patterns and their broker bindings
//! - [`RoutingTable`] for resolving a routing key to its [`EventHandler`]
//! - [`Dispatcher`] for invoking handlers and deciding acknowledgment
//! - [`consume`] for the single-in-flight delivery loop
//! - AMQP connection, listener and publisher in [`amqp`]

pub mod amqp;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod pattern;
pub mod publisher;
pub mod routing;

pub use amqp::{AmqpBroker, AmqpDelivery, AmqpPublisher, Listener};
pub use consumer::{ChannelDelivery, Delivery, channel_source, consume};
pub use dispatcher::{
    AckDecision, DeliveryOutcome, DeliveryRecord, Dispatcher, FailurePolicy, InboundMessage,
};
pub use error::{BrokerError, HandlerError};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use pattern::{Pattern, binding_key};
pub use publisher::{EventPublisher, NoopPublisher, RecordingPublisher};
pub use routing::RoutingTable;
