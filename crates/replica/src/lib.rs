//! Local replicas of foreign aggregates and stock reservation.
//!
//! The handlers in this crate keep minimal `Customer` and `Order` stubs in
//! sync with the events published by their owning services, and reserve
//! product stock when an order is created:
//! - [`CustomerEventHandler`] and [`OrderEventHandler`] for stub lifecycle events
//! - [`Reservation`] for the all-or-nothing stock decrement of one order
//! - [`CatchAllObserver`] for logging every event on the bus
//! - [`routing_table`] for wiring all of them into a [`messaging::RoutingTable`]

pub mod customer;
pub mod error;
pub mod observer;
pub mod order;
pub mod registry;
pub mod reservation;

pub use customer::CustomerEventHandler;
pub use error::{ReplicaError, Result};
pub use observer::CatchAllObserver;
pub use order::OrderEventHandler;
pub use registry::{ReplicaOptions, routing_table};
pub use reservation::{AbortReason, Reservation, ReservationState};

/// Which lifecycle event a stub handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubAction {
    /// Insert the stub; an existing id is an error.
    Created,
    /// Insert the stub or leave an existing one in place.
    Updated,
    /// Remove the stub; an absent id is not an error.
    Deleted,
}

impl StubAction {
    /// Returns the action name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StubAction::Created => "created",
            StubAction::Updated => "updated",
            StubAction::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for StubAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
