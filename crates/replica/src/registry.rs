//! Wiring of the replica handlers into a routing table.

use std::sync::Arc;
use std::time::Duration;

use catalog_store::CatalogStore;
use common::routing_keys;
use messaging::RoutingTable;

use crate::{CatchAllObserver, CustomerEventHandler, OrderEventHandler, StubAction};

/// Default bound on one stock reservation unit of work.
pub const DEFAULT_UNIT_OF_WORK_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for the replica handlers.
#[derive(Debug, Clone)]
pub struct ReplicaOptions {
    pub unit_of_work_timeout: Duration,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            unit_of_work_timeout: DEFAULT_UNIT_OF_WORK_TIMEOUT,
        }
    }
}

/// Builds the routing table of the product service.
///
/// Registers the customer and order lifecycle handlers under their exact
/// routing keys and the [`CatchAllObserver`] under `#`.
pub fn routing_table<S>(store: S, options: &ReplicaOptions) -> RoutingTable
where
    S: CatalogStore + Clone + 'static,
{
    let mut table = RoutingTable::new();

    for (key, action) in [
        (routing_keys::CUSTOMER_CREATED, StubAction::Created),
        (routing_keys::CUSTOMER_UPDATED, StubAction::Updated),
        (routing_keys::CUSTOMER_DELETED, StubAction::Deleted),
    ] {
        table.register(
            key,
            Arc::new(CustomerEventHandler::new(store.clone(), action)),
        );
    }

    for (key, action) in [
        (routing_keys::ORDER_CREATED, StubAction::Created),
        (routing_keys::ORDER_UPDATED, StubAction::Updated),
        (routing_keys::ORDER_DELETED, StubAction::Deleted),
    ] {
        table.register(
            key,
            Arc::new(OrderEventHandler::new(
                store.clone(),
                action,
                options.unit_of_work_timeout,
            )),
        );
    }

    table.register(routing_keys::ALL, Arc::new(CatchAllObserver));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_store::InMemoryCatalogStore;

    #[test]
    fn test_binds_every_lifecycle_key_and_catch_all() {
        let table = routing_table(InMemoryCatalogStore::new(), &ReplicaOptions::default());

        assert_eq!(table.len(), 7);
        let keys = table.binding_keys();
        assert!(keys.contains(&"order.created".to_string()));
        assert!(keys.contains(&"customer.deleted".to_string()));
        assert_eq!(keys.last().map(String::as_str), Some("#"));
    }
}
