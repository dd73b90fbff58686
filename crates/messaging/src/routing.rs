//! Routing table mapping patterns to handlers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::handler::EventHandler;
use crate::pattern::Pattern;

/// Maps routing-key patterns to handlers.
///
/// Resolution is deterministic regardless of registration order:
/// 1. an exact entry for the key
/// 2. the matching `prefix*` entry with the longest prefix
/// 3. the `#` entry
///
/// Two distinct prefixes of the same length cannot both match one key, so
/// the longest match is unique. The table is filled once at startup and then
/// handed to a [`Dispatcher`](crate::Dispatcher), which only reads it.
#[derive(Default, Clone)]
pub struct RoutingTable {
    exact: HashMap<String, Arc<dyn EventHandler>>,
    prefixes: BTreeMap<String, Arc<dyn EventHandler>>,
    catch_all: Option<Arc<dyn EventHandler>>,
}

impl RoutingTable {
    /// Creates an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the handler for a pattern, replacing any previous one.
    pub fn register(&mut self, pattern: &str, handler: Arc<dyn EventHandler>) {
        let replaced = match Pattern::parse(pattern) {
            Pattern::Exact(key) => self.exact.insert(key, handler).is_some(),
            Pattern::Prefix(prefix) => self.prefixes.insert(prefix, handler).is_some(),
            Pattern::CatchAll => self.catch_all.replace(handler).is_some(),
        };
        if replaced {
            tracing::warn!(pattern, "replaced previously registered handler");
        }
    }

    /// Resolves the handler for a routing key.
    ///
    /// Returns None when nothing matches; that is not an error.
    pub fn resolve(&self, routing_key: &str) -> Option<Arc<dyn EventHandler>> {
        if let Some(handler) = self.exact.get(routing_key) {
            return Some(Arc::clone(handler));
        }

        self.prefixes
            .iter()
            .filter(|(prefix, _)| routing_key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| Arc::clone(handler))
            .or_else(|| self.catch_all.clone())
    }

    /// Returns the registered patterns in a stable order.
    pub fn patterns(&self) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .exact
            .keys()
            .cloned()
            .map(Pattern::Exact)
            .chain(self.prefixes.keys().cloned().map(Pattern::Prefix))
            .chain(self.catch_all.as_ref().map(|_| Pattern::CatchAll))
            .collect();
        patterns.sort();
        patterns
    }

    /// Returns the broker binding keys for every registered pattern.
    pub fn binding_keys(&self) -> Vec<String> {
        self.patterns().iter().map(Pattern::binding_key).collect()
    }

    /// Returns the number of registered patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len() + usize::from(self.catch_all.is_some())
    }

    /// Returns true if no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerError;
    use crate::handler::handler_fn;

    /// Handler that fails with its own name, so tests can tell which one ran.
    fn named(name: &'static str) -> Arc<dyn EventHandler> {
        handler_fn(move |_| Err(HandlerError::Other(name.to_string())))
    }

    async fn resolved_name(table: &RoutingTable, key: &str) -> Option<String> {
        let handler = table.resolve(key)?;
        match handler.handle(b"{}").await {
            Err(HandlerError::Other(name)) => Some(name),
            other => panic!("unexpected handler result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exact_match_beats_catch_all() {
        let mut table = RoutingTable::new();
        table.register("#", named("all"));
        table.register("order.created", named("created"));

        assert_eq!(
            resolved_name(&table, "order.created").await.as_deref(),
            Some("created")
        );
        assert_eq!(
            resolved_name(&table, "order.deleted").await.as_deref(),
            Some("all")
        );
    }

    #[tokio::test]
    async fn exact_match_beats_prefix() {
        let mut table = RoutingTable::new();
        table.register("order.*", named("orders"));
        table.register("order.created", named("created"));

        assert_eq!(
            resolved_name(&table, "order.created").await.as_deref(),
            Some("created")
        );
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let mut table = RoutingTable::new();
        table.register("order*", named("short"));
        table.register("order.item.*", named("long"));
        table.register("order.*", named("medium"));

        assert_eq!(
            resolved_name(&table, "order.item.added").await.as_deref(),
            Some("long")
        );
        assert_eq!(
            resolved_name(&table, "order.created").await.as_deref(),
            Some("medium")
        );
        assert_eq!(
            resolved_name(&table, "orders").await.as_deref(),
            Some("short")
        );
    }

    #[tokio::test]
    async fn prefix_beats_catch_all() {
        let mut table = RoutingTable::new();
        table.register("#", named("all"));
        table.register("customer.*", named("customers"));

        assert_eq!(
            resolved_name(&table, "customer.updated").await.as_deref(),
            Some("customers")
        );
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut table = RoutingTable::new();
        table.register("order.created", named("first"));
        table.register("order.created", named("second"));

        assert_eq!(table.len(), 1);
        assert_eq!(
            resolved_name(&table, "order.created").await.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn unmatched_key_resolves_to_none() {
        let mut table = RoutingTable::new();
        table.register("order.created", named("created"));
        assert!(table.resolve("customer.created").is_none());
        assert!(RoutingTable::new().resolve("anything").is_none());
    }

    #[test]
    fn binding_keys_cover_every_pattern() {
        let mut table = RoutingTable::new();
        table.register("#", named("all"));
        table.register("order.*", named("orders"));
        table.register("customer.created", named("created"));

        assert_eq!(
            table.binding_keys(),
            vec![
                "customer.created".to_string(),
                "order.#".to_string(),
                "#".to_string()
            ]
        );
    }
}
