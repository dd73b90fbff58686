//! End-to-end tests of the delivery loop over an in-process source.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use messaging::{
    AckDecision, ChannelDelivery, DeliveryOutcome, Dispatcher, EventHandler, FailurePolicy,
    HandlerError, RoutingTable, channel_source, consume,
};
use tokio::sync::mpsc;

/// Records which handler saw which payload, with an artificial delay to
/// expose any overlap between deliveries.
struct TracingHandler {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventHandler for TracingHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let payload = String::from_utf8_lossy(payload).to_string();
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:start:{payload}", self.name));
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:end:{payload}", self.name));
        Ok(())
    }
}

fn handler(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
    Arc::new(TracingHandler {
        name,
        log: Arc::clone(log),
    })
}

#[tokio::test]
async fn test_deliveries_are_handled_one_at_a_time_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut table = RoutingTable::new();
    table.register("customer.created", handler("customer", &log));
    table.register("#", handler("debug", &log));
    let dispatcher = Arc::new(Dispatcher::new(table));

    let (tx, stream) = channel_source(16);
    let consumer = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { consume(&dispatcher, stream).await })
    };

    let mut replies = Vec::new();
    for (key, body) in [
        ("customer.created", "1"),
        ("order.created", "2"),
        ("customer.created", "3"),
    ] {
        let (delivery, reply) = ChannelDelivery::new(key, body.as_bytes().to_vec());
        tx.send(delivery).await.unwrap();
        replies.push(reply);
    }
    drop(tx);

    assert_eq!(consumer.await.unwrap(), 3);
    for reply in replies {
        assert_eq!(reply.await.unwrap(), AckDecision::Ack);
    }

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "customer:start:1",
            "customer:end:1",
            "debug:start:2",
            "debug:end:2",
            "customer:start:3",
            "customer:end:3",
        ]
    );
}

#[tokio::test]
async fn test_observer_sees_failures_and_unmatched_keys() {
    let mut table = RoutingTable::new();
    table.register(
        "order.*",
        messaging::handler_fn(|payload| {
            serde_json::from_slice::<serde_json::Value>(payload)?;
            Ok(())
        }),
    );
    let (records_tx, mut records) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(table).with_observer(records_tx);

    let (tx, stream) = channel_source(4);
    let (bad, bad_reply) = ChannelDelivery::new("order.created", b"not json".to_vec());
    let (unmatched, unmatched_reply) = ChannelDelivery::new("customer.deleted", b"{}".to_vec());
    tx.send(bad).await.unwrap();
    tx.send(unmatched).await.unwrap();
    drop(tx);

    consume(&dispatcher, stream).await;

    assert_eq!(bad_reply.await.unwrap(), AckDecision::Ack);
    assert_eq!(unmatched_reply.await.unwrap(), AckDecision::Discard);

    let failed = records.recv().await.unwrap();
    assert!(matches!(
        failed.outcome,
        DeliveryOutcome::Failed { attempts: 1, ref error } if error.contains("deserialization")
    ));
    let unmatched = records.recv().await.unwrap();
    assert_eq!(unmatched.outcome, DeliveryOutcome::NoHandler);
}

#[tokio::test]
async fn test_requeued_message_is_dropped_on_redelivery() {
    let mut table = RoutingTable::new();
    table.register(
        "order.created",
        messaging::handler_fn(|_| Err(HandlerError::Other("storage down".to_string()))),
    );
    let dispatcher = Dispatcher::new(table).with_failure_policy(FailurePolicy::RequeueOnce);

    let (tx, stream) = channel_source(4);
    let (first, first_reply) = ChannelDelivery::new("order.created", b"{}".to_vec());
    let (again, again_reply) = ChannelDelivery::new("order.created", b"{}".to_vec());
    tx.send(first).await.unwrap();
    tx.send(again.redelivered()).await.unwrap();
    drop(tx);

    consume(&dispatcher, stream).await;

    assert_eq!(first_reply.await.unwrap(), AckDecision::Requeue);
    assert_eq!(again_reply.await.unwrap(), AckDecision::Ack);
}
