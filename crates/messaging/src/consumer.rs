//! Delivery loop shared by every message source.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::{AckDecision, BrokerError, Dispatcher, InboundMessage};

/// A message received from some source that must be settled exactly once.
#[async_trait]
pub trait Delivery: Send + Sized {
    /// Borrows the routing key and payload of this delivery.
    fn message(&self) -> InboundMessage<'_>;

    /// Settles the delivery with the source.
    async fn settle(self, decision: AckDecision) -> Result<(), BrokerError>;
}

/// Runs deliveries through the dispatcher until the stream ends.
///
/// Deliveries are handled one at a time: a message is settled before the next
/// one is pulled from the stream. Returns the number of deliveries processed.
pub async fn consume<S, D>(dispatcher: &Dispatcher, mut deliveries: S) -> u64
where
    S: Stream<Item = D> + Unpin,
    D: Delivery,
{
    let mut processed = 0;

    while let Some(delivery) = deliveries.next().await {
        let decision = {
            let message = delivery.message();
            dispatcher.deliver(&message).await
        };

        if let Err(e) = delivery.settle(decision).await {
            tracing::error!(error = %e, %decision, "failed to settle delivery");
        }
        processed += 1;
    }

    tracing::info!(processed, "delivery stream closed");
    processed
}

/// An in-process delivery whose settlement is reported over a oneshot channel.
#[derive(Debug)]
pub struct ChannelDelivery {
    routing_key: String,
    payload: Vec<u8>,
    redelivered: bool,
    reply: oneshot::Sender<AckDecision>,
}

impl ChannelDelivery {
    /// Creates a delivery and the receiver that will observe its settlement.
    pub fn new(
        routing_key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> (Self, oneshot::Receiver<AckDecision>) {
        let (reply, rx) = oneshot::channel();
        let delivery = Self {
            routing_key: routing_key.into(),
            payload: payload.into(),
            redelivered: false,
            reply,
        };
        (delivery, rx)
    }

    /// Marks the delivery as redelivered.
    pub fn redelivered(mut self) -> Self {
        self.redelivered = true;
        self
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    fn message(&self) -> InboundMessage<'_> {
        InboundMessage::new(&self.routing_key, &self.payload).redelivered(self.redelivered)
    }

    async fn settle(self, decision: AckDecision) -> Result<(), BrokerError> {
        self.reply
            .send(decision)
            .map_err(|_| BrokerError::Publish("settlement receiver dropped".to_string()))
    }
}

/// Creates a bounded in-process message source.
pub fn channel_source(
    buffer: usize,
) -> (mpsc::Sender<ChannelDelivery>, ReceiverStream<ChannelDelivery>) {
    let (tx, rx) = mpsc::channel(buffer);
    (tx, ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerError, RoutingTable, handler_fn};

    fn dispatcher() -> Dispatcher {
        let mut table = RoutingTable::new();
        table.register("customer.created", handler_fn(|_| Ok(())));
        table.register(
            "order.*",
            handler_fn(|_| Err(HandlerError::Other("broken".to_string()))),
        );
        Dispatcher::new(table)
    }

    #[tokio::test]
    async fn test_every_delivery_is_settled() {
        let dispatcher = dispatcher();
        let (tx, stream) = channel_source(8);

        let (handled, handled_rx) = ChannelDelivery::new("customer.created", b"{}".to_vec());
        let (failed, failed_rx) = ChannelDelivery::new("order.created", b"{}".to_vec());
        let (unmatched, unmatched_rx) = ChannelDelivery::new("product.deleted", b"{}".to_vec());
        tx.send(handled).await.unwrap();
        tx.send(failed).await.unwrap();
        tx.send(unmatched).await.unwrap();
        drop(tx);

        let processed = consume(&dispatcher, stream).await;

        assert_eq!(processed, 3);
        assert_eq!(handled_rx.await.unwrap(), AckDecision::Ack);
        assert_eq!(failed_rx.await.unwrap(), AckDecision::Ack);
        assert_eq!(unmatched_rx.await.unwrap(), AckDecision::Discard);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_the_loop() {
        let dispatcher = dispatcher();
        let (tx, stream) = channel_source(4);

        let (first, first_rx) = ChannelDelivery::new("customer.created", b"{}".to_vec());
        let (second, second_rx) = ChannelDelivery::new("customer.created", b"{}".to_vec());
        drop(first_rx);
        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
        drop(tx);

        assert_eq!(consume(&dispatcher, stream).await, 2);
        assert_eq!(second_rx.await.unwrap(), AckDecision::Ack);
    }

    #[test]
    fn test_redelivered_flag_reaches_message() {
        let (delivery, _rx) = ChannelDelivery::new("order.created", b"{}".to_vec());
        assert!(!delivery.message().redelivered);
        let delivery = delivery.redelivered();
        let message = delivery.message();
        assert!(message.redelivered);
        assert_eq!(message.routing_key, "order.created");
    }
}
