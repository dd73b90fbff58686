//! AMQP (RabbitMQ) connection, listener and publisher.
//!
//! Events travel over a durable topic exchange. Each process consumes through
//! its own exclusive, auto-delete queue bound to the binding keys of its
//! routing table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    message::Delivery as LapinDelivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tokio::task::JoinHandle;

use crate::{
    AckDecision, BrokerError, Delivery, Dispatcher, EventPublisher, InboundMessage, consume,
};

/// Default name of the events exchange.
pub const DEFAULT_EXCHANGE: &str = "events";

/// Upper bound on a single publish.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

const CONSUMER_TAG: &str = "product-service";

/// An open broker connection with a declared events exchange.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    exchange: String,
}

impl AmqpBroker {
    /// Connects to the broker and declares the durable topic exchange.
    pub async fn connect(url: &str, exchange: impl Into<String>) -> Result<Self, BrokerError> {
        let exchange = exchange.into();
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(exchange = %exchange, "connected to AMQP");

        Ok(Self {
            connection,
            channel,
            exchange,
        })
    }

    /// Starts consuming events for every pattern in the dispatcher's table.
    ///
    /// When `dead_letter_exchange` is set, rejected messages are routed there
    /// by the broker.
    pub async fn start_listening(
        &self,
        dispatcher: Arc<Dispatcher>,
        dead_letter_exchange: Option<&str>,
    ) -> Result<Listener, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    exclusive: true,
                    ..Default::default()
                },
                queue_arguments(dead_letter_exchange),
            )
            .await?;
        let queue_name = queue.name().as_str().to_string();

        for key in dispatcher.routing_table().binding_keys() {
            self.channel
                .queue_bind(
                    &queue_name,
                    &self.exchange,
                    &key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            tracing::info!(queue = %queue_name, binding_key = %key, "bound queue to exchange");
        }

        let consumer = self
            .channel
            .basic_consume(
                &queue_name,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let deliveries = consumer
            .take_while(|item| {
                if let Err(e) = item {
                    tracing::error!(error = %e, "consumer stream failed");
                }
                future::ready(item.is_ok())
            })
            .filter_map(|item| future::ready(item.ok().map(AmqpDelivery::from)));

        let task_queue = queue_name.clone();
        let task = tokio::spawn(async move {
            let processed = consume(&dispatcher, Box::pin(deliveries)).await;
            tracing::warn!(queue = %task_queue, processed, "consumer task finished");
        });

        tracing::info!(queue = %queue_name, "listening for events");
        Ok(Listener { queue_name, task })
    }

    /// Creates a publisher on its own channel.
    pub async fn publisher(&self) -> Result<AmqpPublisher, BrokerError> {
        let channel = self.connection.create_channel().await?;
        Ok(AmqpPublisher::new(channel, self.exchange.clone()))
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(200, "shutting down").await?;
        Ok(())
    }
}

fn queue_arguments(dead_letter_exchange: Option<&str>) -> FieldTable {
    let mut arguments = FieldTable::default();
    if let Some(dlx) = dead_letter_exchange {
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dlx.into()),
        );
    }
    arguments
}

/// Handle to a running consumer task.
pub struct Listener {
    queue_name: String,
    task: JoinHandle<()>,
}

impl Listener {
    /// Returns the server-assigned queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Stops the consumer task.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// A delivery received from the AMQP consumer.
pub struct AmqpDelivery {
    inner: LapinDelivery,
}

impl From<LapinDelivery> for AmqpDelivery {
    fn from(inner: LapinDelivery) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn message(&self) -> InboundMessage<'_> {
        InboundMessage::new(self.inner.routing_key.as_str(), &self.inner.data)
            .redelivered(self.inner.redelivered)
    }

    async fn settle(self, decision: AckDecision) -> Result<(), BrokerError> {
        match decision {
            AckDecision::Ack | AckDecision::Discard => {
                self.inner.ack(BasicAckOptions::default()).await?;
            }
            AckDecision::Requeue => {
                self.inner
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await?;
            }
            AckDecision::DeadLetter => {
                self.inner
                    .reject(BasicRejectOptions { requeue: false })
                    .await?;
            }
        }
        Ok(())
    }
}

/// Publishes events to the exchange with a bounded wait.
#[derive(Clone)]
pub struct AmqpPublisher {
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    /// Creates a publisher over an open channel.
    pub fn new(channel: Channel, exchange: impl Into<String>) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    #[tracing::instrument(skip(self, body), fields(exchange = %self.exchange))]
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        let properties = BasicProperties::default().with_content_type("application/json".into());

        let publish = async {
            self.channel
                .basic_publish(
                    &self.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &body,
                    properties,
                )
                .await?
                .await?;
            Ok::<_, BrokerError>(())
        };

        tokio::time::timeout(PUBLISH_TIMEOUT, publish)
            .await
            .map_err(|_| BrokerError::Timeout(PUBLISH_TIMEOUT))??;

        metrics::counter!("product_events_published_total").increment(1);
        tracing::debug!("published event");
        Ok(())
    }
}
