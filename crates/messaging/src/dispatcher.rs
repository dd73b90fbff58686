//! Dispatcher for delivering inbound messages to their handlers.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::sync::mpsc;

use crate::HandlerError;
use crate::handler::EventHandler;
use crate::routing::RoutingTable;

/// One inbound message as seen by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    pub routing_key: &'a str,
    pub payload: &'a [u8],
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
}

impl<'a> InboundMessage<'a> {
    /// Creates a first-time delivery.
    pub fn new(routing_key: &'a str, payload: &'a [u8]) -> Self {
        Self {
            routing_key,
            payload,
            redelivered: false,
        }
    }

    /// Marks the message as redelivered.
    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckDecision {
    /// Acknowledge after handling (successfully or not).
    Ack,
    /// Acknowledge without processing: no handler matched.
    Discard,
    /// Negative-acknowledge and put the message back on the queue.
    Requeue,
    /// Reject without requeue so the broker dead-letters the message.
    DeadLetter,
}

impl AckDecision {
    /// Returns true if the message leaves the queue for good.
    pub fn removes_message(&self) -> bool {
        !matches!(self, AckDecision::Requeue)
    }

    /// Returns the decision name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AckDecision::Ack => "ack",
            AckDecision::Discard => "discard",
            AckDecision::Requeue => "requeue",
            AckDecision::DeadLetter => "dead_letter",
        }
    }
}

impl std::fmt::Display for AckDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatcher did with a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler succeeded.
    Handled { attempts: u32 },
    /// No registered pattern matched the routing key.
    NoHandler,
    /// The handler failed on every attempt.
    Failed { attempts: u32, error: String },
}

impl DeliveryOutcome {
    /// Returns the outcome name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Handled { .. } => "handled",
            DeliveryOutcome::NoHandler => "no_handler",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

/// Observability record emitted for every delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub routing_key: String,
    pub outcome: DeliveryOutcome,
    pub decision: AckDecision,
}

/// What to do with a message whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and acknowledge the message anyway.
    #[default]
    DropAndLog,
    /// Retry in place with exponential backoff, then dead-letter.
    RetryThenDeadLetter {
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
    },
    /// Requeue on the first failure; drop if the redelivery fails too.
    RequeueOnce,
}

impl FailurePolicy {
    /// Retry policy with the default backoff bounds (100ms to 5s).
    pub fn retry(max_retries: usize) -> Self {
        FailurePolicy::RetryThenDeadLetter {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Routes inbound messages to handlers and decides how to settle them.
///
/// The dispatcher owns its routing table; nothing can register handlers once
/// consumption has started.
pub struct Dispatcher {
    table: RoutingTable,
    policy: FailurePolicy,
    observer: Option<mpsc::UnboundedSender<DeliveryRecord>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default failure policy.
    pub fn new(table: RoutingTable) -> Self {
        Self {
            table,
            policy: FailurePolicy::default(),
            observer: None,
        }
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sends a [`DeliveryRecord`] to `observer` for every delivery.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<DeliveryRecord>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the routing table.
    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    /// Delivers one message and returns how it should be settled.
    #[tracing::instrument(skip(self, message), fields(routing_key = %message.routing_key))]
    pub async fn deliver(&self, message: &InboundMessage<'_>) -> AckDecision {
        tracing::debug!("received message");

        let (outcome, decision) = match self.table.resolve(message.routing_key) {
            None => {
                tracing::info!("no handler registered for routing key, discarding");
                (DeliveryOutcome::NoHandler, AckDecision::Discard)
            }
            Some(handler) => self.invoke(handler.as_ref(), message).await,
        };

        metrics::counter!(
            "events_delivered_total",
            "outcome" => outcome.as_str(),
            "decision" => decision.as_str()
        )
        .increment(1);

        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is watching.
            let _ = observer.send(DeliveryRecord {
                routing_key: message.routing_key.to_string(),
                outcome,
                decision,
            });
        }

        decision
    }

    async fn invoke(
        &self,
        handler: &dyn EventHandler,
        message: &InboundMessage<'_>,
    ) -> (DeliveryOutcome, AckDecision) {
        let error = match handler.handle(message.payload).await {
            Ok(()) => return (DeliveryOutcome::Handled { attempts: 1 }, AckDecision::Ack),
            Err(e) => e,
        };

        metrics::counter!("event_handler_failures_total").increment(1);
        tracing::error!(error = %error, "error processing message");

        match self.policy {
            FailurePolicy::DropAndLog => (failed(1, &error), AckDecision::Ack),
            FailurePolicy::RequeueOnce => {
                if message.redelivered {
                    tracing::warn!("redelivered message failed again, dropping");
                    (failed(1, &error), AckDecision::Ack)
                } else {
                    (failed(1, &error), AckDecision::Requeue)
                }
            }
            FailurePolicy::RetryThenDeadLetter {
                max_retries,
                initial_backoff,
                max_backoff,
            } => {
                let backoff = ExponentialBuilder::default()
                    .with_min_delay(initial_backoff)
                    .with_max_delay(max_backoff)
                    .with_max_times(max_retries)
                    .build();

                let mut attempts = 1;
                let mut last_error = error;
                for delay in backoff {
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                    match handler.handle(message.payload).await {
                        Ok(()) => {
                            tracing::info!(attempts, "message handled after retry");
                            return (DeliveryOutcome::Handled { attempts }, AckDecision::Ack);
                        }
                        Err(e) => {
                            tracing::warn!(attempts, error = %e, "retry failed");
                            last_error = e;
                        }
                    }
                }

                tracing::error!(attempts, "retries exhausted, dead-lettering message");
                (failed(attempts, &last_error), AckDecision::DeadLetter)
            }
        }
    }
}

fn failed(attempts: u32, error: &HandlerError) -> DeliveryOutcome {
    DeliveryOutcome::Failed {
        attempts,
        error: error.to_string(),
    }
}
