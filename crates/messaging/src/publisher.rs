//! Outbound event publishing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::BrokerError;

/// Publishes serialized events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one JSON body under the given routing key.
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError>;
}

/// Publisher used when the broker is disabled. Every publish succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, routing_key: &str, _body: Vec<u8>) -> Result<(), BrokerError> {
        tracing::debug!(routing_key, "broker disabled, event not published");
        Ok(())
    }
}

/// Publisher that keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail without recording.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns the published `(routing_key, body)` pairs in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }

    /// Returns the routing keys published so far.
    pub fn routing_keys(&self) -> Vec<String> {
        self.published().into_iter().map(|(key, _)| key).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish("simulated publish failure".to_string()));
        }
        self.published
            .lock()
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .push((routing_key.to_string(), body));
        Ok(())
    }
}
