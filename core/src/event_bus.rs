//! Event bus abstraction for catalog change notifications.
//!
//! The catalog publishes change events; the ingestor consumes them. Delivery
//! is at-least-once and every [`Delivery`] must be settled explicitly with an
//! [`Acknowledgement`]:
//!
//! ```text
//!            ┌───────────┐
//!            │  Catalog  │
//!            └─────┬─────┘
//!                  │ publish
//!                  ▼
//!         ┌─────────────────┐
//!         │    Event Bus    │◄─── At-least-once delivery
//!         └────────┬────────┘
//!                  │ Delivery
//!                  ▼
//!         ┌─────────────────┐
//!         │    Ingestor     │
//!         └────────┬────────┘
//!        ┌─────────┼──────────┐
//!        ▼         ▼          ▼
//!       Ack       Nack       Park
//!    (commit) (redeliver) (dead-letter)
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: Events may be delivered multiple times
//! - **Idempotency**: Subscribers must handle duplicate events
//! - **Explicit settlement**: A delivery dropped without an acknowledgement
//!   counts as a `Nack`
//! - **Attempt counting**: Each redelivery carries an incremented attempt
//!   number so the subscriber can decide when to park
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (staysearch-testing) - for tests
//! - `RedpandaEventBus` (staysearch-redpanda) - for production (Kafka-compatible)
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = event_bus.subscribe(&["catalog.item-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => {
//!             let ack = process(&delivery.payload).await;
//!             delivery.acknowledge(ack);
//!         }
//!         Err(e) => tracing::error!(error = %e, "Event stream error"),
//!     }
//! }
//! ```

use crate::BoxFuture;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// How a subscriber settles a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processed; do not deliver again
    Ack,
    /// Failed; deliver again with `attempt + 1`
    Nack,
    /// Give up; move the payload to the dead-letter destination
    Park {
        /// Why the event was parked
        reason: String,
    },
}

/// Receiving half used by transports to learn how a delivery was settled.
pub type AckReceiver = oneshot::Receiver<Acknowledgement>;

/// One delivery attempt of a message.
#[derive(Debug)]
pub struct Delivery {
    /// Topic the message was read from
    pub topic: String,
    /// Partitioning key, if any
    pub key: Option<String>,
    /// Raw message bytes
    pub payload: Vec<u8>,
    /// 1 for the first delivery, incremented on every redelivery
    pub attempt: u32,
    acker: Option<oneshot::Sender<Acknowledgement>>,
}

impl Delivery {
    /// Create a delivery and the receiver that observes its settlement.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        key: Option<String>,
        payload: Vec<u8>,
        attempt: u32,
    ) -> (Self, AckReceiver) {
        let (tx, rx) = oneshot::channel();
        let delivery = Self {
            topic: topic.into(),
            key,
            payload,
            attempt: attempt.max(1),
            acker: Some(tx),
        };
        (delivery, rx)
    }

    /// Settle the delivery.
    ///
    /// A transport that already gave up on the delivery is ignored.
    pub fn acknowledge(mut self, ack: Acknowledgement) {
        if let Some(tx) = self.acker.take() {
            let _ = tx.send(ack);
        }
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit boxed futures instead of `async fn` so it can be
/// held as `Arc<dyn EventBus>` by the ingestor and the health monitor.
pub trait EventBus: Send + Sync {
    /// Publish a payload to a topic, partitioned by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> BoxFuture<'_, Result<(), EventBusError>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(&self, topics: &[&str]) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>>;

    /// Check that the transport is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the brokers cannot be
    /// reached.
    fn ping(&self) -> BoxFuture<'_, Result<(), EventBusError>>;
}
