//! Redpanda event bus for StaySearch.
//!
//! Implements the [`EventBus`] trait from `staysearch-core` on top of rdkafka,
//! so any Kafka-compatible broker (Redpanda, Apache Kafka, MSK) can carry
//! catalog change events.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │   Redpanda   │
//!                 └──────┬───────┘
//!                        │ messages (offset order)
//!                        ▼
//!               ┌─────────────────┐   Delivery    ┌────────────┐
//!               │  consumer task  │──────────────►│ subscriber │
//!               └────────┬────────┘               └─────┬──────┘
//!                        │ pending (offset order)       │ Ack / Nack / Park
//!                        ▼                              │
//!               ┌─────────────────┐◄────────────────────┘
//!               │ committer task  │
//!               └────────┬────────┘
//!          commit offset │ republish (Nack) │ dead-letter (Park)
//!                        ▼
//!                 ┌──────────────┐
//!                 │   Redpanda   │
//!                 └──────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Deliveries may be settled in any order, but offsets are committed strictly
//!   in the order messages were read
//! - `Ack` commits the offset
//! - `Nack` republishes the message to the same topic with an incremented
//!   `x-delivery-attempt` header, then commits
//! - `Park` publishes the message to the dead-letter topic (default
//!   `{topic}.dead-letter`), then commits
//! - A delivery dropped without being settled counts as `Nack`
//! - If the process crashes before a commit, the message is redelivered
//!
//! # Example
//!
//! ```no_run
//! use staysearch_redpanda::RedpandaEventBus;
//! use staysearch_core::event_bus::{Acknowledgement, EventBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("staysearch-indexer")
//!     .build()?;
//!
//! event_bus.publish("catalog.item-events", "H1", br#"{"kind":"deleted"}"#).await?;
//!
//! let mut stream = event_bus.subscribe(&["catalog.item-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     if let Ok(delivery) = result {
//!         delivery.acknowledge(Acknowledgement::Ack);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use staysearch_core::event_bus::{
    AckReceiver, Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};
use staysearch_core::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Header carrying the 1-based delivery attempt.
pub const ATTEMPT_HEADER: &str = "x-delivery-attempt";

/// Header carrying the reason a message was parked.
pub const PARK_REASON_HEADER: &str = "x-park-reason";

/// Suffix appended to a topic to name its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout
/// - **Consumer group**: Explicit ID or auto-generated from topics
/// - **Buffer size**: Unsettled deliveries per subscription (default: 1000)
/// - **Offset reset**: Where new groups start reading (default: "latest")
/// - **Dead-letter topic**: Explicit name or `{topic}.dead-letter`
///
/// # Example
///
/// ```no_run
/// use staysearch_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing, republishing and dead-lettering
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Unsettled deliveries per subscription
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Explicit dead-letter topic
    dead_letter_topic: Option<String>,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Dead-letter topic for messages parked from `topic`.
    #[must_use]
    pub fn dead_letter_topic_for(&self, topic: &str) -> String {
        self.dead_letter_topic
            .clone()
            .unwrap_or_else(|| format!("{topic}{DEAD_LETTER_SUFFIX}"))
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    dead_letter_topic: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the group is derived from the subscribed topics. Instances
    /// sharing a group share the partitions.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many deliveries may be outstanding (read but not committed)
    /// per subscription. Values below 1 are raised to 1.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the auto offset reset policy for new consumer groups:
    /// `"earliest"`, `"latest"` or `"error"`.
    ///
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Send parked messages to `topic` instead of `{topic}.dead-letter`.
    #[must_use]
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;

        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(1000);
        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
            dead_letter_topic: self.dead_letter_topic,
        })
    }
}

/// A message read from the broker whose delivery is not yet settled.
struct Pending {
    topic: String,
    partition: i32,
    offset: i64,
    key: Option<String>,
    payload: Vec<u8>,
    attempt: u32,
    ack: AckReceiver,
}

/// Everything the committer needs to settle deliveries.
struct Settler {
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    timeout: Duration,
    dead_letter_topic: Option<String>,
}

impl Settler {
    /// Settle pending deliveries in read order until the queue closes or a
    /// settlement cannot be made durable.
    async fn run(self, mut pending: mpsc::Receiver<Pending>) {
        while let Some(mut entry) = pending.recv().await {
            let ack = (&mut entry.ack).await.unwrap_or(Acknowledgement::Nack);

            let settled = match &ack {
                Acknowledgement::Ack => Ok(()),
                Acknowledgement::Nack => {
                    let attempt = entry.attempt.saturating_add(1);
                    tracing::debug!(
                        topic = %entry.topic,
                        offset = entry.offset,
                        attempt,
                        "Republishing for redelivery"
                    );
                    send(
                        &self.producer,
                        &entry.topic,
                        entry.key.as_deref(),
                        &entry.payload,
                        attempt_headers(attempt, None),
                        self.timeout,
                    )
                    .await
                }
                Acknowledgement::Park { reason } => {
                    let dead_letter = self
                        .dead_letter_topic
                        .clone()
                        .unwrap_or_else(|| format!("{}{DEAD_LETTER_SUFFIX}", entry.topic));
                    tracing::warn!(
                        topic = %entry.topic,
                        dead_letter = %dead_letter,
                        offset = entry.offset,
                        attempt = entry.attempt,
                        reason = %reason,
                        "Parking message"
                    );
                    send(
                        &self.producer,
                        &dead_letter,
                        entry.key.as_deref(),
                        &entry.payload,
                        attempt_headers(entry.attempt, Some(reason)),
                        self.timeout,
                    )
                    .await
                }
            };

            if let Err(e) = settled {
                // Stop committing so the message is read again after restart.
                tracing::error!(
                    topic = %entry.topic,
                    partition = entry.partition,
                    offset = entry.offset,
                    error = %e,
                    "Failed to settle delivery, halting commits"
                );
                break;
            }

            if let Err(e) = self.commit(&entry) {
                tracing::warn!(
                    topic = %entry.topic,
                    partition = entry.partition,
                    offset = entry.offset,
                    error = %e,
                    "Failed to commit offset (message may be redelivered)"
                );
            }
        }

        tracing::debug!("Committer task exiting");
    }

    fn commit(&self, entry: &Pending) -> Result<(), rdkafka::error::KafkaError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&entry.topic, entry.partition, Offset::Offset(entry.offset + 1))?;
        self.consumer.commit(&tpl, CommitMode::Async)
    }
}

fn attempt_headers(attempt: u32, reason: Option<&str>) -> OwnedHeaders {
    let attempt = attempt.to_string();
    let headers = OwnedHeaders::new().insert(Header {
        key: ATTEMPT_HEADER,
        value: Some(attempt.as_bytes()),
    });
    match reason {
        Some(reason) => headers.insert(Header {
            key: PARK_REASON_HEADER,
            value: Some(reason.as_bytes()),
        }),
        None => headers,
    }
}

/// Delivery attempt recorded on `message`, 1 when absent or unreadable.
fn delivery_attempt<M: Message>(message: &M) -> u32 {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|h| h.key == ATTEMPT_HEADER)
                .and_then(|h| h.value)
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(1)
}

async fn send(
    producer: &FutureProducer,
    topic: &str,
    key: Option<&str>,
    payload: &[u8],
    headers: OwnedHeaders,
    timeout: Duration,
) -> Result<(), EventBusError> {
    let mut record = FutureRecord::<str, [u8]>::to(topic)
        .payload(payload)
        .headers(headers);
    if let Some(key) = key {
        record = record.key(key);
    }

    match producer.send(record, Timeout::After(timeout)).await {
        Ok((partition, offset)) => {
            tracing::debug!(topic = %topic, partition, offset, "Message published");
            Ok(())
        }
        Err((kafka_error, _)) => {
            tracing::error!(topic = %topic, error = %kafka_error, "Failed to publish message");
            Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: kafka_error.to_string(),
            })
        }
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> BoxFuture<'_, Result<(), EventBusError>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            send(
                &self.producer,
                &topic,
                Some(&key),
                &payload,
                attempt_headers(1, None),
                self.timeout,
            )
            .await
        })
    }

    #[allow(clippy::too_many_lines)] // Consumer and committer wiring belong together
    fn subscribe(&self, topics: &[&str]) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer_group_id = consumer_group.unwrap_or_else(|| {
                let mut sorted_topics = topics.clone();
                sorted_topics.sort();
                format!("staysearch-{}", sorted_topics.join("-"))
            });

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let consumer = Arc::new(consumer);
            let (tx, rx) = mpsc::channel::<Result<Delivery, EventBusError>>(buffer_size);
            let (pending_tx, pending_rx) = mpsc::channel::<Pending>(buffer_size);

            let settler = Settler {
                consumer: Arc::clone(&consumer),
                producer: self.producer.clone(),
                timeout: self.timeout,
                dead_letter_topic: self.dead_letter_topic.clone(),
            };
            tokio::spawn(settler.run(pending_rx));

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let topic = message.topic().to_string();
                            let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                            let key = message
                                .key()
                                .map(|k| String::from_utf8_lossy(k).into_owned());
                            let attempt = delivery_attempt(&message);
                            let (partition, offset) = (message.partition(), message.offset());
                            drop(message);

                            tracing::trace!(topic = %topic, partition, offset, attempt, "Received message");

                            let (delivery, ack) =
                                Delivery::new(topic.clone(), key.clone(), payload.clone(), attempt);

                            // Queue for commit first so settlement order follows read order.
                            let queued = Pending {
                                topic,
                                partition,
                                offset,
                                key,
                                payload,
                                attempt,
                                ack,
                            };
                            if pending_tx.send(queued).await.is_err() {
                                tracing::warn!("Committer stopped, exiting consumer task");
                                break;
                            }

                            if tx.send(Ok(delivery)).await.is_err() {
                                tracing::debug!("Subscriber dropped, exiting consumer task");
                                break;
                            }
                        }
                        Err(e) => {
                            let err = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), EventBusError>> {
        let producer = self.producer.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                producer
                    .client()
                    .fetch_metadata(None, Timeout::After(timeout))
                    .map(|_| ())
                    .map_err(|e| EventBusError::ConnectionFailed(e.to_string()))
            })
            .await
            .map_err(|e| EventBusError::TransportError(format!("Metadata probe failed: {e}")))?
        })
    }
}
