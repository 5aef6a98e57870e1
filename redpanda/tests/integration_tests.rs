//! Integration tests for [`RedpandaEventBus`] against a real Kafka broker.
//!
//! These tests use testcontainers to start Kafka and validate:
//! - Publish/subscribe round-trip with `Ack`
//! - `Nack` redelivery with an incremented attempt
//! - `Park` routing to the dead-letter topic
//! - Broker liveness probe
//!
//! # Running These Tests
//!
//! Marked `#[ignore]` because they need Docker and take a while to start:
//! ```bash
//! cargo test -p staysearch-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use staysearch_core::event_bus::{Acknowledgement, Delivery, DeliveryStream, EventBus};
use staysearch_redpanda::RedpandaEventBus;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");
    wait_for_kafka_ready(&brokers).await;
    (kafka, brokers)
}

async fn wait_for_kafka_ready(brokers: &str) {
    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if let Ok(bus) = RedpandaEventBus::builder().brokers(brokers).build() {
            if bus.publish("warmup-topic", "warmup", b"{}").await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Kafka failed to become ready after {max_attempts} attempts"
        );
    }
}

async fn bus(brokers: &str, group: &str) -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus")
}

async fn next_payload(stream: &mut DeliveryStream, payload: &[u8]) -> Delivery {
    tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let delivery = stream
                .next()
                .await
                .expect("stream ended")
                .expect("transport error");
            if delivery.payload == payload {
                return delivery;
            }
            delivery.acknowledge(Acknowledgement::Ack);
        }
    })
    .await
    .expect("Timeout waiting for delivery")
}

#[tokio::test]
#[ignore]
async fn publish_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "round-trip").await;

    event_bus
        .publish("catalog.item-events", "H1", b"first")
        .await
        .expect("Failed to publish");

    let mut stream = event_bus
        .subscribe(&["catalog.item-events"])
        .await
        .expect("Failed to subscribe");

    let delivery = next_payload(&mut stream, b"first").await;
    assert_eq!(delivery.attempt, 1);
    assert_eq!(delivery.key.as_deref(), Some("H1"));
    delivery.acknowledge(Acknowledgement::Ack);
}

#[tokio::test]
#[ignore]
async fn nack_redelivers_with_next_attempt() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "nack-test").await;

    event_bus
        .publish("nack-events", "H1", b"retry me")
        .await
        .expect("Failed to publish");

    let mut stream = event_bus
        .subscribe(&["nack-events"])
        .await
        .expect("Failed to subscribe");

    let first = next_payload(&mut stream, b"retry me").await;
    assert_eq!(first.attempt, 1);
    first.acknowledge(Acknowledgement::Nack);

    let second = next_payload(&mut stream, b"retry me").await;
    assert_eq!(second.attempt, 2);
    second.acknowledge(Acknowledgement::Ack);
}

#[tokio::test]
#[ignore]
async fn park_routes_to_dead_letter_topic() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "park-test").await;
    let dead_letters = bus(&brokers, "park-test-dlq").await;

    event_bus
        .publish("park-events", "H1", b"poison")
        .await
        .expect("Failed to publish");
    // Create the dead-letter topic before subscribing to it.
    dead_letters
        .publish("park-events.dead-letter", "warmup", b"warmup")
        .await
        .expect("Failed to create dead-letter topic");

    let mut stream = event_bus
        .subscribe(&["park-events"])
        .await
        .expect("Failed to subscribe");
    let mut parked = dead_letters
        .subscribe(&["park-events.dead-letter"])
        .await
        .expect("Failed to subscribe to dead letters");

    next_payload(&mut stream, b"poison")
        .await
        .acknowledge(Acknowledgement::Park {
            reason: "invalid snapshot".to_string(),
        });

    let dead = next_payload(&mut parked, b"poison").await;
    assert_eq!(dead.topic, "park-events.dead-letter");
    dead.acknowledge(Acknowledgement::Ack);
}

#[tokio::test]
#[ignore]
async fn ping_reaches_broker() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "ping-test").await;

    assert!(event_bus.ping().await.is_ok());
}

#[tokio::test]
async fn ping_fails_without_broker() {
    let event_bus = RedpandaEventBus::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_millis(200))
        .build()
        .expect("Failed to create event bus");

    assert!(event_bus.ping().await.is_err());
}
