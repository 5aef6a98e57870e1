use futures::stream;
use staysearch_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};
use staysearch_core::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A message the subscriber parked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedMessage {
    /// Source topic
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
    /// Reason given by the subscriber
    pub reason: String,
    /// Delivery attempt that parked it
    pub attempt: u32,
}

#[derive(Debug, Default)]
struct Shared {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
    backlog: Mutex<HashMap<String, Vec<(Option<String>, Vec<u8>, u32)>>>,
    published: Mutex<Vec<(String, String, Vec<u8>)>>,
    parked: Mutex<Vec<ParkedMessage>>,
    acked: AtomicUsize,
    nacked: AtomicUsize,
    unhealthy: AtomicBool,
}

/// In-process [`EventBus`].
///
/// Messages published before anyone subscribes are held and delivered on
/// subscription. A `Nack` (or a dropped delivery) redelivers the message with
/// `attempt + 1`; a `Park` records it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    shared: Arc<Shared>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` fail (or succeed again).
    pub fn set_healthy(&self, healthy: bool) {
        self.shared.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Every `(topic, key, payload)` published so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.shared.published.lock().unwrap().clone()
    }

    /// Messages parked so far.
    #[must_use]
    pub fn parked(&self) -> Vec<ParkedMessage> {
        self.shared.parked.lock().unwrap().clone()
    }

    /// Deliveries acknowledged.
    #[must_use]
    pub fn acked(&self) -> usize {
        self.shared.acked.load(Ordering::SeqCst)
    }

    /// Deliveries negatively acknowledged.
    #[must_use]
    pub fn nacked(&self) -> usize {
        self.shared.nacked.load(Ordering::SeqCst)
    }

    /// Wait until `count` deliveries were acked or parked.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_settled(&self, count: usize, timeout: Duration) -> bool {
        let settled = || self.acked() + self.shared.parked.lock().unwrap().len();
        tokio::time::timeout(timeout, async {
            while settled() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

fn dispatch(shared: &Arc<Shared>, topic: &str, key: Option<String>, payload: Vec<u8>, attempt: u32) {
    let (mut delivery, ack_rx) = Delivery::new(topic, key.clone(), payload.clone(), attempt);

    let accepted = {
        let mut subscribers = shared.subscribers.lock().unwrap();
        let senders = subscribers.entry(topic.to_string()).or_default();
        senders.retain(|tx| !tx.is_closed());

        let mut accepted = false;
        for tx in senders.iter() {
            match tx.send(delivery) {
                Ok(()) => {
                    accepted = true;
                    break;
                }
                Err(mpsc::error::SendError(returned)) => delivery = returned,
            }
        }
        accepted
    };

    if !accepted {
        shared
            .backlog
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push((key, payload, attempt));
        return;
    }

    let shared = Arc::clone(shared);
    let topic = topic.to_string();
    tokio::spawn(async move {
        match ack_rx.await {
            Ok(Acknowledgement::Ack) => {
                shared.acked.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Acknowledgement::Park { reason }) => {
                shared.parked.lock().unwrap().push(ParkedMessage {
                    topic,
                    payload,
                    reason,
                    attempt,
                });
            }
            Ok(Acknowledgement::Nack) | Err(_) => {
                shared.nacked.fetch_add(1, Ordering::SeqCst);
                dispatch(&shared, &topic, key, payload, attempt + 1);
            }
        }
    });
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> BoxFuture<'_, Result<(), EventBusError>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();
        Box::pin(async move {
            if self.shared.unhealthy.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "bus offline".to_string(),
                });
            }
            self.shared
                .published
                .lock()
                .unwrap()
                .push((topic.clone(), key.clone(), payload.clone()));
            dispatch(&self.shared, &topic, Some(key), payload, 1);
            Ok(())
        })
    }

    fn subscribe(&self, topics: &[&str]) -> BoxFuture<'_, Result<DeliveryStream, EventBusError>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut subscribers = self.shared.subscribers.lock().unwrap();
                for topic in &topics {
                    subscribers.entry(topic.clone()).or_default().push(tx.clone());
                }
            }

            for topic in &topics {
                let pending = self.shared.backlog.lock().unwrap().remove(topic).unwrap_or_default();
                for (key, payload, attempt) in pending {
                    dispatch(&self.shared, topic, key, payload, attempt);
                }
            }

            let deliveries: DeliveryStream =
                Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx).map(|next| next.map(Ok))));
            Ok(deliveries)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), EventBusError>> {
        Box::pin(async move {
            if self.shared.unhealthy.load(Ordering::SeqCst) {
                Err(EventBusError::ConnectionFailed("bus offline".to_string()))
            } else {
                Ok(())
            }
        })
    }
}
