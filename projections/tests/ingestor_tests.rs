//! Ingestor behavior against in-memory collaborators.

#![allow(clippy::unwrap_used)]

use staysearch_core::catalog::CatalogError;
use staysearch_core::event::ChangeKind;
use staysearch_core::event_bus::{Acknowledgement, Delivery, EventBus};
use staysearch_core::index::{IndexStore, ScanFilter};
use staysearch_core::item::ItemId;
use staysearch_projections::{
    DeadLetterStore, EventIngestor, InMemoryDeadLetterStore, InMemoryIndexStore, IngestConfig,
    IngestOutcome,
};
use staysearch_runtime::retry::RetryPolicy;
use staysearch_testing::{fixtures, FailingIndexStore, InMemoryEventBus, StubCatalog};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    index: Arc<InMemoryIndexStore>,
    catalog: Arc<StubCatalog>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
    ingestor: Arc<EventIngestor>,
}

fn harness(catalog: StubCatalog) -> Harness {
    let index = Arc::new(InMemoryIndexStore::new());
    let catalog = Arc::new(catalog);
    let dead_letters = Arc::new(InMemoryDeadLetterStore::default());
    let config = IngestConfig::default()
        .with_max_attempts(3)
        .with_catalog_retry(RetryPolicy::builder().max_retries(1).initial_delay(Duration::from_millis(1)).build());

    let ingestor = EventIngestor::new(index.clone(), catalog.clone(), dead_letters.clone())
        .with_config(config)
        .with_clock(Arc::new(staysearch_testing::test_clock()));

    Harness {
        index,
        catalog,
        dead_letters,
        ingestor: Arc::new(ingestor),
    }
}

async fn indexed_name(h: &Harness, id: &str) -> String {
    h.index.get(&ItemId::new(id)).await.unwrap().unwrap().name
}

fn delivery(payload: Vec<u8>, attempt: u32) -> Delivery {
    Delivery::new("catalog.item-events", Some("H1".to_string()), payload, attempt).0
}

#[tokio::test]
async fn create_then_delete_hides_item_from_scan() {
    let h = harness(StubCatalog::new());

    let created = h
        .ingestor
        .apply(&fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 0))
        .await
        .unwrap();
    assert_eq!(created, IngestOutcome::Upserted);
    assert_eq!(h.index.scan(&ScanFilter::all().region("x")).await.unwrap().len(), 1);

    let deleted = h.ingestor.apply(&fixtures::deleted("H1", 10)).await.unwrap();
    assert_eq!(deleted, IngestOutcome::Deactivated);
    assert!(h.index.scan(&ScanFilter::all().region("x")).await.unwrap().is_empty());
    assert!(!h.index.get(&ItemId::new("H1")).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn late_update_does_not_resurrect_deleted_item() {
    let h = harness(StubCatalog::new());

    h.ingestor.apply(&fixtures::deleted("H1", 10)).await.unwrap();
    let late = h
        .ingestor
        .apply(&fixtures::updated(fixtures::snapshot("H1", "Alpha", "X", 4.0), 5))
        .await
        .unwrap();

    assert_eq!(late, IngestOutcome::Stale);
    assert!(h.index.scan(&ScanFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn redelivered_event_is_a_duplicate() {
    let h = harness(StubCatalog::new());
    let event = fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 0);

    assert_eq!(h.ingestor.apply(&event).await.unwrap(), IngestOutcome::Upserted);
    assert_eq!(h.ingestor.apply(&event).await.unwrap(), IngestOutcome::Duplicate);
    assert_eq!(h.index.active_count().unwrap(), 1);
}

#[tokio::test]
async fn redelivered_create_does_not_undo_same_instant_update() {
    let h = harness(StubCatalog::new());
    let created = fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 5);
    let updated = fixtures::updated(fixtures::snapshot("H1", "Alpha Renamed", "X", 4.0), 5);

    h.ingestor.apply(&created).await.unwrap();
    assert_eq!(h.ingestor.apply(&updated).await.unwrap(), IngestOutcome::Upserted);
    assert_eq!(indexed_name(&h, "H1").await, "Alpha Renamed");

    assert_eq!(h.ingestor.apply(&created).await.unwrap(), IngestOutcome::Stale);
    assert_eq!(indexed_name(&h, "H1").await, "Alpha Renamed");
}

#[tokio::test]
async fn same_instant_update_wins_regardless_of_arrival() {
    let h = harness(StubCatalog::new());

    h.ingestor
        .apply(&fixtures::updated(fixtures::snapshot("H1", "Alpha Renamed", "X", 4.0), 5))
        .await
        .unwrap();
    let late_create = h
        .ingestor
        .apply(&fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 5))
        .await
        .unwrap();

    assert_eq!(late_create, IngestOutcome::Stale);
    assert_eq!(indexed_name(&h, "H1").await, "Alpha Renamed");
}

#[tokio::test]
async fn newer_update_reactivates_after_delete() {
    let h = harness(StubCatalog::new());

    h.ingestor
        .apply(&fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 0))
        .await
        .unwrap();
    h.ingestor.apply(&fixtures::deleted("H1", 5)).await.unwrap();
    h.ingestor
        .apply(&fixtures::updated(fixtures::snapshot("H1", "Alpha II", "X", 4.5), 9))
        .await
        .unwrap();

    let item = h.index.get(&ItemId::new("H1")).await.unwrap().unwrap();
    assert!(item.active);
    assert_eq!(item.name, "Alpha II");
}

#[tokio::test]
async fn thin_event_is_resolved_through_catalog() {
    let catalog = StubCatalog::new().with("H1", fixtures::snapshot("H1", "From Catalog", "Y", 3.5));
    let h = harness(catalog);

    let outcome = h
        .ingestor
        .apply(&fixtures::thin(ChangeKind::Updated, "H1", 0))
        .await
        .unwrap();

    assert_eq!(outcome, IngestOutcome::Upserted);
    assert_eq!(h.index.get(&ItemId::new("H1")).await.unwrap().unwrap().name, "From Catalog");
}

#[tokio::test]
async fn transient_catalog_failure_is_retried_in_process() {
    let catalog = StubCatalog::new().with("H1", fixtures::snapshot("H1", "Alpha", "X", 4.0));
    catalog.fail_next("H1", 1, CatalogError::Transport("connection reset".to_string()));
    let h = harness(catalog);

    let payload = fixtures::thin(ChangeKind::Created, "H1", 0).encode().unwrap();
    let ack = h.ingestor.process(delivery(payload, 1)).await;

    assert_eq!(ack, Acknowledgement::Ack);
    assert_eq!(h.catalog.calls(), 2);
}

#[tokio::test]
async fn missing_catalog_record_is_nacked_then_parked() {
    let h = harness(StubCatalog::new());
    let payload = fixtures::thin(ChangeKind::Created, "H1", 0).encode().unwrap();

    let first = h.ingestor.process(delivery(payload.clone(), 1)).await;
    let last = h.ingestor.process(delivery(payload, 3)).await;

    assert_eq!(first, Acknowledgement::Nack);
    assert!(matches!(last, Acknowledgement::Park { .. }));
    assert_eq!(h.dead_letters.count(), 1);
    assert_eq!(h.dead_letters.recent(1)[0].subject_id, Some(ItemId::new("H1")));
    assert_eq!(h.dead_letters.recent(1)[0].attempts, 3);
}

#[tokio::test]
async fn malformed_payload_is_parked_immediately() {
    let h = harness(StubCatalog::new());

    let ack = h.ingestor.process(delivery(b"{not json".to_vec(), 1)).await;

    assert!(matches!(ack, Acknowledgement::Park { .. }));
    assert_eq!(h.dead_letters.count(), 1);
    assert_eq!(h.dead_letters.recent(1)[0].subject_id, None);
}

#[tokio::test]
async fn invalid_snapshot_is_parked() {
    let h = harness(StubCatalog::new());
    let mut snapshot = fixtures::snapshot("H1", "Alpha", "X", 4.0);
    snapshot.rating = 9.0;
    let payload = serde_json::to_vec(&serde_json::json!({
        "kind": "created",
        "subject_id": "H1",
        "snapshot": snapshot,
        "timestamp": "2026-03-01T10:00:00Z"
    }))
    .unwrap();

    let ack = h.ingestor.process(delivery(payload, 1)).await;

    assert!(matches!(ack, Acknowledgement::Park { .. }));
    assert!(h.index.get(&ItemId::new("H1")).await.unwrap().is_none());
}

#[tokio::test]
async fn index_outage_is_retryable() {
    let dead_letters = Arc::new(InMemoryDeadLetterStore::default());
    let ingestor = EventIngestor::new(
        Arc::new(FailingIndexStore),
        Arc::new(StubCatalog::new()),
        dead_letters.clone(),
    );
    let payload = fixtures::created(fixtures::snapshot("H1", "Alpha", "X", 4.0), 0)
        .encode()
        .unwrap();

    let ack = ingestor.process(delivery(payload, 1)).await;

    assert_eq!(ack, Acknowledgement::Nack);
    assert_eq!(dead_letters.count(), 0);
}

#[tokio::test]
async fn run_consumes_until_shutdown() {
    let h = harness(StubCatalog::new());
    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let task = tokio::spawn(Arc::clone(&h.ingestor).run(
        Arc::new(bus.clone()),
        "catalog.item-events".to_string(),
        shutdown_rx,
    ));

    for (id, secs) in [("H1", 0), ("H2", 1), ("H3", 2)] {
        let event = fixtures::created(fixtures::snapshot(id, id, "X", 4.0), secs);
        bus.publish("catalog.item-events", id, &event.encode().unwrap())
            .await
            .unwrap();
    }
    bus.publish("catalog.item-events", "H2", &fixtures::deleted("H2", 5).encode().unwrap())
        .await
        .unwrap();

    assert!(bus.wait_for_settled(4, Duration::from_secs(2)).await);
    assert_eq!(h.index.active_count().unwrap(), 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn run_redelivers_until_parked() {
    let h = harness(StubCatalog::new());
    let bus = InMemoryEventBus::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let task = tokio::spawn(Arc::clone(&h.ingestor).run(
        Arc::new(bus.clone()),
        "catalog.item-events".to_string(),
        shutdown_rx,
    ));

    let thin = fixtures::thin(ChangeKind::Created, "H404", 0).encode().unwrap();
    bus.publish("catalog.item-events", "H404", &thin).await.unwrap();

    assert!(bus.wait_for_settled(1, Duration::from_secs(2)).await);
    assert_eq!(bus.nacked(), 2);
    assert_eq!(bus.parked()[0].attempt, 3);
    assert_eq!(h.dead_letters.count(), 1);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}
