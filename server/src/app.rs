//! Component wiring.
//!
//! ```text
//! Redpanda ──► EventIngestor ──► InMemoryIndexStore ◄── QueryAggregator ◄── axum
//!                   │                                         │
//!                   └──► HttpCatalogClient        AvailabilityCache ──► AvailabilityClient ──► oracle
//! ```

use crate::config::{Config, OracleMode};
use anyhow::Context;
use staysearch_clients::{ClientCredentials, HttpAvailabilityOracle, HttpCatalogClient, RedisCacheBackend};
use staysearch_core::availability::AvailabilityOracle;
use staysearch_core::cache::CacheBackend;
use staysearch_core::event_bus::EventBus;
use staysearch_projections::{
    EventIngestor, InMemoryDeadLetterStore, InMemoryIndexStore, IngestConfig as IngestTuning,
};
use staysearch_redpanda::RedpandaEventBus;
use staysearch_runtime::CircuitBreakerConfig;
use staysearch_search::{
    AggregatorConfig, AvailabilityCache, AvailabilityClient, CacheTtl, ClientConfig,
    DegradationPolicy, HealthMonitor, InMemoryCacheBackend, ItemLookup, QueryAggregator,
    SimulatedOracle,
};
use staysearch_web::AppState;
use std::sync::Arc;

/// Everything `main` needs to run.
pub struct Services {
    /// Handler state
    pub state: AppState,
    /// Consumer of change events
    pub ingestor: Arc<EventIngestor>,
    /// Transport the ingestor subscribes to
    pub event_bus: Arc<dyn EventBus>,
}

/// Build every component from `config`.
///
/// # Errors
///
/// Fails if the event bus, the catalog client or the oracle client cannot
/// be constructed. An unreachable Redis is not an error; the in-memory cache
/// is used instead.
pub async fn build(config: &Config) -> anyhow::Result<Services> {
    let index = Arc::new(InMemoryIndexStore::new());
    let dead_letters = Arc::new(InMemoryDeadLetterStore::default());

    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .buffer_size(config.redpanda.buffer_size)
            .dead_letter_topic(&config.redpanda.dead_letter_topic)
            .build()
            .context("building Redpanda event bus")?,
    );

    let catalog = Arc::new(
        HttpCatalogClient::new(&config.catalog.base_url, config.catalog.timeout)
            .context("building catalog client")?,
    );

    let ingestor = Arc::new(
        EventIngestor::new(index.clone(), catalog.clone(), dead_letters.clone()).with_config(
            IngestTuning::default()
                .with_max_attempts(config.ingest.max_attempts)
                .with_max_concurrent_events(config.ingest.concurrency),
        ),
    );

    let client = Arc::new(AvailabilityClient::with_config(
        oracle(config)?,
        ClientConfig::default()
            .with_timeout(config.oracle.timeout)
            .with_breaker(
                CircuitBreakerConfig::builder()
                    .failure_threshold(config.oracle.breaker_failure_threshold)
                    .timeout(config.oracle.breaker_reset)
                    .build(),
            ),
    ));

    let cache = AvailabilityCache::new(cache_backend(config).await).with_ttl(CacheTtl {
        positive: config.cache.positive_ttl,
        unknown: config.cache.unknown_ttl,
    });

    let aggregator = QueryAggregator::new(index.clone(), Arc::new(cache), client.clone())
        .with_policy(DegradationPolicy::new().allow_simulated(config.search.allow_simulated))
        .with_config(
            AggregatorConfig::default()
                .with_max_in_flight(config.search.max_in_flight)
                .with_request_timeout(config.search.request_timeout),
        );

    let lookup = ItemLookup::new(index.clone(), catalog);
    let health = HealthMonitor::new(index, event_bus.clone(), client, dead_letters);

    Ok(Services {
        state: AppState::new(Arc::new(aggregator), Arc::new(lookup), Arc::new(health)),
        ingestor,
        event_bus,
    })
}

fn oracle(config: &Config) -> anyhow::Result<Arc<dyn AvailabilityOracle>> {
    let oracle = &config.oracle;
    match oracle.mode {
        OracleMode::Simulated => {
            tracing::warn!("Using the simulated availability oracle; answers are never confirmed");
            Ok(Arc::new(SimulatedOracle::default()))
        }
        OracleMode::Http => {
            let base_url = oracle.base_url.clone().context("ORACLE_BASE_URL must be set")?;
            let credentials = ClientCredentials {
                token_url: oracle.token_url().context("ORACLE_TOKEN_URL must be set")?,
                client_id: oracle.client_id.clone().context("ORACLE_CLIENT_ID must be set")?,
                client_secret: oracle
                    .client_secret
                    .clone()
                    .context("ORACLE_CLIENT_SECRET must be set")?,
            };
            tracing::info!(base_url = %base_url, "Using HTTP availability oracle");
            Ok(Arc::new(
                HttpAvailabilityOracle::new(base_url, credentials, oracle.timeout)
                    .context("building oracle client")?,
            ))
        }
    }
}

async fn cache_backend(config: &Config) -> Arc<dyn CacheBackend> {
    let in_memory = || Arc::new(InMemoryCacheBackend::new(config.cache.capacity)) as Arc<dyn CacheBackend>;

    let Some(url) = config.cache.redis_url.as_deref() else {
        tracing::info!(capacity = config.cache.capacity, "Using in-memory availability cache");
        return in_memory();
    };

    match RedisCacheBackend::new(url).await {
        Ok(backend) => {
            tracing::info!("Using Redis availability cache");
            Arc::new(backend)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to in-memory cache");
            in_memory()
        }
    }
}
