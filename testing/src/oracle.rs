use staysearch_core::availability::{AvailabilityOracle, AvailabilityQuery, OracleError, OracleQuote, Source};
use staysearch_core::item::ItemId;
use staysearch_core::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the stub answers for a lookup.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Return this quote
    Quote(OracleQuote),
    /// Fail with this error
    Fail(OracleError),
    /// Never answer
    Hang,
}

/// Scripted [`AvailabilityOracle`] that counts calls.
///
/// Answers with a bookable quote unless told otherwise, globally or per item.
#[derive(Debug)]
pub struct StubOracle {
    default: Mutex<StubBehavior>,
    per_item: Mutex<HashMap<ItemId, StubBehavior>>,
    latency: Mutex<Duration>,
    readiness: Mutex<Result<(), OracleError>>,
    source: Source,
    calls: AtomicUsize,
    calls_per_item: Mutex<HashMap<ItemId, usize>>,
}

impl Default for StubOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl StubOracle {
    /// Oracle answering every lookup as available at 100.0 EUR.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: Mutex::new(StubBehavior::Quote(crate::fixtures::available_quote(100.0))),
            per_item: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            readiness: Mutex::new(Ok(())),
            source: Source::Oracle,
            calls: AtomicUsize::new(0),
            calls_per_item: Mutex::new(HashMap::new()),
        }
    }

    /// Oracle failing every lookup with a transport error.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::new().with_default(StubBehavior::Fail(OracleError::Transport(
            "connection refused".to_string(),
        )))
    }

    /// Replace the behavior for items without a specific script.
    #[must_use]
    pub fn with_default(self, behavior: StubBehavior) -> Self {
        self.set_default(behavior);
        self
    }

    /// Script one item.
    #[must_use]
    pub fn with_item(self, id: &str, behavior: StubBehavior) -> Self {
        self.per_item.lock().unwrap().insert(ItemId::new(id), behavior);
        self
    }

    /// Delay every answer.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    /// Make `ensure_ready` fail.
    #[must_use]
    pub fn with_readiness(self, readiness: Result<(), OracleError>) -> Self {
        *self.readiness.lock().unwrap() = readiness;
        self
    }

    /// Tag results with `source`.
    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Change the default behavior while in use.
    pub fn set_default(&self, behavior: StubBehavior) {
        *self.default.lock().unwrap() = behavior;
    }

    /// Total `quote` calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `quote` calls for one item.
    #[must_use]
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls_per_item
            .lock()
            .unwrap()
            .get(&ItemId::new(id))
            .copied()
            .unwrap_or(0)
    }

    fn behavior_for(&self, id: &ItemId) -> StubBehavior {
        self.per_item
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.default.lock().unwrap().clone())
    }
}

impl AvailabilityOracle for StubOracle {
    fn quote(&self, query: &AvailabilityQuery) -> BoxFuture<'_, Result<OracleQuote, OracleError>> {
        let id = query.item_id.clone();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.calls_per_item.lock().unwrap().entry(id.clone()).or_insert(0) += 1;

            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            match self.behavior_for(&id) {
                StubBehavior::Quote(quote) => Ok(quote),
                StubBehavior::Fail(error) => Err(error),
                StubBehavior::Hang => std::future::pending().await,
            }
        })
    }

    fn ensure_ready(&self) -> BoxFuture<'_, Result<(), OracleError>> {
        Box::pin(async move { self.readiness.lock().unwrap().clone() })
    }

    fn source(&self) -> Source {
        self.source
    }
}
