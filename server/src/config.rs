//! Configuration management for the search server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is read first (see `main`).

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable required by the chosen settings is not set
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A variable is set to something unusable
    #[error("{key} is invalid: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP and metrics listeners
    pub server: ServerConfig,
    /// Change-event transport
    pub redpanda: RedpandaConfig,
    /// Catalog used for thin events and cold lookups
    pub catalog: CatalogConfig,
    /// Availability oracle
    pub oracle: OracleConfig,
    /// Availability cache
    pub cache: CacheConfig,
    /// Query aggregation
    pub search: SearchConfig,
    /// Event ingestion
    pub ingest: IngestConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Time given to in-flight work after a shutdown signal
    pub shutdown_timeout: Duration,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Consumer group of the ingestor
    pub consumer_group: String,
    /// Topic carrying catalog change events
    pub topic: String,
    /// Topic receiving parked events
    pub dead_letter_topic: String,
    /// `earliest` or `latest`
    pub auto_offset_reset: String,
    /// Deliveries buffered between the consumer and the ingestor
    pub buffer_size: usize,
}

/// Catalog client configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Where availability answers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleMode {
    /// Real provider over HTTP with client-credentials auth
    Http,
    /// Deterministic local answers, never confirmed
    Simulated,
}

impl FromStr for OracleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!("expected `http` or `simulated`, got `{other}`")),
        }
    }
}

/// Availability oracle configuration
#[derive(Clone)]
pub struct OracleConfig {
    /// Real or simulated oracle
    pub mode: OracleMode,
    /// Base URL of the provider API
    pub base_url: Option<String>,
    /// Token endpoint; defaults to `{base_url}/v1/security/oauth2/token`
    pub token_url: Option<String>,
    /// OAuth2 client id
    pub client_id: Option<String>,
    /// OAuth2 client secret
    pub client_secret: Option<String>,
    /// Per-lookup timeout
    pub timeout: Duration,
    /// Consecutive failures that open the circuit
    pub breaker_failure_threshold: usize,
    /// Time the circuit stays open before a probe
    pub breaker_reset: Duration,
}

impl OracleConfig {
    /// Token endpoint, explicit or derived from the base URL.
    #[must_use]
    pub fn token_url(&self) -> Option<String> {
        self.token_url.clone().or_else(|| {
            self.base_url
                .as_ref()
                .map(|base| format!("{}/v1/security/oauth2/token", base.trim_end_matches('/')))
        })
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("breaker_failure_threshold", &self.breaker_failure_threshold)
            .field("breaker_reset", &self.breaker_reset)
            .finish()
    }
}

/// Availability cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL; the in-memory backend is used when unset
    pub redis_url: Option<String>,
    /// Lifetime of available/unavailable answers
    pub positive_ttl: Duration,
    /// Lifetime of unknown and simulated answers
    pub unknown_ttl: Duration,
    /// Entry bound of the in-memory backend
    pub capacity: usize,
}

/// Query aggregation configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Oracle lookups in flight per search
    pub max_in_flight: usize,
    /// Deadline for the whole fan-out; `None` when set to 0
    pub request_timeout: Option<Duration>,
    /// Show simulated availability as unconfirmed instead of hiding it
    pub allow_simulated: bool,
}

/// Event ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Deliveries of one event before it is parked
    pub max_attempts: u32,
    /// Events processed at once
    pub concurrency: usize,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be used or the combination
    /// is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a map of variables.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    #[allow(clippy::too_many_lines)]
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parsed = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());
        let millis = |key: &str, default: u64| Duration::from_millis(parsed(key).unwrap_or(default));
        let secs = |key: &str, default: u64| Duration::from_secs(parsed(key).unwrap_or(default));
        let string = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| get(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let topic = string("ITEM_EVENTS_TOPIC", "catalog.item-events");
        let mode = match get("ORACLE_MODE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "ORACLE_MODE",
                reason,
            })?,
            None => OracleMode::Http,
        };
        let request_timeout = millis("SEARCH_TIMEOUT_MS", 5_000);

        let config = Self {
            server: ServerConfig {
                host: string("HOST", "0.0.0.0"),
                port: get("PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                metrics_host: string("METRICS_HOST", "0.0.0.0"),
                metrics_port: get("METRICS_PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(9090),
                shutdown_timeout: secs("SHUTDOWN_TIMEOUT", 30),
            },
            redpanda: RedpandaConfig {
                brokers: string("REDPANDA_BROKERS", "localhost:9092"),
                consumer_group: string("CONSUMER_GROUP", "staysearch-indexer"),
                dead_letter_topic: get("DEAD_LETTER_TOPIC")
                    .unwrap_or_else(|| format!("{topic}.dead-letter")),
                topic,
                auto_offset_reset: string("REDPANDA_AUTO_OFFSET_RESET", "earliest"),
                buffer_size: get("REDPANDA_BUFFER_SIZE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
            },
            catalog: CatalogConfig {
                base_url: string("CATALOG_BASE_URL", "http://localhost:8081"),
                timeout: millis("CATALOG_TIMEOUT_MS", 3_000),
            },
            oracle: OracleConfig {
                mode,
                base_url: optional("ORACLE_BASE_URL"),
                token_url: optional("ORACLE_TOKEN_URL"),
                client_id: optional("ORACLE_CLIENT_ID"),
                client_secret: optional("ORACLE_CLIENT_SECRET"),
                timeout: millis("ORACLE_TIMEOUT_MS", 3_000),
                breaker_failure_threshold: get("ORACLE_BREAKER_THRESHOLD")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                breaker_reset: secs("ORACLE_BREAKER_RESET_SECS", 30),
            },
            cache: CacheConfig {
                redis_url: optional("REDIS_URL"),
                positive_ttl: secs("CACHE_POSITIVE_TTL_SECS", 10),
                unknown_ttl: secs("CACHE_UNKNOWN_TTL_SECS", 2),
                capacity: get("CACHE_CAPACITY")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10_000),
            },
            search: SearchConfig {
                max_in_flight: get("SEARCH_MAX_IN_FLIGHT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                request_timeout: (!request_timeout.is_zero()).then_some(request_timeout),
                allow_simulated: get("SEARCH_ALLOW_SIMULATED")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
            },
            ingest: IngestConfig {
                max_attempts: get("INGEST_MAX_ATTEMPTS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                concurrency: get("INGEST_CONCURRENCY")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(16),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.mode == OracleMode::Http {
            if self.oracle.base_url.is_none() {
                return Err(ConfigError::Missing("ORACLE_BASE_URL"));
            }
            if self.oracle.client_id.is_none() {
                return Err(ConfigError::Missing("ORACLE_CLIENT_ID"));
            }
            if self.oracle.client_secret.is_none() {
                return Err(ConfigError::Missing("ORACLE_CLIENT_SECRET"));
            }
        }
        if self.redpanda.brokers.trim().is_empty() {
            return Err(ConfigError::Missing("REDPANDA_BROKERS"));
        }
        if self.redpanda.dead_letter_topic == self.redpanda.topic {
            return Err(ConfigError::Invalid {
                key: "DEAD_LETTER_TOPIC",
                reason: "must differ from ITEM_EVENTS_TOPIC".to_string(),
            });
        }
        if !matches!(self.redpanda.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(ConfigError::Invalid {
                key: "REDPANDA_AUTO_OFFSET_RESET",
                reason: "expected `earliest` or `latest`".to_string(),
            });
        }
        if self.search.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                key: "SEARCH_MAX_IN_FLIGHT",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.unknown_ttl > self.cache.positive_ttl {
            return Err(ConfigError::Invalid {
                key: "CACHE_UNKNOWN_TTL_SECS",
                reason: "must not exceed CACHE_POSITIVE_TTL_SECS".to_string(),
            });
        }
        if self.server.port == self.server.metrics_port {
            return Err(ConfigError::Invalid {
                key: "METRICS_PORT",
                reason: "must differ from PORT".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` of the HTTP listener.
    #[must_use]
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// `host:port` of the metrics listener.
    #[must_use]
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}
