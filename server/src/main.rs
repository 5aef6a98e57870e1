//! Search server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start Redpanda (and optionally Redis)
//! docker compose up -d
//!
//! ORACLE_MODE=simulated cargo run --bin staysearch
//! ```

use anyhow::Context;
use staysearch_runtime::metrics::MetricsServer;
use staysearch_server::{build, Config};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "staysearch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting search server");

    let config = Config::from_env().context("loading configuration")?;
    info!(
        redpanda_brokers = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        catalog = %config.catalog.base_url,
        oracle_mode = ?config.oracle.mode,
        redis = config.cache.redis_url.is_some(),
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config
        .metrics_addr()
        .parse()
        .context("parsing metrics address")?;
    MetricsServer::new(metrics_addr)
        .start()
        .context("starting metrics exporter")?;
    info!(address = %metrics_addr, "Metrics exporter listening");

    let services = build(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest = tokio::spawn(services.ingestor.clone().run(
        services.event_bus.clone(),
        config.redpanda.topic.clone(),
        shutdown_rx,
    ));
    info!(topic = %config.redpanda.topic, "Event ingestor started");

    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(address = %addr, "Starting HTTP server");

    axum::serve(listener, staysearch_web::router(services.state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("HTTP server stopped, draining ingestor");
    let _ = shutdown_tx.send(true);
    drain(ingest, config.server.shutdown_timeout).await;

    info!("Server stopped");
    Ok(())
}

async fn drain(
    ingest: tokio::task::JoinHandle<Result<(), staysearch_projections::IngestError>>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, ingest).await {
        Ok(Ok(Ok(()))) => info!("Event ingestor stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "Event ingestor failed"),
        Ok(Err(e)) => error!(error = %e, "Event ingestor task panicked"),
        Err(_) => warn!(timeout_secs = timeout.as_secs(), "Event ingestor did not stop in time"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
