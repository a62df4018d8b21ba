//! Bootstrap: wires the rate limiter, stores, queue, worker pool, and
//! fan-out into one `AppState`, spawns the worker pool and the two
//! background sweeps (rate-limiter bucket eviction, alert retention
//! purge), and serves HTTP with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use ingest_server::alert_engine::AlertEngine;
use ingest_server::config::Config;
use ingest_server::facade::IngestFacade;
use ingest_server::fanout::Fanout;
use ingest_server::http::{router, AppState};
use ingest_server::queue::IngestQueue;
use ingest_server::ratelimit::RateLimiter;
use ingest_server::store::{AlertStore, TelemetryStore};
use ingest_server::worker::{ShutdownMode, WorkerPool};

const RATELIMIT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);
const ALERT_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "ingest_server=info,tower_http=info".into()))
        .json()
        .init();

    let config = Arc::new(Config::from_env());
    info!(version = "2.0.0", port = config.port, "ingest server starting");

    let rate_limiter = Arc::new(RateLimiter::new(config.ratelimit.clone()));
    let telemetry_store = Arc::new(TelemetryStore::new());
    let alert_store = Arc::new(AlertStore::new());
    let alert_engine = Arc::new(AlertEngine::new(alert_store.clone()));
    let fanout = Arc::new(Fanout::new(
        Arc::new(config.processors.clone()),
        telemetry_store.clone(),
        alert_engine.clone(),
    ));

    let (queue, worker_pool) = if config.queue.enabled {
        let (queue, receiver) = IngestQueue::new(config.queue.capacity, config.queue.workers);
        let queue = Arc::new(queue);
        let pool = WorkerPool::spawn(
            config.queue.workers,
            receiver,
            queue.metrics(),
            telemetry_store.clone(),
            fanout.clone(),
        );
        (Some(queue), Some(pool))
    } else {
        (None, None)
    };

    let facade = Arc::new(IngestFacade::new(
        config.clone(),
        rate_limiter.clone(),
        queue.clone(),
        telemetry_store.clone(),
        fanout.clone(),
    ));

    tokio::spawn(ratelimit_eviction_task(rate_limiter.clone()));
    tokio::spawn(alert_purge_task(alert_store.clone(), config.alert_retention_months));

    let state = AppState {
        config: config.clone(),
        facade,
        queue,
        rate_limiter,
        telemetry_store,
        alert_store,
        alert_engine,
    };

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(pool) = worker_pool {
        pool.shutdown(ShutdownMode::Graceful).await;
    }

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}

async fn ratelimit_eviction_task(rate_limiter: Arc<RateLimiter>) {
    let mut interval = tokio::time::interval(RATELIMIT_EVICTION_INTERVAL);
    loop {
        interval.tick().await;
        rate_limiter.evict_idle();
    }
}

/// Advisory purge job: deletes alerts older than the configured
/// retention horizon. Safe to skip entirely; correctness does not
/// depend on it running.
async fn alert_purge_task(alert_store: Arc<AlertStore>, retention_months: u32) {
    let mut interval = tokio::time::interval(ALERT_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        let horizon = chrono::Utc::now() - chrono::Duration::days(30 * retention_months as i64);
        let removed = alert_store.purge_older_than(horizon);
        if removed > 0 {
            info!(removed, "alert retention purge");
        }
    }
}
