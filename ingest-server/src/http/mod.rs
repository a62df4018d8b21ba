//! HTTP adapter: axum routes, request/response encodings, shared state.
//!
//! Everything in this module is deliberately thin — framing, routing, and
//! status-code mapping only. All behavior lives in `facade`/`ratelimit`/
//! `store`; this module just calls it and translates the result to wire
//! shapes.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::alert_engine::AlertEngine;
use crate::config::Config;
use crate::facade::IngestFacade;
use crate::queue::IngestQueue;
use crate::ratelimit::RateLimiter;
use crate::store::{AlertStore, TelemetryStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub facade: Arc<IngestFacade>,
    pub queue: Option<Arc<IngestQueue>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub telemetry_store: Arc<TelemetryStore>,
    pub alert_store: Arc<AlertStore>,
    pub alert_engine: Arc<AlertEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/telemetry", post(handlers::ingest))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/v1/queue", get(handlers::queue_status))
        .route("/metrics", get(handlers::metrics))
        .route("/v1/devices/:device_id/telemetry", get(handlers::device_telemetry))
        .route("/v1/devices/:device_id/latest", get(handlers::device_latest))
        .route("/v1/alerts", get(handlers::list_alerts))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
}
