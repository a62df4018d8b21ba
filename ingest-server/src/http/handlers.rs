use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::facade::{RejectReason, SubmitOutcome};
use crate::model::{AlertType, Severity, TelemetrySample};
use crate::store::PageRequest;

use super::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBody {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(tag = "status")]
enum IngestResponse {
    #[serde(rename = "queued")]
    AcceptedQueued { request_id: String, queue_depth: usize },
    #[serde(rename = "persisted")]
    AcceptedSync { id: u64 },
    #[serde(rename = "dropped")]
    AcceptedDropped,
    #[serde(rename = "bad_input")]
    BadInput,
    #[serde(rename = "too_many_requests")]
    TooManyRequests { limit_type: &'static str, retry_after_ms: u64 },
    #[serde(rename = "service_unavailable")]
    ServiceUnavailable,
}

pub async fn ingest(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(body): Json<IngestBody>,
) -> impl IntoResponse {
    let sample = TelemetrySample {
        device_id: body.device_id,
        latitude: body.latitude,
        longitude: body.longitude,
        timestamp: body.timestamp,
    };

    let outcome = state.facade.submit(sample, &peer.ip().to_string()).await;

    let mut headers = HeaderMap::new();
    let (status, response) = match outcome {
        SubmitOutcome::Accepted { request_id, queue_depth } => {
            if let Ok(v) = HeaderValue::from_str(&request_id) {
                headers.insert("X-Request-ID", v);
            }
            (
                StatusCode::ACCEPTED,
                IngestResponse::AcceptedQueued { request_id, queue_depth },
            )
        }
        SubmitOutcome::AcceptedSync { persisted_id } => {
            (StatusCode::CREATED, IngestResponse::AcceptedSync { id: persisted_id })
        }
        SubmitOutcome::AcceptedDropped => (StatusCode::ACCEPTED, IngestResponse::AcceptedDropped),
        SubmitOutcome::Rejected { reason: RejectReason::Malformed, .. } => {
            (StatusCode::BAD_REQUEST, IngestResponse::BadInput)
        }
        SubmitOutcome::Rejected { reason: RejectReason::RateLimitedGlobal, retry_after_ms } => {
            warn!("rejected: global rate limit");
            (
                StatusCode::TOO_MANY_REQUESTS,
                IngestResponse::TooManyRequests {
                    limit_type: "GLOBAL",
                    retry_after_ms: retry_after_ms.unwrap_or(1000),
                },
            )
        }
        SubmitOutcome::Rejected { reason: RejectReason::RateLimitedAddress, retry_after_ms } => (
            StatusCode::TOO_MANY_REQUESTS,
            IngestResponse::TooManyRequests {
                limit_type: "ADDRESS",
                retry_after_ms: retry_after_ms.unwrap_or(1000),
            },
        ),
        SubmitOutcome::Rejected { reason: RejectReason::RateLimitedDevice, retry_after_ms } => (
            StatusCode::TOO_MANY_REQUESTS,
            IngestResponse::TooManyRequests {
                limit_type: "DEVICE",
                retry_after_ms: retry_after_ms.unwrap_or(1000),
            },
        ),
        SubmitOutcome::Rejected { reason: RejectReason::QueueFullReject, .. } => {
            warn!("rejected: queue full");
            (StatusCode::SERVICE_UNAVAILABLE, IngestResponse::ServiceUnavailable)
        }
        SubmitOutcome::Rejected { reason: RejectReason::StoreUnavailable, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, IngestResponse::ServiceUnavailable)
        }
    };

    (status, headers, Json(response))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match &state.queue {
        Some(queue) => {
            let snap = queue.snapshot(state.config.queue.enabled);
            if snap.current_size < snap.capacity {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
        None => StatusCode::OK,
    }
}

#[derive(Serialize)]
struct QueueStatusResponse {
    enabled: bool,
    current_size: usize,
    capacity: usize,
    worker_count: usize,
    total_enqueued: u64,
    total_processed: u64,
    total_overflow: u64,
    utilization_percent: f64,
}

pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    match &state.queue {
        Some(queue) => {
            let snap = queue.snapshot(state.config.queue.enabled);
            Json(QueueStatusResponse {
                enabled: snap.enabled,
                current_size: snap.current_size,
                capacity: snap.capacity,
                worker_count: snap.worker_count,
                total_enqueued: snap.total_enqueued,
                total_processed: snap.total_processed,
                total_overflow: snap.total_overflow,
                utilization_percent: snap.utilization_percent(),
            })
            .into_response()
        }
        None => Json(QueueStatusResponse {
            enabled: false,
            current_size: 0,
            capacity: 0,
            worker_count: 0,
            total_enqueued: 0,
            total_processed: 0,
            total_overflow: 0,
            utilization_percent: 0.0,
        })
        .into_response(),
    }
}

#[derive(Serialize)]
struct MetricsResponse {
    queue: QueueStatusResponse,
    ratelimit_address_cache_size: usize,
    ratelimit_address_burst_cache_size: usize,
    ratelimit_device_cache_size: usize,
    telemetry_device_count: usize,
    alert_count: usize,
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let queue = match &state.queue {
        Some(queue) => {
            let snap = queue.snapshot(state.config.queue.enabled);
            QueueStatusResponse {
                enabled: snap.enabled,
                current_size: snap.current_size,
                capacity: snap.capacity,
                worker_count: snap.worker_count,
                total_enqueued: snap.total_enqueued,
                total_processed: snap.total_processed,
                total_overflow: snap.total_overflow,
                utilization_percent: snap.utilization_percent(),
            }
        }
        None => QueueStatusResponse {
            enabled: false,
            current_size: 0,
            capacity: 0,
            worker_count: 0,
            total_enqueued: 0,
            total_processed: 0,
            total_overflow: 0,
            utilization_percent: 0.0,
        },
    };
    let (address_cache, address_burst_cache, device_cache) = state.rate_limiter.cache_sizes();

    Json(MetricsResponse {
        queue,
        ratelimit_address_cache_size: address_cache,
        ratelimit_address_burst_cache_size: address_burst_cache,
        ratelimit_device_cache_size: device_cache,
        telemetry_device_count: state.telemetry_store.device_count(),
        alert_count: state.alert_store.len(),
    })
}

#[derive(Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

impl From<PageParams> for PageRequest {
    fn from(p: PageParams) -> Self {
        let default = PageRequest::default();
        PageRequest {
            offset: p.offset,
            limit: p.limit.unwrap_or(default.limit),
        }
    }
}

pub async fn device_telemetry(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(page): Query<PageParams>,
) -> impl IntoResponse {
    Json(state.telemetry_store.list_for_device(&device_id, page.into()))
        .into_response()
}

pub async fn device_latest(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    match state.telemetry_store.latest_for_device(&device_id) {
        Some(sample) => Json(sample).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
pub struct AlertQueryParams {
    pub device_id: Option<String>,
    pub alert_type: Option<String>,
    pub severity: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

fn parse_alert_type(s: &str) -> Option<AlertType> {
    match s.to_ascii_uppercase().as_str() {
        "ANOMALY" => Some(AlertType::Anomaly),
        "GEOFENCE" => Some(AlertType::Geofence),
        "SPEED" => Some(AlertType::Speed),
        "SYSTEM" => Some(AlertType::System),
        _ => None,
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_ascii_uppercase().as_str() {
        "LOW" => Some(Severity::Low),
        "MEDIUM" => Some(Severity::Medium),
        "HIGH" => Some(Severity::High),
        "CRITICAL" => Some(Severity::Critical),
        _ => None,
    }
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertQueryParams>,
) -> impl IntoResponse {
    let page = PageRequest {
        offset: params.offset,
        limit: params.limit.unwrap_or_else(|| PageRequest::default().limit),
    };
    let page = state.alert_store.list(
        params.device_id.as_deref(),
        params.alert_type.as_deref().and_then(parse_alert_type),
        params.severity.as_deref().and_then(parse_severity),
        params.created_after,
        params.created_before,
        page,
    );
    Json(page)
}
