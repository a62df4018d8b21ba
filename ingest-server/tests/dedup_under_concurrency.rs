//! Integration coverage for two concurrency properties: alert dedup under
//! concurrent identical requests, and the full ingest path producing a
//! persisted telemetry row per submission and exactly one alert per
//! admitted duplicate submission.

use std::sync::Arc;

use ingest_server::alert_engine::AlertEngine;
use ingest_server::config::Config;
use ingest_server::facade::IngestFacade;
use ingest_server::fanout::Fanout;
use ingest_server::model::TelemetrySample;
use ingest_server::queue::IngestQueue;
use ingest_server::ratelimit::RateLimiter;
use ingest_server::store::{AlertStore, TelemetryStore};
use ingest_server::worker::{ShutdownMode, WorkerPool};

fn sample(device_id: &str, lat: f64, lon: f64) -> TelemetrySample {
    TelemetrySample {
        device_id: device_id.into(),
        latitude: lat,
        longitude: lon,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn concurrent_identical_alert_creates_collapse_to_one_record() {
    let alerts = Arc::new(AlertStore::new());
    let engine = Arc::new(AlertEngine::new(alerts.clone()));

    let request = ingest_server::model::AlertRequest {
        device_id: "d4".into(),
        alert_type: ingest_server::model::AlertType::Anomaly,
        message: "Invalid coordinates detected".into(),
        latitude: Some(95.0),
        longitude: Some(-74.0),
        processor_name: "coordinate-anomaly".into(),
        metadata: None,
    };

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move { engine.create_alert(request).await.unwrap() }));
    }

    let mut ids = std::collections::HashSet::new();
    for h in handles {
        ids.insert(h.await.unwrap().id);
    }

    assert_eq!(ids.len(), 1, "all concurrent creates with the same fingerprint must collapse");
    assert_eq!(alerts.len(), 1);

    let expected_fingerprint = AlertEngine::fingerprint(&request);
    assert_eq!(alerts.find_by_fingerprint(&expected_fingerprint).unwrap().severity, ingest_server::model::Severity::High);
}

#[tokio::test]
async fn admitted_duplicate_submissions_produce_one_persisted_row_each_and_one_alert() {
    let mut config = Config::default();
    config.queue.capacity = 1000;
    config.queue.workers = 4;
    let config = Arc::new(config);

    let rate_limiter = Arc::new(RateLimiter::new(config.ratelimit.clone()));
    let telemetry = Arc::new(TelemetryStore::new());
    let alerts = Arc::new(AlertStore::new());
    let engine = Arc::new(AlertEngine::new(alerts.clone()));
    let fanout = Arc::new(Fanout::new(Arc::new(config.processors.clone()), telemetry.clone(), engine));

    let (queue, receiver) = IngestQueue::new(config.queue.capacity, config.queue.workers);
    let queue = Arc::new(queue);
    let pool = WorkerPool::spawn(config.queue.workers, receiver, queue.metrics(), telemetry.clone(), fanout.clone());

    let facade = IngestFacade::new(config, rate_limiter, Some(queue), telemetry.clone(), fanout);

    // Two identical submissions: distinct telemetry rows (save is not
    // required to be idempotent), but the resulting ANOMALY alert (same
    // fingerprint) must collapse to exactly one record.
    for _ in 0..2 {
        let outcome = facade.submit(sample("d4", 95.0, -74.0), "9.9.9.9").await;
        assert!(matches!(outcome, ingest_server::facade::SubmitOutcome::Accepted { .. }));
    }

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let page = telemetry.list_for_device("d4", ingest_server::store::PageRequest::default());
    assert_eq!(page.items.len(), 2, "both duplicate samples are persisted as distinct rows");
    assert_eq!(alerts.len(), 1, "both samples fingerprint to the same alert, which dedups to one record");

    pool.shutdown(ShutdownMode::Immediate).await;
}
