//! Speed-statistics processor.
//!
//! Looks up the most recent prior sample for the device by timestamp (not
//! arrival order — `TelemetryStore::prior_before` already orders by
//! `(timestamp, id)`), derives a great-circle speed via the Haversine
//! formula, and alerts above threshold. Emits nothing when no prior sample
//! exists, since a single point implies no movement.

use crate::config::ProcessorConfig;
use crate::model::{AlertRequest, AlertType, PersistedSample};
use crate::store::TelemetryStore;

const EARTH_RADIUS_KM: f64 = 6371.0;
const SPEED_CAP_KMH: f64 = 500.0;

/// Great-circle distance between two lat/lon points, in kilometers.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

pub fn evaluate(
    persisted: &PersistedSample,
    cfg: &ProcessorConfig,
    store: &TelemetryStore,
) -> Vec<AlertRequest> {
    let s = &persisted.sample;

    let Some(prior) = store.prior_before(&s.device_id, s.timestamp) else {
        return Vec::new();
    };

    let distance_km = haversine_km(
        prior.sample.latitude,
        prior.sample.longitude,
        s.latitude,
        s.longitude,
    );
    let interval_hours = (s.timestamp - prior.sample.timestamp)
        .num_milliseconds()
        .max(0) as f64
        / 3_600_000.0;
    let floor_hours = cfg.speed_min_interval_seconds / 3600.0;
    let speed_kmh = (distance_km / interval_hours.max(floor_hours)).min(SPEED_CAP_KMH);

    if speed_kmh > cfg.speed_threshold_kmh {
        vec![AlertRequest {
            device_id: s.device_id.clone(),
            alert_type: AlertType::Speed,
            message: format!("Excessive speed detected: {speed_kmh:.1} km/h"),
            latitude: Some(s.latitude),
            longitude: Some(s.longitude),
            processor_name: "speed".into(),
            metadata: None,
        }]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TelemetrySample;
    use chrono::{DateTime, Utc};

    fn sample(device: &str, lat: f64, lon: f64, ts_secs: i64) -> TelemetrySample {
        TelemetrySample {
            device_id: device.into(),
            latitude: lat,
            longitude: lon,
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn no_prior_sample_emits_nothing() {
        let store = TelemetryStore::new();
        let persisted = PersistedSample {
            id: 1,
            sample: sample("d1", 40.0, -74.0, 1000),
        };
        assert!(evaluate(&persisted, &ProcessorConfig::default(), &store).is_empty());
    }

    #[test]
    fn plausible_speed_emits_nothing() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 40.0, -74.0, 0));
        let persisted = PersistedSample {
            id: 2,
            sample: sample("d1", 40.001, -74.0, 60),
        };
        let alerts = evaluate(&persisted, &ProcessorConfig::default(), &store);
        assert!(alerts.is_empty());
    }

    #[test]
    fn implausible_speed_alerts_high() {
        let store = TelemetryStore::new();
        // ~1 degree of latitude is roughly 111km; over 60s that is far past 150km/h.
        store.save(sample("d1", 40.0, -74.0, 0));
        let persisted = PersistedSample {
            id: 2,
            sample: sample("d1", 41.0, -74.0, 60),
        };
        let alerts = evaluate(&persisted, &ProcessorConfig::default(), &store);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Excessive speed"));
    }

    #[test]
    fn short_interval_uses_floor_denominator() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 40.0, -74.0, 0));
        // 1 second interval, tiny movement: without the 30s floor this would
        // report an absurd speed; with the floor it should stay plausible.
        let persisted = PersistedSample {
            id: 2,
            sample: sample("d1", 40.0001, -74.0, 1),
        };
        let alerts = evaluate(&persisted, &ProcessorConfig::default(), &store);
        assert!(alerts.is_empty());
    }

    #[test]
    fn speed_is_capped_at_500_kmh() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 0.0, 0.0, 0));
        // Far enough apart to exceed the cap before clamping.
        let persisted = PersistedSample {
            id: 2,
            sample: sample("d1", 80.0, 0.0, 60),
        };
        let cfg = ProcessorConfig::default();
        let distance = haversine_km(0.0, 0.0, 80.0, 0.0);
        let uncapped = distance / (60.0 / 3600.0);
        assert!(uncapped > SPEED_CAP_KMH);
        let alerts = evaluate(&persisted, &cfg, &store);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("500.0"));
    }

    #[test]
    fn threshold_comparison_is_strictly_greater_than() {
        // speed_kmh == threshold exactly must not alert; the tiniest bit over must.
        let cfg = ProcessorConfig::default();
        assert!(!(cfg.speed_threshold_kmh > cfg.speed_threshold_kmh));
        assert!((cfg.speed_threshold_kmh + 0.01) > cfg.speed_threshold_kmh);
    }
}
