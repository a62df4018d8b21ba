//! Coordinate-anomaly processor: flags out-of-range and extreme-latitude fixes.

use crate::config::ProcessorConfig;
use crate::model::{AlertRequest, AlertType, PersistedSample};

pub fn evaluate(persisted: &PersistedSample, cfg: &ProcessorConfig) -> Vec<AlertRequest> {
    let s = &persisted.sample;

    if s.latitude.abs() > 90.0 || s.longitude.abs() > 180.0 {
        return vec![request(s, "Invalid coordinates detected")];
    }
    if s.latitude.abs() > cfg.anomaly_extreme_latitude {
        return vec![request(s, "Extreme location detected")];
    }
    Vec::new()
}

fn request(s: &crate::model::TelemetrySample, message: &str) -> AlertRequest {
    AlertRequest {
        device_id: s.device_id.clone(),
        alert_type: AlertType::Anomaly,
        message: message.to_string(),
        latitude: Some(s.latitude),
        longitude: Some(s.longitude),
        processor_name: "coordinate-anomaly".into(),
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TelemetrySample;
    use chrono::Utc;

    fn persisted(lat: f64, lon: f64) -> PersistedSample {
        PersistedSample {
            id: 1,
            sample: TelemetrySample {
                device_id: "d2".into(),
                latitude: lat,
                longitude: lon,
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn invalid_latitude_is_high() {
        let alerts = evaluate(&persisted(95.0, -74.0), &ProcessorConfig::default());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Invalid coordinates"));
    }

    #[test]
    fn invalid_longitude_is_high() {
        let alerts = evaluate(&persisted(10.0, 181.0), &ProcessorConfig::default());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Invalid coordinates"));
    }

    #[test]
    fn extreme_but_valid_latitude_is_low() {
        let alerts = evaluate(&persisted(85.0, -74.0), &ProcessorConfig::default());
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Extreme location"));
    }

    #[test]
    fn ordinary_sample_emits_nothing() {
        let alerts = evaluate(&persisted(40.0, -74.0), &ProcessorConfig::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn boundary_at_exactly_extreme_latitude_does_not_alert() {
        let cfg = ProcessorConfig::default();
        let alerts = evaluate(&persisted(cfg.anomaly_extreme_latitude, -74.0), &cfg);
        assert!(alerts.is_empty());
    }
}
