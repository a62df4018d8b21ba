//! Geofence processor: flags samples that fall inside a configured
//! restricted region.

use crate::config::ProcessorConfig;
use crate::model::{AlertRequest, AlertType, PersistedSample};

pub fn evaluate(persisted: &PersistedSample, cfg: &ProcessorConfig) -> Vec<AlertRequest> {
    let s = &persisted.sample;

    cfg.geofence_regions
        .iter()
        .find(|r| r.contains(s.latitude, s.longitude))
        .map(|region| {
            let message = if region.forbidden {
                "entered forbidden restricted area".to_string()
            } else {
                "entered restricted area".to_string()
            };
            vec![AlertRequest {
                device_id: s.device_id.clone(),
                alert_type: AlertType::Geofence,
                message,
                latitude: Some(s.latitude),
                longitude: Some(s.longitude),
                processor_name: "geofence".into(),
                metadata: None,
            }]
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoRegion;
    use crate::model::TelemetrySample;
    use chrono::Utc;

    fn persisted(lat: f64, lon: f64) -> PersistedSample {
        PersistedSample {
            id: 1,
            sample: TelemetrySample {
                device_id: "d1".into(),
                latitude: lat,
                longitude: lon,
                timestamp: Utc::now(),
            },
        }
    }

    fn cfg_with(regions: Vec<GeoRegion>) -> ProcessorConfig {
        let mut cfg = ProcessorConfig::default();
        cfg.geofence_regions = regions;
        cfg
    }

    #[test]
    fn no_regions_configured_emits_nothing() {
        let alerts = evaluate(&persisted(15.0, 15.0), &ProcessorConfig::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn inside_restricted_region_emits_medium() {
        let cfg = cfg_with(vec![GeoRegion {
            min_lat: 10.0,
            max_lat: 20.0,
            min_lon: 10.0,
            max_lon: 20.0,
            forbidden: false,
        }]);
        let alerts = evaluate(&persisted(15.0, 15.0), &cfg);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("restricted area"));
        assert!(!alerts[0].message.contains("forbidden"));
    }

    #[test]
    fn inside_forbidden_region_message_mentions_forbidden() {
        let cfg = cfg_with(vec![GeoRegion {
            min_lat: 10.0,
            max_lat: 20.0,
            min_lon: 10.0,
            max_lon: 20.0,
            forbidden: true,
        }]);
        let alerts = evaluate(&persisted(15.0, 15.0), &cfg);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("forbidden"));
    }

    #[test]
    fn outside_every_configured_region_emits_nothing() {
        let cfg = cfg_with(vec![GeoRegion {
            min_lat: 10.0,
            max_lat: 20.0,
            min_lon: 10.0,
            max_lon: 20.0,
            forbidden: false,
        }]);
        let alerts = evaluate(&persisted(50.0, 50.0), &cfg);
        assert!(alerts.is_empty());
    }
}
