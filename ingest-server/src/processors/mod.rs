//! Analytic processors. Each processor is a pure function of a persisted
//! sample (plus, for speed-statistics, historical context queried from
//! the Telemetry Store) that returns zero or more `AlertRequest`s.
//! Fan-out (`crate::fanout`) is what turns these requests into persisted
//! `Alert`s via the Alert Engine and isolates their failures from one
//! another.

pub mod aggregation;
pub mod coordinate_anomaly;
pub mod geofence;
pub mod speed;

use std::sync::Arc;

use crate::config::ProcessorConfig;
use crate::model::{AlertRequest, PersistedSample};
use crate::store::TelemetryStore;

/// Name + function pair. An explicit, statically inspectable registry in
/// place of reflective listener discovery.
pub type ProcessorFn =
    Arc<dyn Fn(&PersistedSample, &ProcessorConfig, &TelemetryStore) -> Vec<AlertRequest> + Send + Sync>;

pub struct Processor {
    pub name: &'static str,
    pub run: ProcessorFn,
}

/// The four analytic processors, in fan-out registration order. Order is
/// cosmetic: fan-out gives no ordering guarantee across processors.
pub fn registry() -> Vec<Processor> {
    vec![
        Processor {
            name: "coordinate-anomaly",
            run: Arc::new(|sample, cfg, _store| coordinate_anomaly::evaluate(sample, cfg)),
        },
        Processor {
            name: "geofence",
            run: Arc::new(|sample, cfg, _store| geofence::evaluate(sample, cfg)),
        },
        Processor {
            name: "speed",
            run: Arc::new(|sample, cfg, store| speed::evaluate(sample, cfg, store)),
        },
        Processor {
            name: "aggregation",
            run: Arc::new(|sample, _cfg, store| {
                aggregation::evaluate(sample, store);
                Vec::new()
            }),
        },
    ]
}
