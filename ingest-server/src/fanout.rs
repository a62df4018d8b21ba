//! Processor Fan-out: dispatches one persisted sample to every registered
//! processor independently, isolating each processor's failure from its
//! peers and from the caller.
//!
//! The processor registry (`crate::processors::registry`) is an explicit
//! `(name, function)` list rather than an event-bus-plus-listeners
//! approach, so the fan-out graph is statically inspectable rather than
//! discovered via reflection.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::warn;

use crate::alert_engine::AlertEngine;
use crate::config::ProcessorConfig;
use crate::model::PersistedSample;
use crate::processors::{self, Processor};
use crate::store::TelemetryStore;

pub struct Fanout {
    processors: Vec<Processor>,
    config: Arc<ProcessorConfig>,
    store: Arc<TelemetryStore>,
    alert_engine: Arc<AlertEngine>,
}

impl Fanout {
    pub fn new(config: Arc<ProcessorConfig>, store: Arc<TelemetryStore>, alert_engine: Arc<AlertEngine>) -> Self {
        Self {
            processors: processors::registry(),
            config,
            store,
            alert_engine,
        }
    }

    /// Schedules one task per processor and returns immediately; fan-out
    /// does not queue or wait for a slow processor. The returned handles
    /// are for callers (tests, graceful shutdown) that want to know when
    /// the last invocation has actually finished — the worker loop that
    /// normally calls this does not await them.
    pub fn dispatch(&self, persisted: PersistedSample) -> Vec<tokio::task::JoinHandle<()>> {
        self.processors
            .iter()
            .map(|processor| {
                let name = processor.name;
                let run = processor.run.clone();
                let config = self.config.clone();
                let store = self.store.clone();
                let alert_engine = self.alert_engine.clone();
                let sample = persisted.clone();

                tokio::spawn(async move {
                    let requests = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                        run(&sample, &config, &store)
                    })) {
                        Ok(requests) => requests,
                        Err(_) => {
                            warn!(
                                device_id = %sample.sample.device_id,
                                processor_name = name,
                                "processor panicked; isolated from peers"
                            );
                            return;
                        }
                    };

                    for request in requests {
                        if let Err(err) = alert_engine.create_alert(request).await {
                            warn!(
                                device_id = %sample.sample.device_id,
                                processor_name = name,
                                error = %err,
                                "alert create failed; processor continues"
                            );
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TelemetrySample;
    use crate::store::AlertStore;
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

    #[tokio::test]
    async fn dispatch_runs_all_four_processors_and_persists_alerts() {
        let telemetry = Arc::new(TelemetryStore::new());
        let alerts = Arc::new(AlertStore::new());
        let engine = Arc::new(AlertEngine::new(alerts.clone()));
        let fanout = Fanout::new(Arc::new(ProcessorConfig::default()), telemetry, engine);

        let handles = fanout.dispatch(persisted(95.0, -74.0));
        assert_eq!(handles.len(), 4);
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_on_ordinary_sample_produces_no_alerts() {
        let telemetry = Arc::new(TelemetryStore::new());
        let alerts = Arc::new(AlertStore::new());
        let engine = Arc::new(AlertEngine::new(alerts.clone()));
        let fanout = Fanout::new(Arc::new(ProcessorConfig::default()), telemetry, engine);

        for h in fanout.dispatch(persisted(10.0, 10.0)) {
            h.await.unwrap();
        }
        assert!(alerts.is_empty());
    }
}
