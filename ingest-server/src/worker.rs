//! Worker pool: fixed-size pool draining the ingest queue, persisting
//! each envelope via the Telemetry Store, then handing the persisted
//! sample to Processor Fan-out.
//!
//! Workers share one receiver behind a `tokio::sync::Mutex`, the
//! standard pattern for fanning a single mpsc consumer out across
//! multiple tasks when the pool size is configurable and more than one
//! task must take turns on the same channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{info, warn};

use crate::fanout::Fanout;
use crate::model::Envelope;
use crate::queue::{self, QueueMetrics};
use crate::store::TelemetryStore;

const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const GRACEFUL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const IMMEDIATE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownMode {
    Graceful,
    Immediate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Running,
    Graceful,
    Immediate,
}

pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<Signal>,
}

impl WorkerPool {
    pub fn spawn(
        worker_count: usize,
        receiver: mpsc::Receiver<Envelope>,
        queue_metrics: Arc<QueueMetrics>,
        store: Arc<TelemetryStore>,
        fanout: Arc<Fanout>,
    ) -> Self {
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let (shutdown_tx, shutdown_rx) = watch::channel(Signal::Running);

        let handles = (0..worker_count.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    queue_metrics.clone(),
                    store.clone(),
                    fanout.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Self { handles, shutdown_tx }
    }

    /// Signals all workers and waits for them to exit. Graceful mode lets
    /// each worker keep draining for up to 5s; immediate mode gives them
    /// 100ms before the handles are abandoned.
    pub async fn shutdown(self, mode: ShutdownMode) {
        let signal = match mode {
            ShutdownMode::Graceful => Signal::Graceful,
            ShutdownMode::Immediate => Signal::Immediate,
        };
        let _ = self.shutdown_tx.send(signal);

        let budget = match mode {
            ShutdownMode::Graceful => GRACEFUL_DRAIN_TIMEOUT + Duration::from_secs(1),
            ShutdownMode::Immediate => IMMEDIATE_TIMEOUT * 2,
        };

        for handle in self.handles {
            if tokio::time::timeout(budget, handle).await.is_err() {
                warn!("worker did not exit within shutdown budget; abandoning");
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Envelope>>>,
    queue_metrics: Arc<QueueMetrics>,
    store: Arc<TelemetryStore>,
    fanout: Arc<Fanout>,
    mut shutdown_rx: watch::Receiver<Signal>,
) {
    let mut graceful_since: Option<Instant> = None;

    loop {
        let signal = *shutdown_rx.borrow();
        let poll_timeout = match signal {
            Signal::Immediate => IMMEDIATE_TIMEOUT,
            _ => POLL_TIMEOUT,
        };

        if signal == Signal::Immediate {
            info!(worker = id, "immediate shutdown; exiting");
            return;
        }
        if signal == Signal::Graceful {
            let since = *graceful_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= GRACEFUL_DRAIN_TIMEOUT {
                info!(worker = id, "graceful drain timeout elapsed; exiting");
                return;
            }
        }

        let envelope = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                envelope = queue::poll(&mut rx, poll_timeout) => envelope,
                _ = shutdown_rx.changed() => None,
            }
        };

        let Some(envelope) = envelope else {
            if signal == Signal::Graceful {
                info!(worker = id, "queue drained during graceful shutdown; exiting");
                return;
            }
            continue;
        };

        persist_and_dispatch(envelope, &queue_metrics, &store, &fanout).await;
    }
}

/// Persists one envelope then schedules fan-out. `TelemetryStore::save`
/// on this in-memory backend cannot fail, so the bounded-attempts
/// retry-then-give-up policy a fallible store would need has nothing to
/// exercise here; a durable backend implementing the same contract would
/// wrap this call with that retry instead of this direct call.
async fn persist_and_dispatch(
    envelope: Envelope,
    queue_metrics: &QueueMetrics,
    store: &TelemetryStore,
    fanout: &Fanout,
) {
    let persisted = store.save(envelope.sample);
    fanout.dispatch(persisted);
    queue::record_processed(queue_metrics);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_engine::AlertEngine;
    use crate::config::ProcessorConfig;
    use crate::queue::IngestQueue;
    use crate::store::AlertStore;
    use chrono::Utc;

    fn envelope(device_id: &str, lat: f64, lon: f64) -> Envelope {
        Envelope {
            sample: crate::model::TelemetrySample {
                device_id: device_id.into(),
                latitude: lat,
                longitude: lon,
                timestamp: Utc::now(),
            },
            request_id: "r1".into(),
            queued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drains_queue_and_persists_samples() {
        let (queue, rx) = IngestQueue::new(16, 2);
        let telemetry = Arc::new(TelemetryStore::new());
        let alerts = Arc::new(AlertStore::new());
        let engine = Arc::new(AlertEngine::new(alerts));
        let fanout = Arc::new(Fanout::new(Arc::new(ProcessorConfig::default()), telemetry.clone(), engine));

        queue.offer(envelope("d1", 10.0, 10.0));
        queue.offer(envelope("d2", 20.0, 20.0));

        let pool = WorkerPool::spawn(2, rx, queue.metrics(), telemetry.clone(), fanout);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(telemetry.device_count(), 2);

        pool.shutdown(ShutdownMode::Immediate).await;
    }

    #[tokio::test]
    async fn graceful_shutdown_drains_remaining_envelopes() {
        let (queue, rx) = IngestQueue::new(16, 1);
        let telemetry = Arc::new(TelemetryStore::new());
        let alerts = Arc::new(AlertStore::new());
        let engine = Arc::new(AlertEngine::new(alerts));
        let fanout = Arc::new(Fanout::new(Arc::new(ProcessorConfig::default()), telemetry.clone(), engine));

        for i in 0..5 {
            queue.offer(envelope(&format!("d{i}"), 1.0, 1.0));
        }

        let pool = WorkerPool::spawn(1, rx, queue.metrics(), telemetry.clone(), fanout);
        pool.shutdown(ShutdownMode::Graceful).await;

        assert_eq!(telemetry.device_count(), 5);
    }
}
