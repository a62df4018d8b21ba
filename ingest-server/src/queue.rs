//! Ingest Queue: bounded FIFO of envelopes with non-blocking `offer` and
//! timeout-bounded `poll`, plus the atomic counters the worker pool and
//! the `/v1/queue` status endpoint read.
//!
//! Backed by `tokio::sync::mpsc`'s bounded channel, with enqueued/
//! processed/overflow accounting layered on top.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::model::Envelope;

pub struct QueueMetrics {
    pub enqueued: AtomicU64,
    pub processed: AtomicU64,
    pub overflow: AtomicU64,
    depth: AtomicUsize,
}

impl QueueMetrics {
    fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
            depth: AtomicUsize::new(0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct QueueSnapshot {
    pub enabled: bool,
    pub current_size: usize,
    pub capacity: usize,
    pub worker_count: usize,
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_overflow: u64,
}

impl QueueSnapshot {
    pub fn utilization_percent(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            100.0 * self.current_size as f64 / self.capacity as f64
        }
    }
}

/// The bounded FIFO plus its receiver half, which `worker::WorkerPool` owns.
pub struct IngestQueue {
    sender: mpsc::Sender<Envelope>,
    capacity: usize,
    worker_count: usize,
    metrics: Arc<QueueMetrics>,
}

impl IngestQueue {
    /// Builds the queue and its paired receiver. The receiver is handed to
    /// the worker pool at startup; there is exactly one consumer side.
    pub fn new(capacity: usize, worker_count: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let metrics = Arc::new(QueueMetrics::new());
        (
            Self {
                sender,
                capacity,
                worker_count,
                metrics,
            },
            receiver,
        )
    }

    pub fn metrics(&self) -> Arc<QueueMetrics> {
        self.metrics.clone()
    }

    /// Non-blocking enqueue. Returns `true` on success, `false` if the
    /// queue is at capacity.
    pub fn offer(&self, envelope: Envelope) -> bool {
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                self.metrics.depth.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.metrics.overflow.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn snapshot(&self, enabled: bool) -> QueueSnapshot {
        QueueSnapshot {
            enabled,
            current_size: self.metrics.depth.load(Ordering::Relaxed),
            capacity: self.capacity,
            worker_count: self.worker_count,
            total_enqueued: self.metrics.enqueued.load(Ordering::Relaxed),
            total_processed: self.metrics.processed.load(Ordering::Relaxed),
            total_overflow: self.metrics.overflow.load(Ordering::Relaxed),
        }
    }
}

/// Blocks up to `timeout` waiting on the receiver; used by each worker's
/// poll loop so shutdown signals are checked at a bounded cadence rather
/// than an unbounded `recv().await`.
pub async fn poll(receiver: &mut mpsc::Receiver<Envelope>, timeout: Duration) -> Option<Envelope> {
    tokio::time::timeout(timeout, receiver.recv()).await.ok().flatten()
}

pub fn record_processed(metrics: &QueueMetrics) {
    metrics.processed.fetch_add(1, Ordering::Relaxed);
    metrics.depth.fetch_sub(1, Ordering::Relaxed);
}
