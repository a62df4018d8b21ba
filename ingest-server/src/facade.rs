//! Ingest Facade: the one entry point the HTTP layer (or anything else)
//! calls to submit a sample. Orchestrates structural validation, rate
//! limiting with compensation, and enqueue-or-inline dispatch, kept as a
//! transport-independent function so the HTTP layer stays a thin adapter.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{Config, QueueFallback};
use crate::fanout::Fanout;
use crate::model::{Envelope, TelemetrySample};
use crate::queue::IngestQueue;
use crate::ratelimit::{DenialReason, RateLimiter};
use crate::store::TelemetryStore;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    Malformed,
    RateLimitedGlobal,
    RateLimitedAddress,
    RateLimitedDevice,
    QueueFullReject,
    StoreUnavailable,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted { request_id: String, queue_depth: usize },
    AcceptedSync { persisted_id: u64 },
    /// `queue.fallback = drop`: admitted but silently discarded.
    AcceptedDropped,
    Rejected { reason: RejectReason, retry_after_ms: Option<u64> },
}

pub struct IngestFacade {
    config: Arc<Config>,
    rate_limiter: Arc<RateLimiter>,
    queue: Option<Arc<IngestQueue>>,
    telemetry_store: Arc<TelemetryStore>,
    fanout: Arc<Fanout>,
}

impl IngestFacade {
    pub fn new(
        config: Arc<Config>,
        rate_limiter: Arc<RateLimiter>,
        queue: Option<Arc<IngestQueue>>,
        telemetry_store: Arc<TelemetryStore>,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            queue,
            telemetry_store,
            fanout,
        }
    }

    /// The facade's single operation. `client_address` need not be a real
    /// IP (load-test harnesses and tests may pass a synthetic key); it is
    /// only ever used as a rate-limit bucket key.
    pub async fn submit(&self, sample: TelemetrySample, client_address: &str) -> SubmitOutcome {
        if !sample.is_structurally_valid() {
            return SubmitOutcome::Rejected {
                reason: RejectReason::Malformed,
                retry_after_ms: None,
            };
        }

        if let Err(denial) = self.rate_limiter.try_consume_global() {
            return SubmitOutcome::Rejected {
                reason: RejectReason::RateLimitedGlobal,
                retry_after_ms: Some(denial.retry_after.as_millis() as u64),
            };
        }

        if let Err(denial) = self.rate_limiter.try_consume_address(client_address) {
            // Global token was already spent; admission accounting must
            // reflect admissions, not attempts.
            self.rate_limiter.return_global(1.0);
            return SubmitOutcome::Rejected {
                reason: RejectReason::RateLimitedAddress,
                retry_after_ms: Some(denial.retry_after.as_millis() as u64),
            };
        }

        if let Err(denial) = self.rate_limiter.try_consume_device(&sample.device_id) {
            self.rate_limiter.return_global(1.0);
            self.rate_limiter.return_address(client_address, 1.0);
            debug_assert_eq!(denial.reason, DenialReason::Device);
            return SubmitOutcome::Rejected {
                reason: RejectReason::RateLimitedDevice,
                retry_after_ms: Some(denial.retry_after.as_millis() as u64),
            };
        }

        let request_id = Uuid::new_v4().to_string();

        let Some(queue) = self.queue.as_ref().filter(|_| self.config.queue.enabled) else {
            return self.process_inline(sample);
        };

        let envelope = Envelope {
            sample: sample.clone(),
            request_id: request_id.clone(),
            queued_at: Utc::now(),
        };

        if queue.offer(envelope) {
            return SubmitOutcome::Accepted {
                request_id,
                queue_depth: queue.snapshot(true).current_size,
            };
        }

        match self.config.queue.fallback {
            QueueFallback::Sync => self.process_inline(sample),
            QueueFallback::Reject => SubmitOutcome::Rejected {
                reason: RejectReason::QueueFullReject,
                retry_after_ms: None,
            },
            // `offer` already recorded the overflow when it returned false.
            QueueFallback::Drop => SubmitOutcome::AcceptedDropped,
        }
    }

    /// Persist-then-dispatch inline, used when the queue is disabled or
    /// full under the `sync` fallback.
    fn process_inline(&self, sample: TelemetrySample) -> SubmitOutcome {
        let persisted = self.telemetry_store.save(sample);
        self.fanout.dispatch(persisted.clone());
        SubmitOutcome::AcceptedSync {
            persisted_id: persisted.id,
        }
    }
}

/// Best-effort normalization of a socket peer into the rate limiter's
/// address key; callers behind a proxy should prefer a forwarded-for
/// header if they trust it, which is an HTTP-layer (out of scope) concern.
pub fn address_key(ip: IpAddr) -> String {
    ip.to_string()
}
