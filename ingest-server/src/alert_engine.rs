//! Alert Engine: fingerprint-based dedup, severity classification,
//! at-most-once alert creation.
//!
//! The lookup-then-insert pair is wrapped in a single mutual-exclusion
//! region per engine instance. `AlertStore::insert_if_absent`'s own
//! atomicity is the cross-instance correctness backstop; this lock is a
//! local optimization that avoids unique-constraint-violation churn when
//! many tasks in this process race to create the same fingerprint.
//!
//! The lock is acquired with a timeout (`try_lock_for`) rather than an
//! unbounded `lock()`: under heavy contention that timeout can genuinely
//! expire, which is the one realistic transient store failure this
//! in-memory implementation can produce, and is what the three-attempt
//! randomized-backoff retry below exists to absorb.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;

use crate::error::IngestError;
use crate::model::{Alert, AlertRequest, AlertType, Severity};
use crate::store::AlertStore;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(50);
const LOCK_TIMEOUT: Duration = Duration::from_millis(25);

/// Delay before retry attempt `attempt` (1-indexed): base backoff doubled
/// per attempt, plus up to 25% jitter so concurrent retriers don't
/// thunder-herd back onto the same lock at once.
pub fn backoff_duration(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF * 2u32.pow(attempt.saturating_sub(1));
    let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.25);
    exp.mul_f64(1.0 + jitter_frac)
}

pub struct AlertEngine {
    store: Arc<AlertStore>,
    lock: Mutex<()>,
}

impl AlertEngine {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// `hex(md5(deviceId || ":" || alertType || ":" || lat_or_"null" || ":" || lon_or_"null"))`.
    /// The message is deliberately excluded so alerts from the same sensor
    /// situation collapse to one record regardless of message wording.
    pub fn fingerprint(req: &AlertRequest) -> String {
        let lat = req.latitude.map(|v| v.to_string()).unwrap_or_else(|| "null".into());
        let lon = req.longitude.map(|v| v.to_string()).unwrap_or_else(|| "null".into());
        let input = format!("{}:{}:{}:{}", req.device_id, req.alert_type.as_str(), lat, lon);
        format!("{:x}", md5::compute(input.as_bytes()))
    }

    /// Pure function of `(alertType, message)`.
    pub fn derive_severity(alert_type: AlertType, message: &str) -> Severity {
        let lower = message.to_ascii_lowercase();
        match alert_type {
            AlertType::Anomaly => {
                if message.contains("Invalid coordinates") {
                    Severity::High
                } else if message.contains("Extreme location") {
                    Severity::Low
                } else if lower.contains("suspicious") {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            }
            AlertType::Geofence => {
                if lower.contains("restricted") || lower.contains("forbidden") {
                    if lower.contains("forbidden") {
                        Severity::Critical
                    } else {
                        Severity::Medium
                    }
                } else {
                    Severity::Medium
                }
            }
            AlertType::Speed => {
                if lower.contains("excessive") || lower.contains("dangerous") {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
            AlertType::System => {
                if lower.contains("error") || lower.contains("failure") {
                    Severity::High
                } else {
                    Severity::Low
                }
            }
        }
    }

    /// At-most-once create: the same fingerprint always resolves to one
    /// stored record, even under concurrent callers. Retries the
    /// lock-acquisition/critical-section pass up to `MAX_ATTEMPTS` times
    /// with randomized backoff on lock-timeout contention; a persistent
    /// failure surfaces as `AlertCreateFailed`, which callers (processors)
    /// must log and swallow rather than propagate.
    pub async fn create_alert(&self, req: AlertRequest) -> Result<Alert, IngestError> {
        let fingerprint = Self::fingerprint(&req);

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(guard) = self.lock.try_lock_for(LOCK_TIMEOUT) else {
                if attempt == MAX_ATTEMPTS {
                    return Err(IngestError::AlertCreateFailed(format!(
                        "could not acquire dedup lock after {attempt} attempts"
                    )));
                }
                tokio::time::sleep(backoff_duration(attempt)).await;
                continue;
            };

            if let Some(existing) = self.store.find_by_fingerprint(&fingerprint) {
                drop(guard);
                return Ok(existing);
            }

            let severity = Self::derive_severity(req.alert_type, &req.message);
            let req_for_build = req.clone();
            let fp_for_build = fingerprint.clone();
            let result = self.store.insert_if_absent(&fingerprint, move |id| Alert {
                id,
                device_id: req_for_build.device_id,
                alert_type: req_for_build.alert_type,
                severity,
                message: req_for_build.message,
                latitude: req_for_build.latitude,
                longitude: req_for_build.longitude,
                processor_name: req_for_build.processor_name,
                fingerprint: fp_for_build,
                metadata: req_for_build.metadata,
                created_at: Utc::now(),
            });
            drop(guard);

            return match result {
                Ok(alert) => Ok(alert),
                Err(winner) => Ok(winner),
            };
        }

        unreachable!("loop always returns within MAX_ATTEMPTS iterations")
    }
}
