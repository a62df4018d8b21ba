//! Core data model: the telemetry sample, its ingest envelope, and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One telemetry reading from one device at one instant.
///
/// Fields are required and validated at the facade boundary; once built,
/// a sample is immutable and flows by value from facade -> queue -> worker
/// -> processors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    /// Structural validation: non-empty id, finite coordinates. Range
    /// validation (e.g. |lat| > 90) is the anomaly processor's job, not
    /// a rejection reason here.
    pub fn is_structurally_valid(&self) -> bool {
        !self.device_id.trim().is_empty()
            && self.latitude.is_finite()
            && self.longitude.is_finite()
    }
}

/// A sample plus ingest-side metadata, owned by the queue until dequeued.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub sample: TelemetrySample,
    pub request_id: String,
    pub queued_at: DateTime<Utc>,
}

/// A persisted telemetry row, as returned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSample {
    pub id: u64,
    pub sample: TelemetrySample,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    Anomaly,
    Geofence,
    Speed,
    System,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Anomaly => "ANOMALY",
            AlertType::Geofence => "GEOFENCE",
            AlertType::Speed => "SPEED",
            AlertType::System => "SYSTEM",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Request to create an alert, as handed to the Alert Engine by a processor.
#[derive(Clone, Debug)]
pub struct AlertRequest {
    pub device_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub processor_name: String,
    pub metadata: Option<String>,
}

/// A persisted alert. Never updated after creation; deleted only by the
/// retention purge job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub device_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub processor_name: String,
    pub fingerprint: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}
