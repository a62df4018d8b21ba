//! Aggregation processor. Emits no alerts on its own; exists to preserve
//! the four-processor fan-out shape. Storage for any derived roll-up is
//! left open — the Telemetry Store's own per-device index already answers
//! "how many samples for this device" (`device_count`/`list_for_device`),
//! so there is nothing further to maintain here today.

use crate::model::PersistedSample;
use crate::store::TelemetryStore;

pub fn evaluate(_persisted: &PersistedSample, _store: &TelemetryStore) {}
