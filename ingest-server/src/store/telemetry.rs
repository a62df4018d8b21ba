//! Telemetry Store — contract only.
//!
//! `save` is not required to be idempotent: duplicate samples produce
//! distinct ids. Retrieval is indexed by device and ordered by sample
//! timestamp (not arrival order), since the speed processor needs to
//! locate the prior sample by timestamp even when deliveries interleave
//! out of order.
//!
//! This in-memory implementation stands in for a relational layer;
//! swapping in a real database means reimplementing this same contract.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::{PersistedSample, TelemetrySample};

use super::{Page, PageRequest};

pub struct TelemetryStore {
    next_id: AtomicU64,
    by_device: DashMap<String, BTreeMap<(DateTime<Utc>, u64), PersistedSample>>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_device: DashMap::new(),
        }
    }

    pub fn save(&self, sample: TelemetrySample) -> PersistedSample {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let persisted = PersistedSample {
            id,
            sample: sample.clone(),
        };
        self.by_device
            .entry(sample.device_id.clone())
            .or_default()
            .insert((sample.timestamp, id), persisted.clone());
        persisted
    }

    pub fn latest_for_device(&self, device_id: &str) -> Option<PersistedSample> {
        self.by_device
            .get(device_id)
            .and_then(|m| m.values().next_back().cloned())
    }

    /// Most recent sample for `device_id` with `timestamp' < timestamp`.
    pub fn prior_before(
        &self,
        device_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<PersistedSample> {
        self.by_device.get(device_id).and_then(|m| {
            m.range(..(timestamp, 0))
                .next_back()
                .map(|(_, v)| v.clone())
        })
    }

    pub fn list_for_device(&self, device_id: &str, page: PageRequest) -> Page<PersistedSample> {
        let Some(entries) = self.by_device.get(device_id) else {
            return Page {
                items: Vec::new(),
                has_more: false,
            };
        };
        // Most-recent-first, matching how the queue/worker consider recency.
        let all: Vec<PersistedSample> = entries.values().rev().cloned().collect();
        let end = (page.offset + page.limit).min(all.len());
        let items = if page.offset >= all.len() {
            Vec::new()
        } else {
            all[page.offset..end].to_vec()
        };
        Page {
            has_more: end < all.len(),
            items,
        }
    }

    pub fn device_count(&self) -> usize {
        self.by_device.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(device: &str, ts_secs: i64) -> TelemetrySample {
        TelemetrySample {
            device_id: device.into(),
            latitude: 1.0,
            longitude: 1.0,
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn save_assigns_distinct_ids_to_duplicates() {
        let store = TelemetryStore::new();
        let s = sample("d1", 1000);
        let a = store.save(s.clone());
        let b = store.save(s);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn latest_for_device_tracks_highest_timestamp_not_arrival_order() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 2000));
        store.save(sample("d1", 1000)); // arrives second but is older
        let latest = store.latest_for_device("d1").unwrap();
        assert_eq!(latest.sample.timestamp, DateTime::from_timestamp(2000, 0).unwrap());
    }

    #[test]
    fn prior_before_uses_timestamp_not_arrival_order() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 1000));
        store.save(sample("d1", 3000));
        // Out-of-order arrival: a sample timestamped between the two above.
        store.save(sample("d1", 2000));

        let prior = store
            .prior_before("d1", DateTime::from_timestamp(3000, 0).unwrap())
            .unwrap();
        assert_eq!(prior.sample.timestamp, DateTime::from_timestamp(2000, 0).unwrap());
    }

    #[test]
    fn prior_before_returns_none_when_no_earlier_sample_exists() {
        let store = TelemetryStore::new();
        store.save(sample("d1", 5000));
        assert!(store
            .prior_before("d1", DateTime::from_timestamp(1000, 0).unwrap())
            .is_none());
    }

    #[test]
    fn list_for_device_paginates_most_recent_first() {
        let store = TelemetryStore::new();
        for t in 0..5 {
            store.save(sample("d1", t * 1000));
        }
        let page = store.list_for_device("d1", PageRequest { offset: 0, limit: 2 });
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.items[0].sample.timestamp, DateTime::from_timestamp(4000, 0).unwrap());
    }
}
