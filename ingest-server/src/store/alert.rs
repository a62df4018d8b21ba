//! Alert Store — persistence with a unique fingerprint constraint, range
//! queries, and retention purge.
//!
//! The fingerprint uniqueness constraint is the cross-instance
//! correctness backstop: `insert_if_absent` uses `DashMap`'s entry API
//! so the check-then-insert is atomic even under concurrent callers,
//! without the Alert Engine's own lock (see `alert_engine.rs`) being the
//! only thing standing between two racing creates.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::{Alert, AlertType, Severity};

use super::{Page, PageRequest};

pub struct AlertStore {
    next_id: AtomicU64,
    by_fingerprint: DashMap<String, Alert>,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_fingerprint: DashMap::new(),
        }
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<Alert> {
        self.by_fingerprint.get(fingerprint).map(|a| a.clone())
    }

    /// Atomically inserts the alert built by `build` if no record with this
    /// fingerprint exists yet. `build` receives the store-assigned id.
    /// Returns `Ok(new)` if this call won the race, `Err(existing)` if a
    /// concurrent call (or this engine's own lock-protected lookup, racing
    /// with a *different* engine instance) already holds the fingerprint.
    pub fn insert_if_absent(
        &self,
        fingerprint: &str,
        build: impl FnOnce(u64) -> Alert,
    ) -> Result<Alert, Alert> {
        match self.by_fingerprint.entry(fingerprint.to_string()) {
            Entry::Occupied(e) => Err(e.get().clone()),
            Entry::Vacant(e) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let alert = build(id);
                e.insert(alert.clone());
                Ok(alert)
            }
        }
    }

    pub fn list(
        &self,
        device_id: Option<&str>,
        alert_type: Option<AlertType>,
        severity: Option<Severity>,
        created_after: Option<DateTime<Utc>>,
        created_before: Option<DateTime<Utc>>,
        page: PageRequest,
    ) -> Page<Alert> {
        let mut matching: Vec<Alert> = self
            .by_fingerprint
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| device_id.map_or(true, |d| a.device_id == d))
            .filter(|a| alert_type.map_or(true, |t| a.alert_type == t))
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .filter(|a| created_after.map_or(true, |t| a.created_at >= t))
            .filter(|a| created_before.map_or(true, |t| a.created_at <= t))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let end = (page.offset + page.limit).min(matching.len());
        let items = if page.offset >= matching.len() {
            Vec::new()
        } else {
            matching[page.offset..end].to_vec()
        };
        Page {
            has_more: end < matching.len(),
            items,
        }
    }

    /// Deletes alerts older than `horizon`. Advisory: if never called,
    /// correctness is unaffected, only storage growth.
    pub fn purge_older_than(&self, horizon: DateTime<Utc>) -> usize {
        let before = self.by_fingerprint.len();
        self.by_fingerprint.retain(|_, a| a.created_at >= horizon);
        before.saturating_sub(self.by_fingerprint.len())
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}
