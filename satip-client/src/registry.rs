//! Ordered set of server records: lookup, activation, staleness
//! cleanup, and formatted listing (C3).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::server::ServerRecord;

/// Thread-safe, clonable handle over the ordered server catalogue.
///
/// Mirrors the teacher's `SessionManager` handle pattern
/// (`Arc<RwLock<..>>` behind a `Clone`-able wrapper) rather than
/// exposing the lock directly.
#[derive(Clone, Default)]
pub struct ServerRegistry {
    inner: Arc<RwLock<Vec<Arc<ServerRecord>>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` unless a record with the same identity tuple
    /// already exists, in which case refresh its last-seen timestamp
    /// and return the existing one.
    pub fn insert(&self, record: ServerRecord) -> Arc<ServerRecord> {
        let mut records = self.inner.write();
        if let Some(existing) = records
            .iter()
            .find(|r| r.identity() == record.identity())
        {
            existing.touch();
            tracing::debug!(address = %existing.address(), "server record refreshed");
            return existing.clone();
        }
        let record = Arc::new(record);
        tracing::info!(address = %record.address(), description = %record.description(), "server record added");
        records.push(record.clone());
        record
    }

    /// First active record matching `identity`.
    pub fn find(&self, identity: &(String, String, String)) -> Option<Arc<ServerRecord>> {
        self.inner
            .read()
            .iter()
            .find(|r| r.is_active() && &r.identity() == identity)
            .cloned()
    }

    /// Probe records in registry order and allocate a frontend slot on
    /// the first active match for `(source, system)`. `transponder` is
    /// accepted for API symmetry with the original contract but does
    /// not affect frontend-kind selection (that is purely a function of
    /// `source`/`system`, per §4.2).
    pub fn assign(
        &self,
        device_id: u32,
        source: &str,
        _transponder: u32,
        system: u8,
    ) -> Option<Arc<ServerRecord>> {
        for record in self.inner.read().iter() {
            if record.is_active() && record.assign(device_id, source, system) {
                return Some(record.clone());
            }
        }
        None
    }

    /// Refresh last-seen for a previously inserted record.
    pub fn update(&self, record: &Arc<ServerRecord>) {
        record.touch();
    }

    pub fn activate(&self, record: &Arc<ServerRecord>, active: bool) {
        record.set_active(active);
    }

    pub fn attach(&self, record: &Arc<ServerRecord>, device_id: u32) -> bool {
        record.attach(device_id)
    }

    pub fn detach(&self, record: &Arc<ServerRecord>, device_id: u32) -> bool {
        record.detach(device_id)
    }

    /// Remove records whose last-seen age exceeds `interval`. An
    /// interval of zero removes every record.
    pub fn cleanup(&self, interval: Duration) -> usize {
        let mut records = self.inner.write();
        let before = records.len();
        if interval.is_zero() {
            records.clear();
        } else {
            let now = Instant::now();
            records.retain(|r| now.duration_since(r.last_seen()) <= interval);
        }
        let removed = before - records.len();
        if removed > 0 {
            tracing::info!(removed, "stale server records cleaned up");
        }
        removed
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Formatted listing: one line per record in registry order,
    /// `"<+/-> [srcAddr@]address|model|description"`.
    pub fn format(&self) -> String {
        self.inner
            .read()
            .iter()
            .map(|r| {
                let marker = if r.is_active() { '+' } else { '-' };
                format!("{marker} {}", r.identity_string())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, model: &str, description: &str) -> ServerRecord {
        ServerRecord::new(
            None,
            address.to_string(),
            554,
            model,
            "",
            description.to_string(),
            false,
        )
    }

    #[test]
    fn insert_dedups_by_identity() {
        let reg = ServerRegistry::new();
        reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn find_returns_active_match_only() {
        let reg = ServerRegistry::new();
        let r = reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        assert!(reg.find(&r.identity()).is_some());
        reg.activate(&r, false);
        assert!(reg.find(&r.identity()).is_none());
    }

    #[test]
    fn assign_probes_in_insertion_order() {
        let reg = ServerRegistry::new();
        reg.insert(record("10.0.0.1", "DVBT-1", "first"));
        reg.insert(record("10.0.0.2", "DVBS2-1", "second"));
        let chosen = reg.assign(1, "S19.2E", 0, 0).expect("should allocate");
        assert_eq!(chosen.address(), "10.0.0.2");
    }

    #[test]
    fn cleanup_zero_removes_all() {
        let reg = ServerRegistry::new();
        reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        reg.insert(record("10.0.0.2", "DVBS2-1", "b"));
        assert_eq!(reg.cleanup(Duration::ZERO), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn format_marks_active_and_inactive() {
        let reg = ServerRegistry::new();
        let r = reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        reg.activate(&r, false);
        assert_eq!(reg.format(), "- 10.0.0.1|DVBS2-1|a");
    }

    #[test]
    fn listing_round_trip_matches_find() {
        let reg = ServerRegistry::new();
        let r = reg.insert(record("10.0.0.1", "DVBS2-1", "a"));
        assert!(r.matches("S19.2E"));
        assert!(reg.find(&r.identity()).is_some());
    }
}
