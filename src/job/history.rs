// Bounded per-device outcome history

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::{JobResult, JobStatus};

/// Default number of outcomes retained per device
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// One completed (or skipped) run for a device
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn success(job_id: impl Into<String>, result: JobResult) -> Self {
        HistoryEntry {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            status: JobStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        HistoryEntry {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            status: JobStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn skipped(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        HistoryEntry {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            status: JobStatus::Skipped,
            result: None,
            error: Some(reason.into()),
        }
    }
}

/// Most-recent-first ring of outcomes per device. In-memory only; nothing
/// survives a restart.
pub struct HistoryStore {
    entries: DashMap<String, Vec<HistoryEntry>>,
    cap: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        HistoryStore {
            entries: DashMap::new(),
            cap: DEFAULT_HISTORY_CAP,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// Insert at the front, dropping the oldest entry past the cap.
    pub fn append(&self, device_id: &str, entry: HistoryEntry) {
        let mut list = self.entries.entry(device_id.to_string()).or_default();
        list.insert(0, entry);
        list.truncate(self.cap);
    }

    /// Most-recent-first outcomes for a device; empty if none recorded.
    pub fn get(&self, device_id: &str) -> Vec<HistoryEntry> {
        self.entries
            .get(device_id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_drops_oldest_entries() {
        let store = HistoryStore::new();

        for i in 0..21 {
            store.append("sw1", HistoryEntry::failed(format!("job{}", i), "boom"));
        }

        let entries = store.get("sw1");
        assert_eq!(entries.len(), 20);
        // Most recent first; the oldest (job0) fell off
        assert_eq!(entries[0].job_id, "job20");
        assert_eq!(entries[19].job_id, "job1");
        assert!(!entries.iter().any(|e| e.job_id == "job0"));
    }

    #[test]
    fn test_get_unknown_device_is_empty() {
        let store = HistoryStore::new();
        assert!(store.get("never-seen").is_empty());
    }

    #[test]
    fn test_devices_have_independent_histories() {
        let store = HistoryStore::new();
        store.append("sw1", HistoryEntry::failed("a", "x"));
        store.append("sw2", HistoryEntry::failed("b", "y"));

        assert_eq!(store.get("sw1").len(), 1);
        assert_eq!(store.get("sw2").len(), 1);
        assert_eq!(store.get("sw1")[0].job_id, "a");
    }
}
