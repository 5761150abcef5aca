// Bounded append-only record of completed passes, persisted as one JSON
// document. Aggregate statistics are computed by scanning on read; at a cap
// of 100 entries there is nothing to maintain incrementally.

use crate::engine::{SyncMode, SyncStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassOutcome {
    Success,
    Partial,
    Failed,
}

impl PassOutcome {
    /// success: no errors; partial: errors but something moved;
    /// failed: errors and nothing moved.
    pub fn derive(status: &SyncStatus) -> Self {
        if status.errors.is_empty() {
            PassOutcome::Success
        } else if status.files_uploaded > 0 || status.files_downloaded > 0 {
            PassOutcome::Partial
        } else {
            PassOutcome::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PassOutcome::Success => "success",
            PassOutcome::Partial => "partial",
            PassOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub sync_mode: SyncMode,
    pub files_uploaded: usize,
    pub files_downloaded: usize,
    pub conflict_count: usize,
    pub error_count: usize,
    pub duration_ms: u64,
    pub status: PassOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_entries: usize,
    pub total_uploaded: usize,
    pub total_downloaded: usize,
    pub total_conflicts: usize,
    pub total_errors: usize,
    pub total_duration_ms: u64,
    pub success_count: usize,
    pub partial_count: usize,
    pub failed_count: usize,
    pub average_duration_ms: f64,
    pub success_rate: f64,
}

pub struct HistoryLog {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    /// Append exactly one entry for a completed pass, evicting the oldest
    /// entries once the cap is reached.
    pub fn record(&mut self, status: &SyncStatus, duration: Duration) -> Result<HistoryEntry> {
        let now = Utc::now();
        let entry = HistoryEntry {
            id: self.next_id(now.timestamp_millis()),
            timestamp: now,
            sync_mode: status.mode,
            files_uploaded: status.files_uploaded,
            files_downloaded: status.files_downloaded,
            conflict_count: status.conflict_count,
            error_count: status.errors.len(),
            duration_ms: duration.as_millis() as u64,
            status: PassOutcome::derive(status),
        };

        self.entries.push(entry.clone());
        if self.entries.len() > HISTORY_CAP {
            let excess = self.entries.len() - HISTORY_CAP;
            self.entries.drain(..excess);
        }
        self.save()?;
        Ok(entry)
    }

    /// Ids carry the completion time; two passes landing in the same
    /// millisecond (immediate pass plus a fast manual trigger) still get
    /// distinct ids.
    fn next_id(&self, stamp: i64) -> String {
        let mut id = format!("sync_{}", stamp);
        let mut n = 1;
        while self.entries.iter().any(|e| e.id == id) {
            id = format!("sync_{}_{}", stamp, n);
            n += 1;
        }
        id
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    pub fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats {
            total_entries: self.entries.len(),
            ..Default::default()
        };

        for entry in &self.entries {
            stats.total_uploaded += entry.files_uploaded;
            stats.total_downloaded += entry.files_downloaded;
            stats.total_conflicts += entry.conflict_count;
            stats.total_errors += entry.error_count;
            stats.total_duration_ms += entry.duration_ms;
            match entry.status {
                PassOutcome::Success => stats.success_count += 1,
                PassOutcome::Partial => stats.partial_count += 1,
                PassOutcome::Failed => stats.failed_count += 1,
            }
        }

        if stats.total_entries > 0 {
            stats.average_duration_ms =
                stats.total_duration_ms as f64 / stats.total_entries as f64;
            stats.success_rate = stats.success_count as f64 / stats.total_entries as f64;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn status(uploaded: usize, downloaded: usize, errors: usize) -> SyncStatus {
        let mut s = SyncStatus::begin(SyncMode::Full);
        s.files_uploaded = uploaded;
        s.files_downloaded = downloaded;
        for i in 0..errors {
            s.errors.push(format!("error {}", i));
        }
        s.running = false;
        s
    }

    #[test]
    fn outcome_derivation() {
        assert_eq!(PassOutcome::derive(&status(1, 0, 0)), PassOutcome::Success);
        assert_eq!(PassOutcome::derive(&status(0, 0, 0)), PassOutcome::Success);
        assert_eq!(PassOutcome::derive(&status(1, 0, 2)), PassOutcome::Partial);
        assert_eq!(PassOutcome::derive(&status(0, 1, 2)), PassOutcome::Partial);
        assert_eq!(PassOutcome::derive(&status(0, 0, 2)), PassOutcome::Failed);
    }

    #[test]
    fn record_appends_and_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sync_history.json");
        {
            let mut log = HistoryLog::open(&path).unwrap();
            let entry = log
                .record(&status(3, 1, 0), Duration::from_millis(250))
                .unwrap();
            assert_eq!(entry.files_uploaded, 3);
            assert_eq!(entry.duration_ms, 250);
            assert_eq!(entry.status, PassOutcome::Success);
        }
        let log = HistoryLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].files_downloaded, 1);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let temp = TempDir::new().unwrap();
        let mut log = HistoryLog::open(temp.path().join("h.json")).unwrap();

        for i in 0..(HISTORY_CAP + 20) {
            log.record(&status(i, 0, 0), Duration::from_millis(1)).unwrap();
        }

        assert_eq!(log.len(), HISTORY_CAP);
        // The 20 oldest entries (uploaded = 0..19) were evicted.
        assert_eq!(log.entries()[0].files_uploaded, 20);
        assert_eq!(
            log.entries()[HISTORY_CAP - 1].files_uploaded,
            HISTORY_CAP + 19
        );
    }

    #[test]
    fn rapid_passes_get_distinct_ids() {
        let temp = TempDir::new().unwrap();
        let mut log = HistoryLog::open(temp.path().join("h.json")).unwrap();

        for _ in 0..5 {
            log.record(&status(1, 0, 0), Duration::from_millis(1)).unwrap();
        }

        let mut ids: Vec<&str> = log.entries().iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn stats_scan() {
        let temp = TempDir::new().unwrap();
        let mut log = HistoryLog::open(temp.path().join("h.json")).unwrap();
        log.record(&status(2, 0, 0), Duration::from_millis(100)).unwrap();
        log.record(&status(1, 3, 1), Duration::from_millis(300)).unwrap();
        log.record(&status(0, 0, 2), Duration::from_millis(200)).unwrap();

        let stats = log.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_uploaded, 3);
        assert_eq!(stats.total_downloaded, 3);
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.partial_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.total_duration_ms, 600);
        assert!((stats.average_duration_ms - 200.0).abs() < f64::EPSILON);
        assert!((stats.success_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn clear_empties_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("h.json");
        let mut log = HistoryLog::open(&path).unwrap();
        log.record(&status(1, 0, 0), Duration::from_millis(1)).unwrap();
        log.clear().unwrap();
        assert!(log.is_empty());

        let reopened = HistoryLog::open(&path).unwrap();
        assert!(reopened.is_empty());
    }
}
