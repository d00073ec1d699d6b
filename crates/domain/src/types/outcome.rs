//! Sync run results

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_label_conversions;

/// Sync engine run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Starting,
    Resuming,
    FreshCrawling,
    Paging,
    Committing,
    Completed,
    Failed,
}

impl_label_conversions!(RunState {
    Starting => "starting",
    Resuming => "resuming",
    FreshCrawling => "fresh_crawling",
    Paging => "paging",
    Committing => "committing",
    Completed => "completed",
    Failed => "failed",
});

impl RunState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A record (or skipped page) that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_id: String,
    pub reason: String,
}

impl RecordError {
    pub fn new(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { record_id: record_id.into(), reason: reason.into() }
    }
}

/// Counts and errors for one run, including failed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub run_id: Uuid,
    pub fingerprint: String,
    pub entity_type: String,
    pub state: RunState,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub errors: Vec<RecordError>,
    pub pages_committed: u64,
    /// Records applied across this run and any earlier interrupted attempts
    pub records_seen: u64,
    /// Total the server reported on the first page of this run
    pub reported_total: Option<u64>,
    pub resumed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncOutcome {
    pub fn new(
        run_id: Uuid,
        fingerprint: impl Into<String>,
        entity_type: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            fingerprint: fingerprint.into(),
            entity_type: entity_type.into(),
            state: RunState::Starting,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            errors: Vec::new(),
            pages_committed: 0,
            records_seen: 0,
            reported_total: None,
            resumed: false,
            started_at,
            finished_at: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.state, RunState::Completed)
    }

    /// Records written or confirmed during this run
    pub const fn applied(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    /// Human-readable summary listing at most `max_errors` errors.
    pub fn summary(&self, max_errors: usize) -> String {
        let mut out = format!(
            "{} sync of '{}' {}: {} inserted, {} updated, {} unchanged, {} deleted, {} errors \
             ({} pages, {} records seen)",
            if self.resumed { "resumed" } else { "fresh" },
            self.entity_type,
            self.state,
            self.inserted,
            self.updated,
            self.unchanged,
            self.deleted,
            self.errors.len(),
            self.pages_committed,
            self.records_seen,
        );
        for err in self.errors.iter().take(max_errors) {
            let _ = write!(out, "\n  - {}: {}", err.record_id, err.reason);
        }
        if self.errors.len() > max_errors {
            let _ = write!(out, "\n  ... and {} more", self.errors.len() - max_errors);
        }
        out
    }
}
