//! Resumable crawl checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{CrawlSyncError, Result};

/// Where the next page of a crawl starts.
///
/// Stored as the checkpoint's `last_cursor` so cursor, offset and windowed
/// crawls all resume from the exact position of the last committed page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlPosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub offset: u64,
    /// Current value of the window rollover variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_bound: Option<Value>,
    /// Records already delivered that sit exactly on `window_bound`; the
    /// inclusive window returns them again
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub window_overlap: Vec<String>,
    /// Set once the crawl has reached the end of the result set
    #[serde(default)]
    pub exhausted: bool,
}

impl CrawlPosition {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| CrawlSyncError::InvalidInput(format!("unreadable crawl position: {e}")))
    }
}

/// Progress marker for one query fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub fingerprint: String,
    pub entity_type: String,
    /// Run that owns the "seen" marks in the store; reused on resume
    pub run_id: Uuid,
    /// Encoded [`CrawlPosition`] after the last committed page
    pub last_cursor: Option<String>,
    pub records_seen_count: u64,
    pub pages_committed: u64,
    /// A page was skipped at some point, so deletion reconciliation is unsafe
    #[serde(default)]
    pub has_gaps: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        fingerprint: impl Into<String>,
        entity_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            entity_type: entity_type.into(),
            run_id: Uuid::now_v7(),
            last_cursor: None,
            records_seen_count: 0,
            pages_committed: 0,
            has_gaps: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Decoded position, or the start of the result set for a new checkpoint
    pub fn position(&self) -> Result<CrawlPosition> {
        match self.last_cursor.as_deref() {
            Some(raw) => CrawlPosition::decode(raw),
            None => Ok(CrawlPosition::start()),
        }
    }

    /// Checkpoint after one more committed page
    pub fn advanced(
        &self,
        position: &CrawlPosition,
        records_in_page: u64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            last_cursor: Some(position.encode()?),
            records_seen_count: self.records_seen_count + records_in_page,
            pages_committed: self.pages_committed + 1,
            updated_at: now,
            ..self.clone()
        })
    }
}
