//! Port interfaces for the local store
//!
//! Store calls are synchronous: the sync engine runs each page's writes on a
//! blocking thread inside one transaction, so nothing suspends between
//! `begin` and `commit`.

use chrono::{DateTime, Utc};
use crawlsync_domain::{Checkpoint, Record, Result};
use uuid::Uuid;

/// What the store already holds for a record id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub content_hash: String,
}

/// One open store transaction. Dropping it without `commit` rolls back.
pub trait PageTransaction {
    fn lookup(&mut self, entity_type: &str, id: &str) -> Result<Option<StoredRecord>>;

    /// Insert or replace `record` and mark it seen by `run_id`
    fn upsert(
        &mut self,
        entity_type: &str,
        record: &Record,
        content_hash: &str,
        run_id: Uuid,
    ) -> Result<()>;

    /// Mark an unchanged record as seen by `run_id`
    fn mark_seen(&mut self, entity_type: &str, id: &str, run_id: Uuid) -> Result<()>;

    /// Run `apply` so that a failure undoes only its own writes
    fn isolated(
        &mut self,
        apply: &mut dyn FnMut(&mut dyn PageTransaction) -> Result<()>,
    ) -> Result<()>;

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    fn delete_checkpoint(&mut self, fingerprint: &str) -> Result<()>;

    /// Delete every `entity_type` record not seen by `run_id`; returns the
    /// number removed.
    fn delete_unseen(&mut self, entity_type: &str, run_id: Uuid) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional record store
pub trait LocalStore: Send + Sync {
    fn begin(&self) -> Result<Box<dyn PageTransaction + '_>>;
}

/// Checkpoint persistence outside page transactions
pub trait CheckpointStore: Send + Sync {
    fn load(&self, fingerprint: &str) -> Result<Option<Checkpoint>>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn delete(&self, fingerprint: &str) -> Result<()>;
}
