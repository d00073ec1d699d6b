//! In-memory implementation of the local store ports
//!
//! Transactions work on a copy of the committed state and swap it in on
//! commit, so rollback (explicit or by drop) is free. Failures can be
//! injected per record id or for the Nth commit.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crawlsync_core::{CheckpointStore, LocalStore, PageTransaction, StoredRecord};
use crawlsync_domain::{Checkpoint, CrawlSyncError, Record, Result as DomainResult};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub record: Record,
    pub content_hash: String,
    pub seen_by: Uuid,
}

#[derive(Debug, Clone, Default)]
struct State {
    rows: BTreeMap<(String, String), StoredRow>,
    checkpoints: BTreeMap<String, Checkpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    failing_ids: Arc<Mutex<HashSet<String>>>,
    fail_commit_number: Arc<Mutex<Option<u64>>>,
    commits: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as if an earlier run had written it
    pub fn seed(&self, entity_type: &str, record: Record) {
        let content_hash = crawlsync_core::sync::content_hash(&record.payload);
        self.state.lock().unwrap().rows.insert(
            (entity_type.to_string(), record.id.clone()),
            StoredRow { record, content_hash, seen_by: Uuid::nil() },
        );
    }

    pub fn record(&self, entity_type: &str, id: &str) -> Option<StoredRow> {
        self.state.lock().unwrap().rows.get(&(entity_type.to_string(), id.to_string())).cloned()
    }

    pub fn ids(&self, entity_type: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .rows
            .keys()
            .filter(|(entity, _)| entity == entity_type)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn count(&self, entity_type: &str) -> usize {
        self.ids(entity_type).len()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.lock().unwrap().checkpoints.values().cloned().collect()
    }

    pub fn fail_upsert_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    /// Make the `n`th commit from now fail (1-based)
    pub fn fail_commit_in(&self, n: u64) {
        let target = self.commits.load(Ordering::SeqCst) + n;
        *self.fail_commit_number.lock().unwrap() = Some(target);
    }

    pub fn clear_failures(&self) {
        self.failing_ids.lock().unwrap().clear();
        *self.fail_commit_number.lock().unwrap() = None;
    }
}

pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    working: State,
}

impl PageTransaction for MemoryTransaction<'_> {
    fn lookup(&mut self, entity_type: &str, id: &str) -> DomainResult<Option<StoredRecord>> {
        Ok(self.working.rows.get(&(entity_type.to_string(), id.to_string())).map(|row| {
            StoredRecord {
                id: row.record.id.clone(),
                updated_on: row.record.updated_on,
                content_hash: row.content_hash.clone(),
            }
        }))
    }

    fn upsert(
        &mut self,
        entity_type: &str,
        record: &Record,
        content_hash: &str,
        run_id: Uuid,
    ) -> DomainResult<()> {
        if self.store.failing_ids.lock().unwrap().contains(&record.id) {
            return Err(CrawlSyncError::Database(format!("injected failure for {}", record.id)));
        }
        self.working.rows.insert(
            (entity_type.to_string(), record.id.clone()),
            StoredRow {
                record: record.clone(),
                content_hash: content_hash.to_string(),
                seen_by: run_id,
            },
        );
        Ok(())
    }

    fn mark_seen(&mut self, entity_type: &str, id: &str, run_id: Uuid) -> DomainResult<()> {
        if let Some(row) = self.working.rows.get_mut(&(entity_type.to_string(), id.to_string())) {
            row.seen_by = run_id;
        }
        Ok(())
    }

    fn isolated(
        &mut self,
        apply: &mut dyn FnMut(&mut dyn PageTransaction) -> DomainResult<()>,
    ) -> DomainResult<()> {
        let snapshot = self.working.clone();
        let result = apply(self);
        if result.is_err() {
            self.working = snapshot;
        }
        result
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> DomainResult<()> {
        self.working.checkpoints.insert(checkpoint.fingerprint.clone(), checkpoint.clone());
        Ok(())
    }

    fn delete_checkpoint(&mut self, fingerprint: &str) -> DomainResult<()> {
        self.working.checkpoints.remove(fingerprint);
        Ok(())
    }

    fn delete_unseen(&mut self, entity_type: &str, run_id: Uuid) -> DomainResult<u64> {
        let before = self.working.rows.len();
        self.working.rows.retain(|(entity, _), row| entity != entity_type || row.seen_by == run_id);
        Ok((before - self.working.rows.len()) as u64)
    }

    fn commit(self: Box<Self>) -> DomainResult<()> {
        let MemoryTransaction { store, working } = *self;
        let number = store.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if *store.fail_commit_number.lock().unwrap() == Some(number) {
            return Err(CrawlSyncError::Database("injected commit failure".into()));
        }
        *store.state.lock().unwrap() = working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> DomainResult<()> {
        Ok(())
    }
}

impl LocalStore for MemoryStore {
    fn begin(&self) -> DomainResult<Box<dyn PageTransaction + '_>> {
        let working = self.state.lock().unwrap().clone();
        Ok(Box::new(MemoryTransaction { store: self, working }))
    }
}

impl CheckpointStore for MemoryStore {
    fn load(&self, fingerprint: &str) -> DomainResult<Option<Checkpoint>> {
        Ok(self.state.lock().unwrap().checkpoints.get(fingerprint).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        self.state
            .lock()
            .unwrap()
            .checkpoints
            .insert(checkpoint.fingerprint.clone(), checkpoint.clone());
        Ok(())
    }

    fn delete(&self, fingerprint: &str) -> DomainResult<()> {
        self.state.lock().unwrap().checkpoints.remove(fingerprint);
        Ok(())
    }
}
