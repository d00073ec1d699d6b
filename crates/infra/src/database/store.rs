//! SQLite implementation of the record and checkpoint stores
//!
//! A page transaction holds one pooled connection for its lifetime and opens
//! it with `BEGIN IMMEDIATE`, so the write lock is taken up front. Isolated
//! record writes run inside a savepoint; dropping an unfinished transaction
//! rolls it back.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use crawlsync_core::{CheckpointStore, LocalStore, PageTransaction, StoredRecord};
use crawlsync_domain::{Checkpoint, CrawlSyncError, Record, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager, SqliteConnection};

/// Record and checkpoint store over a [`DbManager`] pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<DbManager>,
}

impl SqliteStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Stored copy of one record
    pub fn record(&self, entity_type: &str, id: &str) -> Result<Option<Record>> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            "SELECT id, updated_on, payload FROM records WHERE entity_type = ?1 AND id = ?2",
            params![entity_type, id],
            |row| {
                let updated_on: Option<String> = row.get(1)?;
                Ok((row.get::<_, String>(0)?, updated_on, row.get::<_, String>(2)?))
            },
        )
        .optional()
        .map_err(map_sql_error)?
        .map(|(id, updated_on, payload)| decode_record(id, updated_on, &payload))
        .transpose()
    }

    /// Ids of every stored record of `entity_type`, sorted
    pub fn ids(&self, entity_type: &str) -> Result<Vec<String>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn
            .prepare("SELECT id FROM records WHERE entity_type = ?1 ORDER BY id")
            .map_err(map_sql_error)?;
        let ids = stmt
            .query_map(params![entity_type], |row| row.get(0))
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(map_sql_error)?;
        Ok(ids)
    }

    pub fn count(&self, entity_type: &str) -> Result<u64> {
        let conn = self.db.get_connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE entity_type = ?1",
                params![entity_type],
                |row| row.get(0),
            )
            .map_err(map_sql_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl LocalStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn PageTransaction + '_>> {
        let conn = self.db.get_connection()?;
        conn.execute_batch("BEGIN IMMEDIATE").map_err(map_sql_error)?;
        Ok(Box::new(SqliteTransaction { conn, open: true, depth: 0 }))
    }
}

impl CheckpointStore for SqliteStore {
    fn load(&self, fingerprint: &str) -> Result<Option<Checkpoint>> {
        let conn = self.db.get_connection()?;
        load_checkpoint(&conn, fingerprint)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self.db.get_connection()?;
        save_checkpoint(&conn, checkpoint)
    }

    fn delete(&self, fingerprint: &str) -> Result<()> {
        let conn = self.db.get_connection()?;
        delete_checkpoint(&conn, fingerprint)
    }
}

/// One open `BEGIN IMMEDIATE` transaction
struct SqliteTransaction {
    conn: SqliteConnection,
    open: bool,
    /// Savepoint nesting level
    depth: u32,
}

impl SqliteTransaction {
    /// Run `COMMIT` or `ROLLBACK`; on failure `Drop` still rolls back
    fn finish(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(map_sql_error)?;
        self.open = false;
        Ok(())
    }
}

impl PageTransaction for SqliteTransaction {
    fn lookup(&mut self, entity_type: &str, id: &str) -> Result<Option<StoredRecord>> {
        self.conn
            .query_row(
                "SELECT id, updated_on, content_hash FROM records \
                 WHERE entity_type = ?1 AND id = ?2",
                params![entity_type, id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(map_sql_error)?
            .map(|(id, updated_on, content_hash)| -> Result<StoredRecord> {
                Ok(StoredRecord {
                    id,
                    updated_on: updated_on.as_deref().map(parse_timestamp).transpose()?,
                    content_hash,
                })
            })
            .transpose()
    }

    fn upsert(
        &mut self,
        entity_type: &str,
        record: &Record,
        content_hash: &str,
        run_id: Uuid,
    ) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;
        self.conn
            .execute(
                "INSERT INTO records \
                 (entity_type, id, updated_on, content_hash, payload, seen_by, synced_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (entity_type, id) DO UPDATE SET \
                 updated_on = excluded.updated_on, content_hash = excluded.content_hash, \
                 payload = excluded.payload, seen_by = excluded.seen_by, \
                 synced_at = excluded.synced_at",
                params![
                    entity_type,
                    record.id,
                    record.updated_on.map(format_timestamp),
                    content_hash,
                    payload,
                    run_id.to_string(),
                    format_timestamp(Utc::now()),
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn mark_seen(&mut self, entity_type: &str, id: &str, run_id: Uuid) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE records SET seen_by = ?3 WHERE entity_type = ?1 AND id = ?2",
                params![entity_type, id, run_id.to_string()],
            )
            .map_err(map_sql_error)?;
        if changed == 0 {
            return Err(CrawlSyncError::NotFound(format!("{entity_type} record '{id}'")));
        }
        Ok(())
    }

    fn isolated(
        &mut self,
        apply: &mut dyn FnMut(&mut dyn PageTransaction) -> Result<()>,
    ) -> Result<()> {
        self.depth += 1;
        let name = format!("record_{}", self.depth);
        let mut result =
            self.conn.execute_batch(&format!("SAVEPOINT {name}")).map_err(map_sql_error);
        if result.is_ok() {
            result = apply(self);
        }

        let closed = match &result {
            Ok(()) => self.conn.execute_batch(&format!("RELEASE {name}")),
            Err(_) => self.conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")),
        };
        self.depth -= 1;
        closed.map_err(map_sql_error)?;
        result
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        save_checkpoint(&self.conn, checkpoint)
    }

    fn delete_checkpoint(&mut self, fingerprint: &str) -> Result<()> {
        delete_checkpoint(&self.conn, fingerprint)
    }

    fn delete_unseen(&mut self, entity_type: &str, run_id: Uuid) -> Result<u64> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM records WHERE entity_type = ?1 AND seen_by <> ?2",
                params![entity_type, run_id.to_string()],
            )
            .map_err(map_sql_error)?;
        debug!(entity_type, deleted, "deleted records not seen by run");
        Ok(deleted as u64)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback of abandoned transaction failed");
            }
        }
    }
}

fn load_checkpoint(conn: &Connection, fingerprint: &str) -> Result<Option<Checkpoint>> {
    conn.query_row(
        "SELECT fingerprint, entity_type, run_id, last_cursor, records_seen_count, \
         pages_committed, has_gaps, started_at, updated_at \
         FROM checkpoints WHERE fingerprint = ?1",
        params![fingerprint],
        CheckpointRow::from_row,
    )
    .optional()
    .map_err(map_sql_error)?
    .map(CheckpointRow::into_checkpoint)
    .transpose()
}

fn save_checkpoint(conn: &Connection, checkpoint: &Checkpoint) -> Result<()> {
    conn.execute(
        "INSERT INTO checkpoints \
         (fingerprint, entity_type, run_id, last_cursor, records_seen_count, \
          pages_committed, has_gaps, started_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT (fingerprint) DO UPDATE SET \
         entity_type = excluded.entity_type, run_id = excluded.run_id, \
         last_cursor = excluded.last_cursor, records_seen_count = excluded.records_seen_count, \
         pages_committed = excluded.pages_committed, has_gaps = excluded.has_gaps, \
         started_at = excluded.started_at, updated_at = excluded.updated_at",
        params![
            checkpoint.fingerprint,
            checkpoint.entity_type,
            checkpoint.run_id.to_string(),
            checkpoint.last_cursor,
            to_sql_count(checkpoint.records_seen_count),
            to_sql_count(checkpoint.pages_committed),
            checkpoint.has_gaps,
            format_timestamp(checkpoint.started_at),
            format_timestamp(checkpoint.updated_at),
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn delete_checkpoint(conn: &Connection, fingerprint: &str) -> Result<()> {
    conn.execute("DELETE FROM checkpoints WHERE fingerprint = ?1", params![fingerprint])
        .map_err(map_sql_error)?;
    Ok(())
}

/// Raw `checkpoints` row
struct CheckpointRow {
    fingerprint: String,
    entity_type: String,
    run_id: String,
    last_cursor: Option<String>,
    records_seen_count: i64,
    pages_committed: i64,
    has_gaps: bool,
    started_at: String,
    updated_at: String,
}

impl CheckpointRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            entity_type: row.get(1)?,
            run_id: row.get(2)?,
            last_cursor: row.get(3)?,
            records_seen_count: row.get(4)?,
            pages_committed: row.get(5)?,
            has_gaps: row.get(6)?,
            started_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint> {
        let run_id = Uuid::parse_str(&self.run_id).map_err(|e| {
            CrawlSyncError::Database(format!("checkpoint run_id '{}' is invalid: {e}", self.run_id))
        })?;
        Ok(Checkpoint {
            fingerprint: self.fingerprint,
            entity_type: self.entity_type,
            run_id,
            last_cursor: self.last_cursor,
            records_seen_count: u64::try_from(self.records_seen_count).unwrap_or_default(),
            pages_committed: u64::try_from(self.pages_committed).unwrap_or_default(),
            has_gaps: self.has_gaps,
            started_at: parse_timestamp(&self.started_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn decode_record(id: String, updated_on: Option<String>, payload: &str) -> Result<Record> {
    let payload: Value = serde_json::from_str(payload)?;
    Ok(Record { id, updated_on: updated_on.as_deref().map(parse_timestamp).transpose()?, payload })
}

/// RFC 3339 with as many fractional digits as needed, so stored timestamps
/// compare equal to the ones they were written from
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CrawlSyncError::Database(format!("stored timestamp '{raw}' is invalid: {e}")))
}

fn to_sql_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
