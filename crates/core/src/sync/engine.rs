//! Sync engine
//!
//! Drives one crawl into the local store:
//!
//! ```text
//! Starting -> Resuming | FreshCrawling -> (Paging -> Committing)* -> Completed
//!                                                                 \-> Failed
//! ```
//!
//! Each page is applied in one store transaction together with the advanced
//! checkpoint, so a crash never leaves a checkpoint ahead of the data (or the
//! data ahead of the checkpoint). Counts are merged into the outcome only
//! after the transaction commits.
//!
//! Deletion reconciliation runs only after a full-scope crawl that reached
//! the end of the result set with no skipped pages: every stored record of
//! the entity type not seen by the run is deleted, in the same transaction
//! that removes the checkpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crawlsync_common::{Clock, SystemClock};
use crawlsync_domain::constants::SKIPPED_PAGE_PREFIX;
use crawlsync_domain::{Checkpoint, CrawlSyncError, Record, RecordError, RunState, SyncOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::change::{content_hash, detect_change, Change};
use super::ports::{CheckpointStore, LocalStore, PageTransaction};
use super::request::SyncRequest;
use crate::crawl::Paginator;
use crate::errors::{CrawlError, SyncRunError};
use crate::governor::RateGovernor;
use crate::transport::GraphqlTransport;

const LOG_TARGET: &str = "crawlsync::sync";

pub struct SyncEngine {
    transport: Arc<dyn GraphqlTransport>,
    governor: Arc<RateGovernor>,
    store: Arc<dyn LocalStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn GraphqlTransport>,
        governor: Arc<RateGovernor>,
        store: Arc<dyn LocalStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self { transport, governor, store, checkpoints, clock: Arc::new(SystemClock) }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one sync to completion, failure or cancellation.
    ///
    /// On failure the checkpoint of the last committed page is kept, so a
    /// later run with `resume` continues from there.
    ///
    /// # Errors
    /// [`SyncRunError`] with the partial outcome when the run fails.
    pub async fn run(
        &self,
        request: SyncRequest,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncRunError> {
        let fingerprint = request.fingerprint();
        let mut outcome =
            SyncOutcome::new(Uuid::nil(), &fingerprint, &request.entity_type, self.now());
        self.transition(&mut outcome, RunState::Starting);

        let result = self.drive(&request, &mut outcome, cancel).await;
        outcome.finished_at = Some(self.now());

        match result {
            Ok(()) => {
                self.transition(&mut outcome, RunState::Completed);
                info!(target: LOG_TARGET, summary = %outcome.summary(5), "sync finished");
                Ok(outcome)
            }
            Err(err) => {
                outcome.state = RunState::Failed;
                error!(
                    target: LOG_TARGET,
                    run_id = %outcome.run_id,
                    fingerprint = %outcome.fingerprint,
                    entity_type = %outcome.entity_type,
                    state = %outcome.state,
                    pages_committed = outcome.pages_committed,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    unchanged = outcome.unchanged,
                    deleted = outcome.deleted,
                    error = %err,
                    "sync failed"
                );
                Err(SyncRunError::new(err, outcome))
            }
        }
    }

    async fn drive(
        &self,
        request: &SyncRequest,
        outcome: &mut SyncOutcome,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        let mut checkpoint = self.start(request, outcome).await?;

        let mut paginator = Paginator::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.governor),
            request.bound_request()?,
            request.page_size,
        )?
        .with_offset_ceiling(request.offset_ceiling)
        .with_max_items(request.max_items)
        .resume_from(checkpoint.position()?, checkpoint.records_seen_count);

        loop {
            if cancel.is_cancelled() {
                return Err(CrawlError::Interrupted);
            }
            self.transition(outcome, RunState::Paging);

            let fetched = match paginator.next_page().await {
                Ok(Some(fetched)) => fetched,
                Ok(None) => break,
                Err(err @ CrawlError::RetriesExhausted { .. }) => {
                    // A fresh crawl that cannot fetch its first page fails fast
                    let skipped = if checkpoint.pages_committed == 0 {
                        None
                    } else {
                        paginator.skip_failed_page()
                    };
                    let Some(offset) = skipped else {
                        return Err(err);
                    };
                    warn!(
                        target: LOG_TARGET,
                        run_id = %checkpoint.run_id,
                        offset,
                        error = %err,
                        "skipping page after retries were exhausted"
                    );
                    let page_id = format!("{SKIPPED_PAGE_PREFIX}{offset}");
                    outcome.errors.push(RecordError::new(page_id, err.to_string()));
                    checkpoint.has_gaps = true;
                    checkpoint.last_cursor = Some(paginator.position().encode()?);
                    checkpoint.updated_at = self.now();
                    let checkpoints = Arc::clone(&self.checkpoints);
                    let saved = checkpoint.clone();
                    blocking(move || checkpoints.save(&saved)).await?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            outcome.reported_total = outcome.reported_total.or(paginator.reported_total());

            // Drop the fetched page rather than start a commit after cancellation
            if cancel.is_cancelled() {
                return Err(CrawlError::Interrupted);
            }
            self.transition(outcome, RunState::Committing);

            let warnings = fetched.page.warnings.len();
            let records = fetched.page.items;
            let next = checkpoint.advanced(&fetched.next, records.len() as u64, self.now())?;

            let store = Arc::clone(&self.store);
            let entity_type = request.entity_type.clone();
            let to_save = next.clone();
            let tally =
                blocking(move || apply_page(store.as_ref(), &entity_type, &records, &to_save))
                    .await?;

            checkpoint = next;
            outcome.inserted += tally.inserted;
            outcome.updated += tally.updated;
            outcome.unchanged += tally.unchanged;
            outcome.errors.extend(tally.errors);
            outcome.pages_committed += 1;
            outcome.records_seen = checkpoint.records_seen_count;

            debug!(
                target: LOG_TARGET,
                run_id = %checkpoint.run_id,
                page = checkpoint.pages_committed,
                offset = fetched.start.offset,
                inserted = tally.inserted,
                updated = tally.updated,
                unchanged = tally.unchanged,
                warnings,
                "page committed"
            );
        }

        self.finish(request, &checkpoint, paginator.is_exhausted(), outcome).await
    }

    /// Load or create the checkpoint and pick the resume branch.
    ///
    /// Without `resume` any checkpoint left under the fingerprint is dropped
    /// first, so a fresh run that fails before its first commit cannot be
    /// resumed from the older crawl's position.
    async fn start(
        &self,
        request: &SyncRequest,
        outcome: &mut SyncOutcome,
    ) -> Result<Checkpoint, CrawlError> {
        let checkpoints = Arc::clone(&self.checkpoints);
        let fingerprint = outcome.fingerprint.clone();
        let existing = if request.resume {
            blocking(move || checkpoints.load(&fingerprint)).await?
        } else {
            blocking(move || checkpoints.delete(&fingerprint)).await?;
            None
        };

        let checkpoint = match existing {
            Some(checkpoint) if checkpoint.entity_type != request.entity_type => {
                return Err(CrawlError::InvalidRequest(format!(
                    "checkpoint {} belongs to entity type '{}', not '{}'",
                    checkpoint.fingerprint, checkpoint.entity_type, request.entity_type
                )));
            }
            Some(checkpoint) => {
                outcome.resumed = true;
                outcome.run_id = checkpoint.run_id;
                outcome.records_seen = checkpoint.records_seen_count;
                self.transition(outcome, RunState::Resuming);
                checkpoint
            }
            None => {
                let checkpoint =
                    Checkpoint::new(&outcome.fingerprint, &request.entity_type, self.now());
                outcome.run_id = checkpoint.run_id;
                self.transition(outcome, RunState::FreshCrawling);
                checkpoint
            }
        };
        Ok(checkpoint)
    }

    /// Reconcile deletions when eligible and drop the checkpoint
    async fn finish(
        &self,
        request: &SyncRequest,
        checkpoint: &Checkpoint,
        exhausted: bool,
        outcome: &mut SyncOutcome,
    ) -> Result<(), CrawlError> {
        let reconcile = exhausted && request.scope.is_full() && !checkpoint.has_gaps;
        if !reconcile {
            info!(
                target: LOG_TARGET,
                run_id = %checkpoint.run_id,
                exhausted,
                full_scope = request.scope.is_full(),
                has_gaps = checkpoint.has_gaps,
                "deletion reconciliation skipped"
            );
        }

        let store = Arc::clone(&self.store);
        let entity_type = request.entity_type.clone();
        let fingerprint = checkpoint.fingerprint.clone();
        let run_id = checkpoint.run_id;
        let deleted = blocking(move || {
            let mut tx = store.begin()?;
            let deleted = if reconcile { tx.delete_unseen(&entity_type, run_id)? } else { 0 };
            tx.delete_checkpoint(&fingerprint)?;
            tx.commit()?;
            Ok(deleted)
        })
        .await?;

        outcome.deleted = deleted;
        Ok(())
    }

    /// Every transition carries the running counts; per-page states log at
    /// debug.
    fn transition(&self, outcome: &mut SyncOutcome, state: RunState) {
        outcome.state = state;
        macro_rules! state_changed {
            ($level:ident) => {
                $level!(
                    target: LOG_TARGET,
                    run_id = %outcome.run_id,
                    fingerprint = %outcome.fingerprint,
                    entity_type = %outcome.entity_type,
                    state = %state,
                    resumed = outcome.resumed,
                    pages_committed = outcome.pages_committed,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    unchanged = outcome.unchanged,
                    deleted = outcome.deleted,
                    "sync state changed"
                )
            };
        }
        match state {
            RunState::Paging | RunState::Committing => state_changed!(debug),
            _ => state_changed!(info),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine").field("governor", &self.governor).finish_non_exhaustive()
    }
}

/// Per-page counts, merged into the outcome after commit
#[derive(Debug, Default)]
struct PageTally {
    inserted: u64,
    updated: u64,
    unchanged: u64,
    errors: Vec<RecordError>,
}

impl PageTally {
    fn count(&mut self, change: Change) {
        match change {
            Change::Inserted => self.inserted += 1,
            Change::Updated => self.updated += 1,
            Change::Unchanged => self.unchanged += 1,
        }
    }
}

/// Apply one page and its checkpoint in a single transaction.
///
/// A record that fails is rolled back on its own and reported; the rest of
/// the page still commits.
fn apply_page(
    store: &dyn LocalStore,
    entity_type: &str,
    records: &[Record],
    checkpoint: &Checkpoint,
) -> crawlsync_domain::Result<PageTally> {
    let mut tx = store.begin()?;
    let mut tally = PageTally::default();

    for record in records {
        let mut change = Change::Unchanged;
        let result = tx.isolated(&mut |tx: &mut dyn PageTransaction| {
            change = apply_record(tx, entity_type, checkpoint.run_id, record)?;
            Ok(())
        });
        match result {
            Ok(()) => tally.count(change),
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    record_id = %record.id,
                    error = %err,
                    "record could not be applied"
                );
                tally.errors.push(RecordError::new(&record.id, err.to_string()));
                // The stored copy is still current for this run; keep it out of reconciliation
                if let Err(err) = tx.mark_seen(entity_type, &record.id, checkpoint.run_id) {
                    warn!(
                        target: LOG_TARGET,
                        record_id = %record.id,
                        error = %err,
                        "failed record could not be marked seen"
                    );
                }
            }
        }
    }

    tx.save_checkpoint(checkpoint)?;
    tx.commit()?;
    Ok(tally)
}

fn apply_record(
    tx: &mut dyn PageTransaction,
    entity_type: &str,
    run_id: Uuid,
    record: &Record,
) -> crawlsync_domain::Result<Change> {
    let hash = content_hash(&record.payload);
    let stored = tx.lookup(entity_type, &record.id)?;
    let change = detect_change(stored.as_ref(), record, &hash);
    match change {
        Change::Unchanged => tx.mark_seen(entity_type, &record.id, run_id)?,
        Change::Inserted | Change::Updated => tx.upsert(entity_type, record, &hash, run_id)?,
    }
    Ok(change)
}

/// Run a store call on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, CrawlError>
where
    F: FnOnce() -> crawlsync_domain::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CrawlSyncError::Internal(format!("store task failed: {e}")))?
        .map_err(CrawlError::Store)
}
