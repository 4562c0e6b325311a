//! Push, pull and merge between the local journal and the remote store.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};

use journal_core::journal::{ConsentRecord, JournalEntry, LocalJournal};
use journal_core::sync::{is_strictly_newer, SkipReason, SyncOutcome};

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use crate::types::{
    canonical_remote_id, decode_row, ConsentRow, EntryRow, ListFilter, OperatorEntryPatch,
    OwnerEntryPatch, Resource,
};

/// Per-record tally for one batch.
#[derive(Debug, Default)]
struct BatchTally {
    success_count: usize,
    error_count: usize,
    offline: bool,
    pushed_ids: HashSet<String>,
}

impl BatchTally {
    /// Records one item. Returns false when the remote went away and the batch
    /// must stop; the current and remaining items are then counted as errors.
    fn record(&mut self, id: &str, result: Result<()>, remaining: usize) -> bool {
        match result {
            Ok(()) => {
                self.success_count += 1;
                self.pushed_ids.insert(id.to_string());
                true
            }
            Err(err) if err.is_unreachable() => {
                warn!(
                    "[JournalSync] Remote unreachable at {}, abandoning {} item(s): {}",
                    id, remaining, err
                );
                self.offline = true;
                self.error_count += remaining;
                false
            }
            Err(err) => {
                warn!("[JournalSync] Failed to push {}: {}", id, err);
                self.error_count += 1;
                true
            }
        }
    }

    fn outcome(&self) -> SyncOutcome {
        if self.offline && self.success_count == 0 {
            return SyncOutcome::skipped(SkipReason::RemoteUnreachable);
        }
        SyncOutcome::from_counts(self.success_count, self.error_count)
    }
}

fn failure_outcome(context: &str, err: &RemoteError) -> SyncOutcome {
    if err.is_unreachable() {
        warn!("[JournalSync] {} skipped, remote unreachable: {}", context, err);
        SyncOutcome::skipped(SkipReason::RemoteUnreachable)
    } else {
        warn!("[JournalSync] {} failed: {}", context, err);
        SyncOutcome::fatal(format!("{}: {}", context, err))
    }
}

/// Moves journal data between [`LocalJournal`] and a [`RemoteStore`].
///
/// With no remote configured every operation returns
/// `Skipped(RemoteUnconfigured)` without touching local state.
pub struct SyncEngine {
    journal: Arc<LocalJournal>,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl SyncEngine {
    pub fn new(journal: Arc<LocalJournal>, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self { journal, remote }
    }

    pub fn journal(&self) -> &Arc<LocalJournal> {
        &self.journal
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Owner pushes
    // ─────────────────────────────────────────────────────────────────────────

    /// Upserts `entries` for `owner_id`, one record at a time.
    pub async fn push_entries(&self, owner_id: &str, entries: &[JournalEntry]) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };
        self.push_batch(remote.as_ref(), owner_id, entries)
            .await
            .outcome()
    }

    /// Pushes the whole local collection and binds pushed entries to `owner_id`.
    pub async fn push_local_entries(&self, owner_id: &str) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };
        let entries = match self.journal.list_entries() {
            Ok(entries) => entries,
            Err(err) => return SyncOutcome::fatal(format!("Failed to read local entries: {}", err)),
        };
        self.push_and_bind(remote.as_ref(), owner_id, &entries).await
    }

    /// Pushes the `limit` most recently created entries. Failures are logged
    /// and reported in the outcome, never raised.
    pub async fn push_recent_subset(&self, owner_id: &str, limit: usize) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };
        let entries = match self.journal.recent_entries(limit) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("[JournalSync] Could not read recent entries: {}", err);
                return SyncOutcome::fatal(format!("Failed to read local entries: {}", err));
            }
        };
        let outcome = self.push_and_bind(remote.as_ref(), owner_id, &entries).await;
        if !outcome.is_success() {
            warn!(
                "[JournalSync] Recent subset push finished with status {}",
                outcome.status_code()
            );
        }
        outcome
    }

    async fn push_and_bind(
        &self,
        remote: &dyn RemoteStore,
        owner_id: &str,
        entries: &[JournalEntry],
    ) -> SyncOutcome {
        let tally = self.push_batch(remote, owner_id, entries).await;
        match self.journal.bind_owner(&tally.pushed_ids, owner_id) {
            Ok(0) => {}
            Ok(bound) => debug!("[JournalSync] Bound {} entries to {}", bound, owner_id),
            Err(err) => warn!("[JournalSync] Failed to bind pushed entries: {}", err),
        }
        tally.outcome()
    }

    async fn push_batch(
        &self,
        remote: &dyn RemoteStore,
        owner_id: &str,
        entries: &[JournalEntry],
    ) -> BatchTally {
        let mut tally = BatchTally::default();
        for (index, entry) in entries.iter().enumerate() {
            let result = Self::push_owner_entry(remote, owner_id, entry).await;
            if !tally.record(&entry.id, result, entries.len() - index) {
                break;
            }
        }
        info!(
            "[JournalSync] Pushed {} entries for {} ({} failed)",
            tally.success_count, owner_id, tally.error_count
        );
        tally
    }

    async fn push_owner_entry(
        remote: &dyn RemoteStore,
        owner_id: &str,
        entry: &JournalEntry,
    ) -> Result<()> {
        match remote.get_by_id(Resource::Entries, &entry.id).await? {
            Some(existing) => {
                let existing: EntryRow = decode_row(existing)?;
                if let Some(other) = existing.user_id.as_deref().filter(|id| *id != owner_id) {
                    return Err(RemoteError::api(
                        403,
                        None,
                        format!("Entry {} belongs to another user ({})", entry.id, other),
                    ));
                }
                if is_strictly_newer(existing.updated_at.as_deref(), entry.updated_at.as_deref()) {
                    debug!(
                        "[JournalSync] Remote copy of {} is newer, leaving it for the next pull",
                        entry.id
                    );
                    return Ok(());
                }
                let patch = serde_json::to_value(OwnerEntryPatch::from(entry))?;
                remote.update(Resource::Entries, &entry.id, patch).await
            }
            None => {
                let row = serde_json::to_value(EntryRow::for_insert(entry, owner_id))?;
                remote.insert(Resource::Entries, row).await.map(|_| ())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operator pushes
    // ─────────────────────────────────────────────────────────────────────────

    /// Writes counselor fields of entries that already exist remotely.
    pub async fn push_operator_edits(&self, entries: &[JournalEntry]) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };

        let mut tally = BatchTally::default();
        for (index, entry) in entries.iter().enumerate() {
            let result = Self::push_operator_entry(remote.as_ref(), entry).await;
            if !tally.record(&entry.id, result, entries.len() - index) {
                break;
            }
        }
        tally.outcome()
    }

    async fn push_operator_entry(remote: &dyn RemoteStore, entry: &JournalEntry) -> Result<()> {
        let Some(existing) = remote.get_by_id(Resource::Entries, &entry.id).await? else {
            return Err(RemoteError::api(
                404,
                None,
                format!("Entry {} does not exist remotely", entry.id),
            ));
        };
        let existing: EntryRow = decode_row(existing)?;
        if is_strictly_newer(
            existing.counselor_updated_at.as_deref(),
            entry.counselor_updated_at.as_deref(),
        ) {
            debug!(
                "[JournalSync] Remote counselor fields of {} are newer, skipping operator edit",
                entry.id
            );
            return Ok(());
        }
        let patch = serde_json::to_value(OperatorEntryPatch::from(entry))?;
        remote.update(Resource::Entries, &entry.id, patch).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetches every remote entry owned by `owner_id` and merges it locally.
    pub async fn pull_entries(&self, owner_id: &str) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };

        let rows = match remote
            .list(Resource::Entries, &ListFilter::eq("user_id", owner_id))
            .await
        {
            Ok(rows) => rows,
            Err(err) => return failure_outcome("Pull", &err),
        };

        let mut error_count = 0;
        let mut pulled = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row::<EntryRow>(row) {
                Ok(row) => pulled.push(JournalEntry::from(row)),
                Err(err) => {
                    warn!("[JournalSync] Skipping undecodable remote entry: {}", err);
                    error_count += 1;
                }
            }
        }

        let pulled_count = pulled.len();
        match self.journal.apply_pulled_entries(pulled) {
            Ok(stats) => {
                info!(
                    "[JournalSync] Pulled {} entries for {} (inserted {}, overwritten {}, kept local {})",
                    pulled_count, owner_id, stats.inserted, stats.overwritten, stats.kept_local
                );
                SyncOutcome::from_counts(pulled_count, error_count)
            }
            Err(err) => SyncOutcome::fatal(format!("Failed to store pulled entries: {}", err)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consent
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts local consent records that the remote does not have yet.
    pub async fn push_consent_records(&self) -> SyncOutcome {
        let Some(remote) = self.remote.as_ref() else {
            return SyncOutcome::skipped(SkipReason::RemoteUnconfigured);
        };
        let records = match self.journal.list_consent_records() {
            Ok(records) => records,
            Err(err) => {
                return SyncOutcome::fatal(format!("Failed to read consent records: {}", err))
            }
        };

        let mut tally = BatchTally::default();
        for (index, record) in records.iter().enumerate() {
            let remote_id = canonical_remote_id(&record.id);
            if remote_id != record.id {
                debug!(
                    "[JournalSync] Consent record {} pushed as {}",
                    record.id, remote_id
                );
            }
            let result = Self::push_consent_record(remote.as_ref(), record, remote_id).await;
            if !tally.record(&record.id, result, records.len() - index) {
                break;
            }
        }
        tally.outcome()
    }

    async fn push_consent_record(
        remote: &dyn RemoteStore,
        record: &ConsentRecord,
        remote_id: String,
    ) -> Result<()> {
        if remote
            .get_by_id(Resource::ConsentRecords, &remote_id)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let row = serde_json::to_value(ConsentRow::from_record(record, remote_id))?;
        remote
            .insert(Resource::ConsentRecords, row)
            .await
            .map(|_| ())
    }
}
