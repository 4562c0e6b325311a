//! Typed repository over the local key/value store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::journal_model::{
    validate_score, AdminAggregateEntry, ConsentRecord, CounselorUpdate, EntryUpdate,
    JournalEntry, NewJournalEntry,
};
use crate::clock::Clock;
use crate::errors::{Error, Result};
use crate::storage::{
    LocalStore, ADMIN_AGGREGATE_KEY, AUTO_SYNC_ENABLED_KEY, CONSENT_RECORDS_KEY, ENTRIES_KEY,
    SYNC_CURSOR_KEY,
};
use crate::sync::{merge_pulled_entries, MergeStats, SyncCursor};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCursor {
    last_sync_at: Option<DateTime<Utc>>,
}

/// Journal collections persisted in a [`LocalStore`].
///
/// Every collection lives under a single key and is rewritten whole, so a
/// reader never sees a half-applied merge. Read-modify-write sequences are
/// serialised by an internal lock. Values that fail to parse are treated as
/// empty collections.
pub struct LocalJournal {
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl LocalJournal {
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::internal("Local journal lock is poisoned"))
    }

    fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(values) => Ok(values),
            Err(err) => {
                warn!(
                    "[LocalJournal] Stored value for '{}' is unreadable, treating as empty: {}",
                    key, err
                );
                Ok(Vec::new())
            }
        }
    }

    fn write_collection<T: Serialize>(&self, key: &str, values: &[T]) -> Result<()> {
        let raw = serde_json::to_string(values)?;
        self.store.set(key, &raw)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_entries(&self) -> Result<Vec<JournalEntry>> {
        self.read_collection(ENTRIES_KEY)
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<JournalEntry>> {
        Ok(self.list_entries()?.into_iter().find(|entry| entry.id == id))
    }

    /// Appends a new entry locally. Always succeeds when the store is writable;
    /// the entry is pushed later by the sync scheduler.
    pub fn append_entry(&self, input: NewJournalEntry) -> Result<JournalEntry> {
        input.validate()?;
        let _guard = self.lock()?;
        let mut entries = self.list_entries()?;

        let now = self.clock.now();
        let taken: HashSet<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
        let mut id_millis = now.timestamp_millis();
        while taken.contains(id_millis.to_string().as_str()) {
            id_millis += 1;
        }
        let timestamp = now.to_rfc3339();

        let entry = JournalEntry {
            id: id_millis.to_string(),
            user_id: None,
            date: input.date,
            emotion: input.emotion,
            event: input.event,
            realization: input.realization,
            self_esteem_score: input.self_esteem_score,
            worthlessness_score: input.worthlessness_score,
            counselor_memo: None,
            is_visible_to_user: None,
            urgency_level: None,
            assigned_counselor: None,
            counselor_updated_at: None,
            created_at: timestamp.clone(),
            updated_at: Some(timestamp),
        };
        entries.push(entry.clone());
        self.write_collection(ENTRIES_KEY, &entries)?;
        Ok(entry)
    }

    /// Applies an owner edit and stamps `updated_at`.
    pub fn update_entry(&self, id: &str, update: EntryUpdate) -> Result<JournalEntry> {
        validate_score("selfEsteemScore", update.self_esteem_score)?;
        validate_score("worthlessnessScore", update.worthlessness_score)?;
        let _guard = self.lock()?;
        let mut entries = self.list_entries()?;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| Error::NotFound(format!("journal entry {}", id)))?;

        if let Some(date) = update.date {
            entry.date = date;
        }
        if let Some(emotion) = update.emotion {
            entry.emotion = emotion;
        }
        if let Some(event) = update.event {
            entry.event = event;
        }
        if let Some(realization) = update.realization {
            entry.realization = realization;
        }
        if update.self_esteem_score.is_some() {
            entry.self_esteem_score = update.self_esteem_score;
        }
        if update.worthlessness_score.is_some() {
            entry.worthlessness_score = update.worthlessness_score;
        }
        entry.updated_at = Some(self.clock.now().to_rfc3339());

        let updated = entry.clone();
        self.write_collection(ENTRIES_KEY, &entries)?;
        Ok(updated)
    }

    pub fn replace_entries(&self, entries: &[JournalEntry]) -> Result<()> {
        let _guard = self.lock()?;
        self.write_collection(ENTRIES_KEY, entries)
    }

    /// Merges pulled remote entries and replaces the entry key in one write.
    pub fn apply_pulled_entries(&self, remote: Vec<JournalEntry>) -> Result<MergeStats> {
        let _guard = self.lock()?;
        let local = self.list_entries()?;
        let (merged, stats) = merge_pulled_entries(local, remote);
        self.write_collection(ENTRIES_KEY, &merged)?;
        Ok(stats)
    }

    /// Binds pushed entries to their remote owner. Returns how many changed.
    pub fn bind_owner(&self, ids: &HashSet<String>, owner_id: &str) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock()?;
        let mut entries = self.list_entries()?;
        let mut changed = 0;
        for entry in entries.iter_mut() {
            if ids.contains(&entry.id) && entry.user_id.as_deref() != Some(owner_id) {
                entry.user_id = Some(owner_id.to_string());
                changed += 1;
            }
        }
        if changed > 0 {
            self.write_collection(ENTRIES_KEY, &entries)?;
        }
        Ok(changed)
    }

    /// The `limit` most recently created entries, newest first.
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut entries = self.list_entries()?;
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consent records
    // ─────────────────────────────────────────────────────────────────────────

    pub fn list_consent_records(&self) -> Result<Vec<ConsentRecord>> {
        self.read_collection(CONSENT_RECORDS_KEY)
    }

    /// Stores a consent record. Records are immutable, so a duplicate id is rejected.
    pub fn record_consent(&self, record: ConsentRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::invalid_input("Consent record id is required"));
        }
        let _guard = self.lock()?;
        let mut records = self.list_consent_records()?;
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(Error::invalid_input(format!(
                "Consent record {} already exists",
                record.id
            )));
        }
        records.push(record);
        self.write_collection(CONSENT_RECORDS_KEY, &records)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync metadata
    // ─────────────────────────────────────────────────────────────────────────

    pub fn sync_cursor(&self) -> Result<SyncCursor> {
        let last_sync_at = match self.store.get(SYNC_CURSOR_KEY)? {
            Some(raw) => match serde_json::from_str::<StoredCursor>(&raw) {
                Ok(stored) => stored.last_sync_at,
                Err(err) => {
                    warn!("[LocalJournal] Sync cursor is unreadable, resetting: {}", err);
                    None
                }
            },
            None => None,
        };

        let auto_sync_enabled = match self.store.get(AUTO_SYNC_ENABLED_KEY)? {
            Some(raw) => match raw.trim() {
                "true" => true,
                "false" => false,
                other => {
                    warn!(
                        "[LocalJournal] Unrecognised auto-sync flag '{}', using default",
                        other
                    );
                    true
                }
            },
            None => true,
        };

        Ok(SyncCursor {
            last_sync_at,
            auto_sync_enabled,
        })
    }

    pub fn record_sync(&self, at: DateTime<Utc>) -> Result<()> {
        let raw = serde_json::to_string(&StoredCursor {
            last_sync_at: Some(at),
        })?;
        self.store.set(SYNC_CURSOR_KEY, &raw)
    }

    pub fn set_auto_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .set(AUTO_SYNC_ENABLED_KEY, if enabled { "true" } else { "false" })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin aggregate
    // ─────────────────────────────────────────────────────────────────────────

    pub fn admin_entries(&self) -> Result<Vec<AdminAggregateEntry>> {
        self.read_collection(ADMIN_AGGREGATE_KEY)
    }

    /// Replaces the admin aggregate wholesale.
    pub fn replace_admin_entries(&self, entries: &[AdminAggregateEntry]) -> Result<()> {
        let _guard = self.lock()?;
        self.write_collection(ADMIN_AGGREGATE_KEY, entries)
    }

    /// Applies a counselor edit to a cached aggregate entry and returns the
    /// updated entry, ready for an operator push. Only `counselor_updated_at`
    /// is stamped; the owner's `updated_at` is left alone.
    pub fn update_admin_entry(&self, id: &str, update: CounselorUpdate) -> Result<JournalEntry> {
        let _guard = self.lock()?;
        let mut rows = self.admin_entries()?;
        let row = rows
            .iter_mut()
            .find(|row| row.entry.id == id)
            .ok_or_else(|| Error::NotFound(format!("aggregate entry {}", id)))?;

        if update.counselor_memo.is_some() {
            row.entry.counselor_memo = update.counselor_memo;
        }
        if update.is_visible_to_user.is_some() {
            row.entry.is_visible_to_user = update.is_visible_to_user;
        }
        if update.urgency_level.is_some() {
            row.entry.urgency_level = update.urgency_level;
        }
        if update.assigned_counselor.is_some() {
            row.entry.assigned_counselor = update.assigned_counselor;
        }
        row.entry.counselor_updated_at = Some(self.clock.now().to_rfc3339());

        let updated = row.entry.clone();
        self.write_collection(ADMIN_AGGREGATE_KEY, &rows)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLocalStore;
    use chrono::TimeZone;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn setup() -> (Arc<MemoryLocalStore>, LocalJournal) {
        let store = Arc::new(MemoryLocalStore::new());
        let clock = Arc::new(FixedClock(
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        ));
        let journal = LocalJournal::new(store.clone(), clock);
        (store, journal)
    }

    fn new_entry(emotion: &str) -> NewJournalEntry {
        NewJournalEntry {
            date: "2024-01-01".to_string(),
            emotion: emotion.to_string(),
            event: "event".to_string(),
            realization: "realization".to_string(),
            self_esteem_score: Some(30),
            worthlessness_score: Some(70),
        }
    }

    #[test]
    fn append_generates_unique_millisecond_ids() {
        let (_store, journal) = setup();

        let first = journal.append_entry(new_entry("worthlessness")).unwrap();
        let second = journal.append_entry(new_entry("sadness")).unwrap();

        assert_eq!(first.id, "1700000000000");
        assert_eq!(second.id, "1700000000001");
        assert_eq!(first.user_id, None);
        assert_eq!(journal.list_entries().unwrap().len(), 2);
    }

    #[test]
    fn corrupted_collection_reads_as_empty() {
        let (store, journal) = setup();
        store.set(ENTRIES_KEY, "{not json").unwrap();

        assert!(journal.list_entries().unwrap().is_empty());
        // Journaling keeps working on top of the unreadable value.
        journal.append_entry(new_entry("calm")).unwrap();
        assert_eq!(journal.list_entries().unwrap().len(), 1);
    }

    #[test]
    fn update_stamps_updated_at() {
        let (_store, journal) = setup();
        let entry = journal.append_entry(new_entry("anger")).unwrap();

        let updated = journal
            .update_entry(
                &entry.id,
                EntryUpdate {
                    emotion: Some("relief".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.emotion, "relief");
        assert!(updated.updated_at.is_some());
        assert!(matches!(
            journal.update_entry("missing", EntryUpdate::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn bind_owner_only_touches_listed_ids() {
        let (_store, journal) = setup();
        let first = journal.append_entry(new_entry("a")).unwrap();
        let second = journal.append_entry(new_entry("b")).unwrap();

        let ids = HashSet::from([first.id.clone()]);
        assert_eq!(journal.bind_owner(&ids, "u1").unwrap(), 1);
        assert_eq!(journal.bind_owner(&ids, "u1").unwrap(), 0);

        let entries = journal.list_entries().unwrap();
        let owner_of = |id: &str| {
            entries
                .iter()
                .find(|entry| entry.id == id)
                .and_then(|entry| entry.user_id.clone())
        };
        assert_eq!(owner_of(&first.id).as_deref(), Some("u1"));
        assert_eq!(owner_of(&second.id), None);
    }

    #[test]
    fn recent_entries_are_newest_first() {
        let (_store, journal) = setup();
        for emotion in ["a", "b", "c"] {
            journal.append_entry(new_entry(emotion)).unwrap();
        }

        let recent = journal.recent_entries(2).unwrap();
        let ids: Vec<_> = recent.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["1700000000002", "1700000000001"]);
    }

    #[test]
    fn consent_records_are_immutable() {
        let (_store, journal) = setup();
        let record = ConsentRecord {
            id: "not-canonical".to_string(),
            display_name: "alice".to_string(),
            consent_given: true,
            consent_date: "2024-01-01T00:00:00Z".to_string(),
            user_agent: None,
            ip_address: None,
        };

        journal.record_consent(record.clone()).unwrap();
        assert!(journal.record_consent(record).is_err());
        assert_eq!(journal.list_consent_records().unwrap().len(), 1);
    }

    #[test]
    fn sync_cursor_round_trips_through_store() {
        let (store, journal) = setup();
        assert_eq!(journal.sync_cursor().unwrap(), SyncCursor::default());

        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        journal.record_sync(at).unwrap();
        journal.set_auto_sync_enabled(false).unwrap();

        let cursor = journal.sync_cursor().unwrap();
        assert_eq!(cursor.last_sync_at, Some(at));
        assert!(!cursor.auto_sync_enabled);
        assert_eq!(
            store.get(AUTO_SYNC_ENABLED_KEY).unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn counselor_update_edits_admin_cache() {
        let (_store, journal) = setup();
        let entry = journal.append_entry(new_entry("fear")).unwrap();
        let owner_stamp = entry.updated_at.clone();
        journal
            .replace_admin_entries(&[AdminAggregateEntry {
                display_name: "alice".to_string(),
                entry,
            }])
            .unwrap();

        let updated = journal
            .update_admin_entry(
                "1700000000000",
                CounselorUpdate {
                    counselor_memo: Some("follow up".to_string()),
                    urgency_level: Some("high".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.counselor_memo.as_deref(), Some("follow up"));
        assert!(updated.counselor_updated_at.is_some());
        assert_eq!(updated.updated_at, owner_stamp);
        let cached = journal.admin_entries().unwrap();
        assert_eq!(cached[0].entry.urgency_level.as_deref(), Some("high"));
    }
}
