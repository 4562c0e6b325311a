//! Key/value persistence contract for client-resident journal data.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::{Error, Result};

/// Storage key for the local journal entry collection.
pub const ENTRIES_KEY: &str = "journal_entries";
/// Storage key for locally captured consent records.
pub const CONSENT_RECORDS_KEY: &str = "consent_records";
/// Storage key for the sync cursor (last successful sync time).
pub const SYNC_CURSOR_KEY: &str = "sync_cursor";
/// Storage key for the persisted auto-sync switch.
pub const AUTO_SYNC_ENABLED_KEY: &str = "auto_sync_enabled";
/// Storage key for the operator-wide aggregate of every user's entries.
pub const ADMIN_AGGREGATE_KEY: &str = "admin_all_entries";

/// String key/value store. A `set` replaces the whole value for the key in one write.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store used when no database path is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| Error::internal("Local store lock is poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| Error::internal("Local store lock is poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
