//! SQLite-backed [`LocalStore`].

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;

use journal_core::storage::LocalStore;
use journal_core::Result;

use super::model::LocalKvDB;
use crate::db::{create_pool, get_connection, run_migrations, DbPool};
use crate::errors::StorageError;
use crate::schema::local_kv;

/// Journal collections and sync metadata persisted in one SQLite table.
///
/// Each `set` is a single upsert of the whole value, so readers see either the
/// previous or the new collection.
pub struct SqliteLocalStore {
    pool: Arc<DbPool>,
}

impl SqliteLocalStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Runs pending migrations and opens a pool on `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        run_migrations(db_path)?;
        let pool = create_pool(db_path)?;
        Ok(Self::new(pool))
    }

    /// Keys currently stored, in key order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let keys = local_kv::table
            .select(local_kv::key)
            .order(local_kv::key.asc())
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(keys)
    }
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let row = local_kv::table
            .find(key)
            .first::<LocalKvDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(|r| r.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        let row = LocalKvDB {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now.clone(),
        };

        diesel::insert_into(local_kv::table)
            .values(&row)
            .on_conflict(local_kv::key)
            .do_update()
            .set((local_kv::value.eq(value), local_kv::updated_at.eq(now)))
            .execute(&mut conn)
            .map_err(StorageError::from)?;

        Ok(())
    }
}
