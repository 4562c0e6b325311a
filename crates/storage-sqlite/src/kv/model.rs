//! Database model for the local key/value table.

use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(key))]
#[diesel(table_name = crate::schema::local_kv)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LocalKvDB {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
