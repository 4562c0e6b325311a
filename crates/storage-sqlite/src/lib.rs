//! SQLite storage for the journal's local key/value data.

pub mod db;
pub mod errors;
pub mod kv;
mod schema;

pub use kv::SqliteLocalStore;
