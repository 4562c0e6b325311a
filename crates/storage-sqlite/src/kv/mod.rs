//! SQLite persistence for the local journal key/value store.

mod model;
mod repository;

pub use model::LocalKvDB;
pub use repository::SqliteLocalStore;
