//! Port to the hosted record store.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ListFilter, Resource};

/// Generic record access against the hosted backend.
///
/// Rows travel as JSON objects; callers decode them into the row types in
/// [`crate::types`]. Implementations must report transport failures with an
/// error whose [`is_unreachable`](crate::RemoteError::is_unreachable) is true so
/// the engine can tell an offline backend from a rejected record.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self, resource: Resource, filter: &ListFilter) -> Result<Vec<Value>>;

    async fn get_by_id(&self, resource: Resource, id: &str) -> Result<Option<Value>>;

    /// Inserts one row and returns the stored representation.
    async fn insert(&self, resource: Resource, row: Value) -> Result<Value>;

    async fn update(&self, resource: Resource, id: &str, patch: Value) -> Result<()>;

    async fn delete(&self, resource: Resource, id: &str) -> Result<()>;
}
