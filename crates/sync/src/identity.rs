//! Session identity and remote user bootstrap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use tokio::sync::Mutex;

use journal_core::journal::UserRecord;

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use crate::types::{decode_row, ListFilter, NewUserRow, Resource, UserRow};

/// Supplies the display name of the signed-in profile.
pub trait IdentityProvider: Send + Sync {
    fn display_name(&self) -> Option<String>;

    fn has_valid_session(&self) -> bool {
        self.display_name().is_some()
    }
}

/// Identity held in memory, set by whoever owns the session.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    display_name: RwLock<Option<String>>,
}

impl StaticIdentity {
    pub fn new(display_name: Option<String>) -> Self {
        let identity = Self::default();
        if let Some(name) = display_name {
            identity.set(name);
        }
        identity
    }

    pub fn set(&self, display_name: impl Into<String>) {
        let name = display_name.into();
        let value = Some(name.trim().to_string()).filter(|name| !name.is_empty());
        match self.display_name.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn clear(&self) {
        match self.display_name.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn display_name(&self) -> Option<String> {
        match self.display_name.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Get-or-create of the remote user row for a display name.
///
/// Resolution is serialised per resolver and cached per display name for the
/// lifetime of the resolver. A concurrent creation elsewhere shows up as a
/// unique-key conflict, which is answered by reading the row that won.
pub struct BootstrapIdentityResolver {
    remote: Arc<dyn RemoteStore>,
    cache: Mutex<HashMap<String, UserRecord>>,
}

impl BootstrapIdentityResolver {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, display_name: &str) -> Result<UserRecord> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(RemoteError::invalid_request("Display name is required"));
        }

        let mut cache = self.cache.lock().await;
        if let Some(user) = cache.get(name) {
            return Ok(user.clone());
        }

        let user = match self.lookup(name).await? {
            Some(user) => {
                debug!("[Bootstrap] Found existing user for '{}'", name);
                user
            }
            None => self.create(name).await?,
        };
        cache.insert(name.to_string(), user.clone());
        Ok(user)
    }

    /// Drops the cached identity for `display_name`; the next resolve re-reads it.
    pub async fn forget(&self, display_name: &str) {
        self.cache.lock().await.remove(display_name.trim());
    }

    async fn lookup(&self, name: &str) -> Result<Option<UserRecord>> {
        let rows = self
            .remote
            .list(Resource::Users, &ListFilter::eq("display_name", name).limit(1))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(decode_row::<UserRow>(row)?.into())),
            None => Ok(None),
        }
    }

    async fn create(&self, name: &str) -> Result<UserRecord> {
        let row = serde_json::to_value(NewUserRow {
            display_name: name.to_string(),
        })?;

        match self.remote.insert(Resource::Users, row).await {
            Ok(created) => {
                info!("[Bootstrap] Created remote user for '{}'", name);
                // Re-read so every caller sees the same stored row.
                match self.lookup(name).await? {
                    Some(user) => Ok(user),
                    None => Ok(decode_row::<UserRow>(created)?.into()),
                }
            }
            Err(err) if err.is_conflict() => {
                warn!(
                    "[Bootstrap] User '{}' was created concurrently, re-reading",
                    name
                );
                self.lookup(name).await?.ok_or_else(|| {
                    RemoteError::invalid_response(format!(
                        "User '{}' conflicted on create but is not listed",
                        name
                    ))
                })
            }
            Err(err) => Err(err),
        }
    }
}
