//! Start-up wiring of the sync services.

use std::sync::Arc;

use log::{info, warn};

use journal_core::journal::LocalJournal;
use journal_core::storage::LocalStore;
use journal_core::Clock;

use crate::admin::AdminAggregator;
use crate::client::RemoteClient;
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::identity::{BootstrapIdentityResolver, IdentityProvider};
use crate::scheduler::{AutoSyncScheduler, SchedulerSettings};
use crate::store::RemoteStore;

/// Collaborators shared by every sync service, built once at start-up.
pub struct SyncContext {
    local: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityProvider>,
    journal: Arc<LocalJournal>,
}

/// Services built from a [`SyncContext`].
pub struct SyncServices {
    pub journal: Arc<LocalJournal>,
    pub engine: Arc<SyncEngine>,
    /// Present only in operator mode.
    pub admin: Option<Arc<AdminAggregator>>,
    pub scheduler: Arc<AutoSyncScheduler>,
}

impl SyncContext {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let journal = Arc::new(LocalJournal::new(Arc::clone(&local), Arc::clone(&clock)));
        Self {
            local,
            remote,
            clock,
            identity,
            journal,
        }
    }

    /// Builds the context with a REST remote from `config`. A missing or
    /// invalid remote configuration leaves the context local-only.
    pub fn from_config(
        config: &SyncConfig,
        local: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let remote: Option<Arc<dyn RemoteStore>> = match config.remote_credentials() {
            Some((url, key)) => match RemoteClient::new(url, key) {
                Ok(client) => {
                    info!("[JournalSync] Remote configured at {}", url);
                    Some(Arc::new(client))
                }
                Err(err) => {
                    warn!(
                        "[JournalSync] Remote client unavailable, running local-only: {}",
                        err
                    );
                    None
                }
            },
            None => {
                info!("[JournalSync] No remote configured, running local-only");
                None
            }
        };
        Self::new(local, remote, clock, identity)
    }

    pub fn local(&self) -> Arc<dyn LocalStore> {
        Arc::clone(&self.local)
    }

    pub fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.identity)
    }

    pub fn journal(&self) -> Arc<LocalJournal> {
        Arc::clone(&self.journal)
    }

    pub fn services(&self, settings: SchedulerSettings, operator_mode: bool) -> SyncServices {
        let engine = Arc::new(SyncEngine::new(self.journal(), self.remote()));
        let resolver = self
            .remote()
            .map(|remote| Arc::new(BootstrapIdentityResolver::new(remote)));
        let admin = operator_mode.then(|| {
            Arc::new(AdminAggregator::new(
                self.journal(),
                self.remote(),
                Arc::clone(&engine),
            ))
        });

        let mut scheduler =
            AutoSyncScheduler::new(Arc::clone(&engine), self.identity(), resolver, settings);
        if let Some(admin) = admin.as_ref() {
            scheduler = scheduler.with_admin(Arc::clone(admin));
        }

        SyncServices {
            journal: self.journal(),
            engine,
            admin,
            scheduler: Arc::new(scheduler),
        }
    }
}
