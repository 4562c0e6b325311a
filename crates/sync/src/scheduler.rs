//! Timer-driven, manual and forced sync passes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use journal_core::sync::{
    SkipReason, SyncOutcome, SyncStatus, SyncTrigger, AUTO_SYNC_INITIAL_DELAY_SECS,
    AUTO_SYNC_INTERVAL_SECS, FORCED_SYNC_SETTLE_MILLIS, RECENT_SUBSET_SIZE,
};

use crate::admin::AdminAggregator;
use crate::engine::SyncEngine;
use crate::identity::{BootstrapIdentityResolver, IdentityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Pause between push and pull in a forced pass.
    pub forced_settle: Duration,
    pub recent_subset_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(AUTO_SYNC_INITIAL_DELAY_SECS),
            interval: Duration::from_secs(AUTO_SYNC_INTERVAL_SECS),
            forced_settle: Duration::from_millis(FORCED_SYNC_SETTLE_MILLIS),
            recent_subset_size: RECENT_SUBSET_SIZE,
        }
    }
}

/// Marks a pass for one identity as running until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a StdMutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut set) => {
                set.remove(&self.key);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.key);
            }
        }
    }
}

/// Runs sync passes for the session identity.
///
/// One initial pass fires after `initial_delay`, then one every `interval`.
/// Each firing spawns its pass as a separate task, so [`stop`](Self::stop)
/// cancels future firings but never a pass that has already begun. Passes for
/// the same identity never overlap: a trigger arriving while one runs returns
/// `Skipped(InFlight)`.
pub struct AutoSyncScheduler {
    engine: Arc<SyncEngine>,
    identity: Arc<dyn IdentityProvider>,
    resolver: Option<Arc<BootstrapIdentityResolver>>,
    admin: Option<Arc<AdminAggregator>>,
    settings: SchedulerSettings,
    background_task: Mutex<Option<JoinHandle<()>>>,
    in_flight: StdMutex<HashSet<String>>,
    offline: AtomicBool,
    last_error: StdMutex<Option<String>>,
}

impl AutoSyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        identity: Arc<dyn IdentityProvider>,
        resolver: Option<Arc<BootstrapIdentityResolver>>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            identity,
            resolver,
            admin: None,
            settings,
            background_task: Mutex::new(None),
            in_flight: StdMutex::new(HashSet::new()),
            offline: AtomicBool::new(false),
            last_error: StdMutex::new(None),
        }
    }

    /// Refresh the operator aggregate at the end of forced passes.
    pub fn with_admin(mut self, admin: Arc<AdminAggregator>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    fn auto_sync_enabled(&self) -> bool {
        match self.engine.journal().sync_cursor() {
            Ok(cursor) => cursor.auto_sync_enabled,
            Err(err) => {
                warn!("[AutoSync] Could not read sync cursor: {}", err);
                true
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts the timer loop. Returns whether a loop is running afterwards.
    pub async fn start(self: &Arc<Self>) -> bool {
        if !self.auto_sync_enabled() {
            debug!("[AutoSync] Not starting: auto-sync is disabled");
            return false;
        }
        if !self.identity.has_valid_session() {
            debug!("[AutoSync] Not starting: no session identity");
            return false;
        }
        if !self.engine.is_remote_configured() {
            debug!("[AutoSync] Not starting: remote is not configured");
            return false;
        }

        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return true;
            }
            guard.take();
        }

        let scheduler = Arc::clone(self);
        let initial_delay = self.settings.initial_delay;
        let interval = self.settings.interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            scheduler.spawn_pass(SyncTrigger::Initial);
            loop {
                tokio::time::sleep(interval).await;
                scheduler.spawn_pass(SyncTrigger::Periodic);
            }
        });
        *guard = Some(handle);
        info!(
            "[AutoSync] Started: first pass in {}s, then every {}s",
            initial_delay.as_secs(),
            interval.as_secs()
        );
        true
    }

    /// Cancels pending timer firings. A pass already running completes.
    pub async fn stop(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            info!("[AutoSync] Stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Persists the switch, starts the loop and runs a forced pass.
    pub async fn enable(self: &Arc<Self>) -> journal_core::Result<SyncOutcome> {
        self.engine.journal().set_auto_sync_enabled(true)?;
        self.start().await;
        Ok(self.trigger_forced().await)
    }

    pub async fn disable(&self) -> journal_core::Result<()> {
        self.engine.journal().set_auto_sync_enabled(false)?;
        self.stop().await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Triggers
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn trigger_now(&self) -> SyncOutcome {
        self.run_pass(SyncTrigger::Manual).await
    }

    pub async fn trigger_forced(&self) -> SyncOutcome {
        self.run_pass(SyncTrigger::Forced).await
    }

    /// Pushes the most recent entries after a local save.
    pub async fn on_entry_saved(&self) -> SyncOutcome {
        self.run_pass(SyncTrigger::EntrySaved).await
    }

    fn spawn_pass(self: &Arc<Self>, trigger: SyncTrigger) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_pass(trigger).await;
        });
    }

    fn begin(&self, key: &str) -> Option<InFlightGuard<'_>> {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            key: key.to_string(),
        })
    }

    pub async fn run_pass(&self, trigger: SyncTrigger) -> SyncOutcome {
        if trigger.is_automatic() && !self.auto_sync_enabled() {
            debug!("[AutoSync] {:?} pass skipped: auto-sync disabled", trigger);
            return SyncOutcome::skipped(SkipReason::Disabled);
        }

        let display_name = match self.identity.display_name() {
            Some(name) if self.identity.has_valid_session() => name,
            _ => {
                debug!("[AutoSync] {:?} pass skipped: no identity", trigger);
                return SyncOutcome::skipped(SkipReason::NoIdentity);
            }
        };

        let Some(resolver) = self
            .resolver
            .as_ref()
            .filter(|_| self.engine.is_remote_configured())
        else {
            return self.finish(SyncOutcome::skipped(SkipReason::RemoteUnconfigured));
        };

        let Some(_guard) = self.begin(&display_name) else {
            debug!(
                "[AutoSync] {:?} pass for '{}' coalesced with the running pass",
                trigger, display_name
            );
            return SyncOutcome::skipped(SkipReason::InFlight);
        };

        let owner = match resolver.resolve(&display_name).await {
            Ok(user) => user,
            Err(err) if err.is_unreachable() => {
                warn!("[AutoSync] Identity lookup failed, remote unreachable: {}", err);
                return self.finish(SyncOutcome::skipped(SkipReason::RemoteUnreachable));
            }
            Err(err) => {
                warn!("[AutoSync] Identity lookup failed: {}", err);
                return self.finish(SyncOutcome::fatal(format!("Identity lookup failed: {}", err)));
            }
        };

        debug!("[AutoSync] {:?} pass for '{}' started", trigger, display_name);
        let outcome = match trigger {
            SyncTrigger::EntrySaved => {
                self.engine
                    .push_recent_subset(&owner.id, self.settings.recent_subset_size)
                    .await
            }
            SyncTrigger::Forced => self.forced_pass(&owner.id).await,
            SyncTrigger::Initial | SyncTrigger::Periodic | SyncTrigger::Manual => {
                self.full_pass(&owner.id).await
            }
        };
        info!(
            "[AutoSync] {:?} pass for '{}' finished: {} ({} ok, {} failed)",
            trigger,
            display_name,
            outcome.status_code(),
            outcome.success_count(),
            outcome.error_count()
        );
        self.finish(outcome)
    }

    async fn full_pass(&self, owner_id: &str) -> SyncOutcome {
        let pushed = self.engine.push_local_entries(owner_id).await;
        if pushed.skip_reason().is_some() {
            return pushed;
        }
        let pulled = self.engine.pull_entries(owner_id).await;
        let consent = self.engine.push_consent_records().await;
        pushed.combine(pulled).combine(consent)
    }

    async fn forced_pass(&self, owner_id: &str) -> SyncOutcome {
        let pushed = self.engine.push_local_entries(owner_id).await;
        if pushed.skip_reason().is_some() {
            return pushed;
        }
        tokio::time::sleep(self.settings.forced_settle).await;
        let pulled = self.engine.pull_entries(owner_id).await;
        let consent = self.engine.push_consent_records().await;

        if let Some(admin) = self.admin.as_ref() {
            let result = admin.run().await;
            if !result.outcome.is_success() {
                warn!(
                    "[AutoSync] Admin refresh finished with status {} ({} user failures)",
                    result.outcome.status_code(),
                    result.per_user_failures.len()
                );
            }
        }

        pushed.combine(pulled).combine(consent)
    }

    /// Updates transient status and the persisted cursor from an outcome.
    fn finish(&self, outcome: SyncOutcome) -> SyncOutcome {
        match &outcome {
            SyncOutcome::Success { .. } | SyncOutcome::Partial { .. } => {
                self.offline.store(false, Ordering::SeqCst);
                let journal = self.engine.journal();
                if let Err(err) = journal.record_sync(journal.clock().now()) {
                    warn!("[AutoSync] Failed to record sync time: {}", err);
                }
                let error = (outcome.error_count() > 0)
                    .then(|| format!("{} record(s) failed to sync", outcome.error_count()));
                self.set_last_error(error);
            }
            SyncOutcome::Skipped { reason } if reason.is_offline() => {
                self.offline.store(true, Ordering::SeqCst);
            }
            SyncOutcome::Skipped { .. } => {}
            SyncOutcome::Fatal { reason } => self.set_last_error(Some(reason.clone())),
        }
        outcome
    }

    fn set_last_error(&self, error: Option<String>) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    pub fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn status(&self) -> SyncStatus {
        let syncing = match self.in_flight.lock() {
            Ok(set) => !set.is_empty(),
            Err(poisoned) => !poisoned.into_inner().is_empty(),
        };
        if syncing {
            return SyncStatus::Syncing;
        }
        if self.offline.load(Ordering::SeqCst) {
            return SyncStatus::Offline;
        }
        match self.engine.journal().sync_cursor() {
            Ok(cursor) => match cursor.last_sync_at {
                Some(at) => SyncStatus::Synced { at },
                None => SyncStatus::NeverSynced,
            },
            Err(err) => {
                warn!("[AutoSync] Could not read sync cursor: {}", err);
                SyncStatus::NeverSynced
            }
        }
    }

    /// `status()` rendered relative to the journal clock.
    pub fn describe_status(&self) -> String {
        self.status().describe(self.engine.journal().clock().now())
    }
}
