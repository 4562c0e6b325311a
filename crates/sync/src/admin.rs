//! Operator view: every user's remote entries in one cached collection.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use journal_core::journal::{AdminAggregateEntry, CounselorUpdate, JournalEntry, LocalJournal};
use journal_core::sync::{SkipReason, SyncOutcome, ADMIN_FETCH_CONCURRENCY};

use crate::engine::SyncEngine;
use crate::error::RemoteError;
use crate::store::RemoteStore;
use crate::types::{decode_row, EntryRow, ListFilter, Resource, SortOrder, UserRow};

/// A user whose entries could not be fetched during an admin run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFetchFailure {
    pub user_id: String,
    pub display_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRunResult {
    pub outcome: SyncOutcome,
    pub per_user_failures: Vec<UserFetchFailure>,
    pub entry_count: usize,
}

impl AdminRunResult {
    fn without_fetch(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            per_user_failures: Vec::new(),
            entry_count: 0,
        }
    }
}

pub struct AdminAggregator {
    journal: Arc<LocalJournal>,
    remote: Option<Arc<dyn RemoteStore>>,
    engine: Arc<SyncEngine>,
    concurrency: usize,
}

impl AdminAggregator {
    pub fn new(
        journal: Arc<LocalJournal>,
        remote: Option<Arc<dyn RemoteStore>>,
        engine: Arc<SyncEngine>,
    ) -> Self {
        Self {
            journal,
            remote,
            engine,
            concurrency: ADMIN_FETCH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Rebuilds the aggregate cache from the remote.
    ///
    /// Users are fetched with bounded concurrency and kept in listing order.
    /// A user whose entries cannot be read is reported and left out; only a
    /// failure to list users fails the run. When every user fetch fails
    /// because the remote went away, the existing cache is kept.
    pub async fn run(&self) -> AdminRunResult {
        let Some(remote) = self.remote.as_ref() else {
            return AdminRunResult::without_fetch(SyncOutcome::skipped(
                SkipReason::RemoteUnconfigured,
            ));
        };

        let user_rows = match remote
            .list(
                Resource::Users,
                &ListFilter::all().order_by("created_at", SortOrder::Asc),
            )
            .await
        {
            Ok(rows) => rows,
            Err(err) if err.is_unreachable() => {
                warn!("[AdminAggregate] Remote unreachable, keeping cached aggregate: {}", err);
                return AdminRunResult::without_fetch(SyncOutcome::skipped(
                    SkipReason::RemoteUnreachable,
                ));
            }
            Err(err) => {
                warn!("[AdminAggregate] Failed to list users: {}", err);
                return AdminRunResult::without_fetch(SyncOutcome::fatal(format!(
                    "Failed to list users: {}",
                    err
                )));
            }
        };

        let mut failures = Vec::new();
        let mut users = Vec::with_capacity(user_rows.len());
        for row in user_rows {
            match decode_row::<UserRow>(row) {
                Ok(user) => users.push(user),
                Err(err) => failures.push(UserFetchFailure {
                    user_id: String::new(),
                    display_name: String::new(),
                    reason: err.to_string(),
                }),
            }
        }

        let fetched: Vec<(UserRow, Result<Vec<serde_json::Value>, RemoteError>)> =
            stream::iter(users)
                .map(|user| async move {
                    let rows = remote
                        .list(Resource::Entries, &ListFilter::eq("user_id", user.id.as_str()))
                        .await;
                    (user, rows)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let user_count = fetched.len();
        let mut aggregate = Vec::new();
        let mut loaded_users = 0;
        let mut unreachable_users = 0;
        for (user, result) in fetched {
            match result {
                Ok(rows) => {
                    loaded_users += 1;
                    for row in rows {
                        match decode_row::<EntryRow>(row) {
                            Ok(row) => aggregate.push(AdminAggregateEntry {
                                display_name: user.display_name.clone(),
                                entry: JournalEntry::from(row),
                            }),
                            Err(err) => warn!(
                                "[AdminAggregate] Skipping undecodable entry of '{}': {}",
                                user.display_name, err
                            ),
                        }
                    }
                }
                Err(err) => {
                    if err.is_unreachable() {
                        unreachable_users += 1;
                    }
                    warn!(
                        "[AdminAggregate] Failed to fetch entries of '{}': {}",
                        user.display_name, err
                    );
                    failures.push(UserFetchFailure {
                        user_id: user.id,
                        display_name: user.display_name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if user_count > 0 && unreachable_users == user_count {
            return AdminRunResult {
                outcome: SyncOutcome::skipped(SkipReason::RemoteUnreachable),
                per_user_failures: failures,
                entry_count: 0,
            };
        }

        if let Err(err) = self.journal.replace_admin_entries(&aggregate) {
            return AdminRunResult {
                outcome: SyncOutcome::fatal(format!("Failed to store aggregate: {}", err)),
                per_user_failures: failures,
                entry_count: 0,
            };
        }

        info!(
            "[AdminAggregate] Cached {} entries from {} users ({} failed)",
            aggregate.len(),
            loaded_users,
            failures.len()
        );
        AdminRunResult {
            outcome: SyncOutcome::from_counts(loaded_users, failures.len()),
            per_user_failures: failures,
            entry_count: aggregate.len(),
        }
    }

    pub fn cached_entries(&self) -> journal_core::Result<Vec<AdminAggregateEntry>> {
        self.journal.admin_entries()
    }

    /// Applies a counselor edit to the cached aggregate and pushes it.
    pub async fn apply_counselor_update(
        &self,
        entry_id: &str,
        update: CounselorUpdate,
    ) -> journal_core::Result<SyncOutcome> {
        let entry = self.journal.update_admin_entry(entry_id, update)?;
        debug!("[AdminAggregate] Pushing counselor edit of {}", entry_id);
        Ok(self.engine.push_operator_edits(&[entry]).await)
    }
}
