//! Merge rules shared by push and pull.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::journal::JournalEntry;

/// Trigger source for sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// First pass after the scheduler starts.
    Initial,
    Periodic,
    Manual,
    /// Push, settle, pull, then refresh the admin aggregate.
    Forced,
    /// Lightweight push of the most recent entries after a local save.
    EntrySaved,
}

impl SyncTrigger {
    /// Triggers that fire without an explicit user request. These are
    /// suppressed while auto-sync is disabled.
    pub fn is_automatic(self) -> bool {
        matches!(self, Self::Initial | Self::Periodic | Self::EntrySaved)
    }
}

/// Returns true when `candidate` is a strictly later timestamp than `baseline`.
///
/// Timestamps are compared by value when both parse as RFC 3339, lexically
/// otherwise. A missing timestamp on either side never wins.
pub fn is_strictly_newer(candidate: Option<&str>, baseline: Option<&str>) -> bool {
    let (Some(candidate), Some(baseline)) = (candidate, baseline) else {
        return false;
    };

    let candidate_parsed =
        chrono::DateTime::parse_from_rfc3339(candidate).map(|dt| dt.timestamp_millis());
    let baseline_parsed =
        chrono::DateTime::parse_from_rfc3339(baseline).map(|dt| dt.timestamp_millis());

    if let (Ok(candidate_ts), Ok(baseline_ts)) = (candidate_parsed, baseline_parsed) {
        return candidate_ts > baseline_ts;
    }

    // Fallback to lexical ordering when one/both timestamps are non-RFC3339.
    candidate > baseline
}

/// Counts produced by merging pulled entries into the local collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub inserted: usize,
    pub overwritten: usize,
    pub kept_local: usize,
}

/// Merges remote entries into the local collection keyed by id.
///
/// Owner fields come from the remote copy unless the local copy carries a
/// strictly newer `updated_at`. Counselor fields are resolved the same way on
/// `counselor_updated_at`, independently of the owner fields. Local order is
/// preserved; entries only known remotely are appended in remote order.
pub fn merge_pulled_entries(
    local: Vec<JournalEntry>,
    remote: Vec<JournalEntry>,
) -> (Vec<JournalEntry>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut remote_order = Vec::with_capacity(remote.len());
    let mut remote_by_id: HashMap<String, JournalEntry> = HashMap::with_capacity(remote.len());
    for entry in remote {
        if !remote_by_id.contains_key(&entry.id) {
            remote_order.push(entry.id.clone());
        }
        remote_by_id.insert(entry.id.clone(), entry);
    }

    let mut merged = Vec::with_capacity(local.len() + remote_by_id.len());
    for local_entry in local {
        match remote_by_id.remove(&local_entry.id) {
            Some(remote_entry) => {
                let owner_local = is_strictly_newer(
                    local_entry.updated_at.as_deref(),
                    remote_entry.updated_at.as_deref(),
                );
                let counselor_local = is_strictly_newer(
                    local_entry.counselor_updated_at.as_deref(),
                    remote_entry.counselor_updated_at.as_deref(),
                );
                let (mut winner, other) = if owner_local {
                    stats.kept_local += 1;
                    (local_entry, remote_entry)
                } else {
                    stats.overwritten += 1;
                    (remote_entry, local_entry)
                };
                if owner_local != counselor_local {
                    winner.take_counselor_fields(&other);
                }
                merged.push(winner);
            }
            None => merged.push(local_entry),
        }
    }

    for id in remote_order {
        if let Some(remote_entry) = remote_by_id.remove(&id) {
            stats.inserted += 1;
            merged.push(remote_entry);
        }
    }

    (merged, stats)
}
