//! Persisted sync cursor and user-facing sync status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-profile sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub auto_sync_enabled: bool,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self {
            last_sync_at: None,
            auto_sync_enabled: true,
        }
    }
}

/// Status surfaced to status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    NeverSynced,
    Synced { at: DateTime<Utc> },
    Syncing,
    Offline,
}

impl SyncStatus {
    /// Human-readable form: `never-synced`, `synced 5 minutes ago`, `syncing`, `offline`.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::NeverSynced => "never-synced".to_string(),
            Self::Synced { at } => format!("synced {}", relative_time(*at, now)),
            Self::Syncing => "syncing".to_string(),
            Self::Offline => "offline".to_string(),
        }
    }
}

fn plural(value: i64, unit: &str) -> String {
    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}

/// Coarse relative time between `at` and `now`.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds().max(0);
    match seconds {
        0..=59 => "just now".to_string(),
        60..=3_599 => plural(seconds / 60, "minute"),
        3_600..=86_399 => plural(seconds / 3_600, "hour"),
        _ => plural(seconds / 86_400, "day"),
    }
}
