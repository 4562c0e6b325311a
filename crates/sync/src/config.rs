//! Configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::scheduler::SchedulerSettings;

pub const REMOTE_URL_VAR: &str = "JOURNAL_REMOTE_URL";
pub const REMOTE_API_KEY_VAR: &str = "JOURNAL_REMOTE_API_KEY";
pub const DB_PATH_VAR: &str = "JOURNAL_DB_PATH";
pub const DISPLAY_NAME_VAR: &str = "JOURNAL_DISPLAY_NAME";
pub const OPERATOR_MODE_VAR: &str = "JOURNAL_OPERATOR_MODE";
pub const INITIAL_DELAY_VAR: &str = "JOURNAL_SYNC_INITIAL_DELAY_SECS";
pub const INTERVAL_VAR: &str = "JOURNAL_SYNC_INTERVAL_SECS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncConfig {
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    /// Data directory holding the SQLite database. Unset keeps data in memory.
    pub db_path: Option<PathBuf>,
    pub display_name: Option<String>,
    pub operator_mode: bool,
    pub initial_delay_secs: Option<u64>,
    pub interval_secs: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(name: &str, value: Option<String>) -> Option<u64> {
    let value = non_empty(value)?;
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!("[JournalSync] Ignoring invalid {}='{}'", name, value);
            None
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let operator_mode = non_empty(lookup(OPERATOR_MODE_VAR))
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            remote_url: non_empty(lookup(REMOTE_URL_VAR))
                .map(|v| v.trim_end_matches('/').to_string()),
            remote_api_key: non_empty(lookup(REMOTE_API_KEY_VAR)),
            db_path: non_empty(lookup(DB_PATH_VAR)).map(PathBuf::from),
            display_name: non_empty(lookup(DISPLAY_NAME_VAR)),
            operator_mode,
            initial_delay_secs: parse_secs(INITIAL_DELAY_VAR, lookup(INITIAL_DELAY_VAR)),
            interval_secs: parse_secs(INTERVAL_VAR, lookup(INTERVAL_VAR)),
        }
    }

    /// URL and key when both are present.
    pub fn remote_credentials(&self) -> Option<(&str, &str)> {
        match (self.remote_url.as_deref(), self.remote_api_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let mut settings = SchedulerSettings::default();
        if let Some(secs) = self.initial_delay_secs {
            settings.initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.interval_secs {
            settings.interval = Duration::from_secs(secs);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn blank_values_are_unset() {
        let cfg = config(&[
            (REMOTE_URL_VAR, "   "),
            (REMOTE_API_KEY_VAR, "key"),
            (DISPLAY_NAME_VAR, ""),
        ]);

        assert_eq!(cfg.remote_url, None);
        assert_eq!(cfg.display_name, None);
        assert!(cfg.remote_credentials().is_none());
    }

    #[test]
    fn reads_remote_and_overrides() {
        let cfg = config(&[
            (REMOTE_URL_VAR, "https://journal.example.co/"),
            (REMOTE_API_KEY_VAR, " anon "),
            (OPERATOR_MODE_VAR, "TRUE"),
            (INITIAL_DELAY_VAR, "5"),
            (INTERVAL_VAR, "not-a-number"),
        ]);

        assert_eq!(
            cfg.remote_credentials(),
            Some(("https://journal.example.co", "anon"))
        );
        assert!(cfg.operator_mode);

        let settings = cfg.scheduler_settings();
        assert_eq!(settings.initial_delay, Duration::from_secs(5));
        assert_eq!(settings.interval, SchedulerSettings::default().interval);
    }
}
