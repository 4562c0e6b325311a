//! Unified result of every sync operation.

use serde::{Deserialize, Serialize};

/// Why an operation did not touch the remote at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No remote client could be built from configuration.
    RemoteUnconfigured,
    /// The remote did not answer (offline, DNS, timeout, gateway errors).
    RemoteUnreachable,
    /// No display name or no valid session.
    NoIdentity,
    /// Auto-sync is switched off.
    Disabled,
    /// Another pass for the same identity is still running.
    InFlight,
}

impl SkipReason {
    pub fn is_offline(self) -> bool {
        matches!(self, Self::RemoteUnconfigured | Self::RemoteUnreachable)
    }
}

/// Outcome of a sync operation. Callers branch on this instead of error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Success {
        success_count: usize,
    },
    Partial {
        success_count: usize,
        error_count: usize,
    },
    Skipped {
        reason: SkipReason,
    },
    Fatal {
        reason: String,
    },
}

impl SyncOutcome {
    /// Builds `Success` when nothing failed, `Partial` otherwise.
    pub fn from_counts(success_count: usize, error_count: usize) -> Self {
        if error_count == 0 {
            Self::Success { success_count }
        } else {
            Self::Partial {
                success_count,
                error_count,
            }
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    pub fn success_count(&self) -> usize {
        match self {
            Self::Success { success_count } | Self::Partial { success_count, .. } => {
                *success_count
            }
            _ => 0,
        }
    }

    pub fn error_count(&self) -> usize {
        match self {
            Self::Partial { error_count, .. } => *error_count,
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// True for `Success` and `Partial`: the remote was reached and the pass ran.
    pub fn completed(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Partial { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Folds the outcome of a later step of the same pass into this one.
    ///
    /// `Fatal` dominates `Skipped`, which dominates counted outcomes.
    pub fn combine(self, other: SyncOutcome) -> SyncOutcome {
        match (self, other) {
            (fatal @ Self::Fatal { .. }, _) | (_, fatal @ Self::Fatal { .. }) => fatal,
            (skipped @ Self::Skipped { .. }, _) | (_, skipped @ Self::Skipped { .. }) => skipped,
            (left, right) => Self::from_counts(
                left.success_count() + right.success_count(),
                left.error_count() + right.error_count(),
            ),
        }
    }

    /// Short machine-readable status, as persisted in logs and status displays.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Success { .. } => "ok",
            Self::Partial { .. } => "partial",
            Self::Skipped { .. } => "skipped",
            Self::Fatal { .. } => "fatal",
        }
    }
}
