//! Journal domain models.

use serde::{Deserialize, Serialize};

/// Highest value accepted for the self-esteem and worthlessness scores.
pub const MAX_SCORE: i32 = 100;

/// Remote identity bound to a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub created_at: String,
}

/// A single journal entry.
///
/// `id` is generated on the client and is the sync key shared by the local and
/// remote copies. `user_id` stays unset until the entry is first pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub date: String,
    pub emotion: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub realization: String,
    #[serde(default)]
    pub self_esteem_score: Option<i32>,
    #[serde(default)]
    pub worthlessness_score: Option<i32>,
    /// Counselor-only fields. Only operator pushes write these remotely.
    #[serde(default)]
    pub counselor_memo: Option<String>,
    #[serde(default)]
    pub is_visible_to_user: Option<bool>,
    #[serde(default)]
    pub urgency_level: Option<String>,
    #[serde(default)]
    pub assigned_counselor: Option<String>,
    /// Stamped on counselor edits. Orders counselor fields independently of
    /// owner edits, so neither side's edit hides the other's.
    #[serde(default)]
    pub counselor_updated_at: Option<String>,
    pub created_at: String,
    /// Stamped on every owner edit; drives last-write-wins during sync.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl JournalEntry {
    /// Copies the counselor fields and their timestamp from `other`.
    pub fn take_counselor_fields(&mut self, other: &JournalEntry) {
        self.counselor_memo.clone_from(&other.counselor_memo);
        self.is_visible_to_user = other.is_visible_to_user;
        self.urgency_level.clone_from(&other.urgency_level);
        self.assigned_counselor.clone_from(&other.assigned_counselor);
        self.counselor_updated_at.clone_from(&other.counselor_updated_at);
    }
}

/// Input captured by the entry form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJournalEntry {
    pub date: String,
    pub emotion: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub realization: String,
    #[serde(default)]
    pub self_esteem_score: Option<i32>,
    #[serde(default)]
    pub worthlessness_score: Option<i32>,
}

/// Owner edit of an existing entry. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryUpdate {
    pub date: Option<String>,
    pub emotion: Option<String>,
    pub event: Option<String>,
    pub realization: Option<String>,
    pub self_esteem_score: Option<i32>,
    pub worthlessness_score: Option<i32>,
}

/// Counselor edit of an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselorUpdate {
    pub counselor_memo: Option<String>,
    pub is_visible_to_user: Option<bool>,
    pub urgency_level: Option<String>,
    pub assigned_counselor: Option<String>,
}

/// Consent captured before journaling starts. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRecord {
    pub id: String,
    pub display_name: String,
    pub consent_given: bool,
    pub consent_date: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Entry row of the operator aggregate, annotated with the owner's display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAggregateEntry {
    pub display_name: String,
    #[serde(flatten)]
    pub entry: JournalEntry,
}

pub(crate) fn validate_score(name: &str, value: Option<i32>) -> crate::Result<()> {
    match value {
        Some(score) if !(0..=MAX_SCORE).contains(&score) => Err(crate::Error::invalid_input(
            format!("{} must be between 0 and {}, got {}", name, MAX_SCORE, score),
        )),
        _ => Ok(()),
    }
}

impl NewJournalEntry {
    pub fn validate(&self) -> crate::Result<()> {
        if self.date.trim().is_empty() {
            return Err(crate::Error::invalid_input("Entry date is required"));
        }
        if self.emotion.trim().is_empty() {
            return Err(crate::Error::invalid_input("Entry emotion is required"));
        }
        validate_score("selfEsteemScore", self.self_esteem_score)?;
        validate_score("worthlessnessScore", self.worthlessness_score)
    }
}
