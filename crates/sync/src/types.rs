//! Remote resources, filters and row shapes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use journal_core::journal::{ConsentRecord, JournalEntry, UserRecord};

use crate::error::{RemoteError, Result};

/// Namespace for deriving canonical remote ids from non-UUID local consent ids.
pub const CONSENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8d3c_5a4e_2f1b_4c6d_9e7a_0b1c_2d3e_4f5a);

/// Collections exposed by the hosted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Entries,
    ConsentRecords,
}

impl Resource {
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Entries => "diary_entries",
            Self::ConsentRecords => "consent_records",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Equality filter with optional ordering and limit for `list` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    conditions: Vec<(String, String)>,
    order: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().and_eq(column, value)
    }

    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order
            .as_ref()
            .map(|(column, order)| (column.as_str(), *order))
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Query parameters in PostgREST form (`column=eq.value`, `order=column.desc`).
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![("select".to_string(), "*".to_string())];
        for (column, value) in &self.conditions {
            query.push((column.clone(), format!("eq.{}", value)));
        }
        if let Some((column, order)) = &self.order {
            query.push(("order".to_string(), format!("{}.{}", column, order.as_str())));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query
    }
}

pub fn decode_row<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(RemoteError::from)
}

/// Matches the backend's strict UUID check (RFC 4122 layout, version 1-8).
pub fn is_canonical_uuid(input: &str) -> bool {
    let value = input.trim();
    if value.eq_ignore_ascii_case("00000000-0000-0000-0000-000000000000")
        || value.eq_ignore_ascii_case("ffffffff-ffff-ffff-ffff-ffffffffffff")
    {
        return true;
    }

    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }

    let is_hex = |b: u8| b.is_ascii_hexdigit();
    let is_ver = |b: u8| matches!(b, b'1'..=b'8');
    let is_variant = |b: u8| matches!(b, b'8' | b'9' | b'a' | b'b' | b'A' | b'B');

    bytes.iter().enumerate().all(|(idx, byte)| match idx {
        8 | 13 | 18 | 23 => *byte == b'-',
        14 => is_ver(*byte),
        19 => is_variant(*byte),
        _ => is_hex(*byte),
    })
}

/// Remote id for a local consent record. Canonical ids pass through; anything
/// else maps to a UUIDv5 derived from the local id, so repeated pushes agree.
pub fn canonical_remote_id(local_id: &str) -> String {
    if is_canonical_uuid(local_id) {
        return local_id.trim().to_string();
    }
    Uuid::new_v5(&CONSENT_ID_NAMESPACE, local_id.as_bytes()).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Rows
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserRow {
    pub display_name: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            created_at: row.created_at.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRow {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub date: String,
    pub emotion: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub realization: Option<String>,
    #[serde(default)]
    pub self_esteem_score: Option<i32>,
    #[serde(default)]
    pub worthlessness_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counselor_memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible_to_user: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_counselor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counselor_updated_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl EntryRow {
    /// Row inserted on an owner's first push. Counselor fields are left to the backend defaults.
    pub fn for_insert(entry: &JournalEntry, owner_id: &str) -> Self {
        Self {
            id: entry.id.clone(),
            user_id: Some(owner_id.to_string()),
            date: entry.date.clone(),
            emotion: entry.emotion.clone(),
            event: Some(entry.event.clone()),
            realization: Some(entry.realization.clone()),
            self_esteem_score: entry.self_esteem_score,
            worthlessness_score: entry.worthlessness_score,
            counselor_memo: None,
            is_visible_to_user: None,
            urgency_level: None,
            assigned_counselor: None,
            counselor_updated_at: None,
            created_at: entry.created_at.clone(),
            updated_at: entry.updated_at.clone(),
        }
    }
}

impl From<EntryRow> for JournalEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            date: row.date,
            emotion: row.emotion,
            event: row.event.unwrap_or_default(),
            realization: row.realization.unwrap_or_default(),
            self_esteem_score: row.self_esteem_score,
            worthlessness_score: row.worthlessness_score,
            counselor_memo: row.counselor_memo,
            is_visible_to_user: row.is_visible_to_user,
            urgency_level: row.urgency_level,
            assigned_counselor: row.assigned_counselor,
            counselor_updated_at: row.counselor_updated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields an owner may change on an existing remote entry.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerEntryPatch<'a> {
    pub date: &'a str,
    pub emotion: &'a str,
    pub event: &'a str,
    pub realization: &'a str,
    pub self_esteem_score: Option<i32>,
    pub worthlessness_score: Option<i32>,
    pub updated_at: Option<&'a str>,
}

impl<'a> From<&'a JournalEntry> for OwnerEntryPatch<'a> {
    fn from(entry: &'a JournalEntry) -> Self {
        Self {
            date: &entry.date,
            emotion: &entry.emotion,
            event: &entry.event,
            realization: &entry.realization,
            self_esteem_score: entry.self_esteem_score,
            worthlessness_score: entry.worthlessness_score,
            updated_at: entry.updated_at.as_deref(),
        }
    }
}

/// Counselor fields an operator may change on an existing remote entry. The
/// owner's `updated_at` is never written from here.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorEntryPatch<'a> {
    pub counselor_memo: Option<&'a str>,
    pub is_visible_to_user: Option<bool>,
    pub urgency_level: Option<&'a str>,
    pub assigned_counselor: Option<&'a str>,
    pub counselor_updated_at: Option<&'a str>,
}

impl<'a> From<&'a JournalEntry> for OperatorEntryPatch<'a> {
    fn from(entry: &'a JournalEntry) -> Self {
        Self {
            counselor_memo: entry.counselor_memo.as_deref(),
            is_visible_to_user: entry.is_visible_to_user,
            urgency_level: entry.urgency_level.as_deref(),
            assigned_counselor: entry.assigned_counselor.as_deref(),
            counselor_updated_at: entry.counselor_updated_at.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRow {
    pub id: String,
    pub display_name: String,
    pub consent_given: bool,
    pub consent_date: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl ConsentRow {
    pub fn from_record(record: &ConsentRecord, remote_id: String) -> Self {
        Self {
            id: remote_id,
            display_name: record.display_name.clone(),
            consent_given: record.consent_given,
            consent_date: record.consent_date.clone(),
            user_agent: record.user_agent.clone(),
            ip_address: record.ip_address.clone(),
        }
    }
}
