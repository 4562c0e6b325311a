//! In-memory doubles shared by the sync tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use journal_core::journal::{LocalJournal, NewJournalEntry};
use journal_core::storage::MemoryLocalStore;
use journal_core::Clock;

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;
use crate::types::{ListFilter, Resource, SortOrder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteCall {
    pub op: &'static str,
    pub resource: Resource,
    pub detail: String,
}

/// Remote double backed by in-memory tables.
///
/// Every operation yields to the runtime before touching state, so concurrent
/// callers interleave the way they would against a real backend. `users`
/// enforces a unique `display_name`; every table enforces a unique `id`.
#[derive(Default)]
pub(crate) struct MemoryRemoteStore {
    tables: Mutex<HashMap<Resource, Vec<Value>>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing_insert_ids: Mutex<HashSet<String>>,
    failing_list_values: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    held_inserts: Mutex<Option<(Resource, Arc<Notify>)>>,
    insert_held: Notify,
}

fn field_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, resource: Resource, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .entry(resource)
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, resource: Resource) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(&resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub fn fail_insert_for(&self, id: &str) {
        self.failing_insert_ids
            .lock()
            .unwrap()
            .insert(id.to_string());
    }

    /// Any `list` whose filter mentions `value` fails with a server error.
    pub fn fail_list_for(&self, value: &str) {
        self.failing_list_values
            .lock()
            .unwrap()
            .insert(value.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Parks every insert into `resource` until the returned gate is notified.
    pub fn hold_inserts(&self, resource: Resource) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.held_inserts.lock().unwrap() = Some((resource, Arc::clone(&gate)));
        gate
    }

    /// Notified when an insert parks on the gate from [`hold_inserts`](Self::hold_inserts).
    pub fn insert_held(&self) -> &Notify {
        &self.insert_held
    }

    async fn enter(&self, op: &'static str, resource: Resource, detail: String) -> Result<()> {
        self.calls.lock().unwrap().push(RemoteCall {
            op,
            resource,
            detail,
        });
        tokio::task::yield_now().await;
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::unreachable("memory remote is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(&self, resource: Resource, filter: &ListFilter) -> Result<Vec<Value>> {
        self.enter("list", resource, format!("{:?}", filter.conditions()))
            .await?;

        {
            let failing = self.failing_list_values.lock().unwrap();
            if filter
                .conditions()
                .iter()
                .any(|(_, value)| failing.contains(value))
            {
                return Err(RemoteError::api(500, None, "injected list failure"));
            }
        }

        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(&resource)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        filter.conditions().iter().all(|(column, value)| {
                            field_text(row, column).as_deref() == Some(value.as_str())
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, order)) = filter.ordering() {
            rows.sort_by(|a, b| field_text(a, column).cmp(&field_text(b, column)));
            if order == SortOrder::Desc {
                rows.reverse();
            }
        }
        if let Some(limit) = filter.max_rows() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn get_by_id(&self, resource: Resource, id: &str) -> Result<Option<Value>> {
        self.enter("get", resource, id.to_string()).await?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&resource)
            .and_then(|rows| {
                rows.iter()
                    .find(|row| field_text(row, "id").as_deref() == Some(id))
                    .cloned()
            }))
    }

    async fn insert(&self, resource: Resource, mut row: Value) -> Result<Value> {
        let id = field_text(&row, "id").unwrap_or_else(|| Uuid::new_v4().to_string());
        self.enter("insert", resource, id.clone()).await?;

        let gate = self
            .held_inserts
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(held, _)| *held == resource)
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            self.insert_held.notify_one();
            gate.notified().await;
        }

        if self.failing_insert_ids.lock().unwrap().contains(&id) {
            return Err(RemoteError::api(400, None, "injected insert failure"));
        }

        let object = row
            .as_object_mut()
            .ok_or_else(|| RemoteError::invalid_request("row must be an object"))?;
        object.insert("id".to_string(), Value::String(id.clone()));
        object
            .entry("created_at")
            .or_insert_with(|| Value::String("2024-01-01T00:00:00+00:00".to_string()));

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(resource).or_default();
        let duplicate = rows.iter().any(|existing| {
            field_text(existing, "id").as_deref() == Some(id.as_str())
                || (resource == Resource::Users
                    && field_text(existing, "display_name") == field_text(&row, "display_name"))
        });
        if duplicate {
            return Err(RemoteError::api(
                409,
                Some("23505".to_string()),
                "duplicate key value violates unique constraint",
            ));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, resource: Resource, id: &str, patch: Value) -> Result<()> {
        self.enter("update", resource, id.to_string()).await?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables.get_mut(&resource).and_then(|rows| {
            rows.iter_mut()
                .find(|row| field_text(row, "id").as_deref() == Some(id))
        }) {
            if let (Some(target), Value::Object(fields)) = (row.as_object_mut(), patch) {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, resource: Resource, id: &str) -> Result<()> {
        self.enter("delete", resource, id.to_string()).await?;
        if let Some(rows) = self.tables.lock().unwrap().get_mut(&resource) {
            rows.retain(|row| field_text(row, "id").as_deref() != Some(id));
        }
        Ok(())
    }
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at_millis(millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .expect("valid timestamp"),
            ),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub(crate) fn memory_journal(clock: Arc<ManualClock>) -> Arc<LocalJournal> {
    Arc::new(LocalJournal::new(Arc::new(MemoryLocalStore::new()), clock))
}

pub(crate) fn new_entry(emotion: &str) -> NewJournalEntry {
    NewJournalEntry {
        date: "2024-01-01".to_string(),
        emotion: emotion.to_string(),
        event: "event".to_string(),
        realization: "realization".to_string(),
        self_esteem_score: Some(30),
        worthlessness_score: Some(70),
    }
}
