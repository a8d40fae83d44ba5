//! In-memory document store.
//!
//! Mirrors the CouchDB behaviour the backend relies on: store-assigned ids,
//! `N-<hex>` revisions checked on update and delete, design documents kept
//! apart from data documents (views never see them), and view evaluation
//! with key collation, `descending`, `include_docs`, and the `_count` and
//! `_stats` built-in reducers.
//!
//! Views are evaluated through [`ViewDefinition::native`]; a view without a
//! native mirror cannot be queried here.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;
use crate::types::{
    DesignDocument, DocRevision, Document, ID_FIELD, REV_FIELD, Reducer, ViewQuery, ViewResult,
    ViewRow,
};

#[derive(Default)]
struct Inner {
    exists: bool,
    unavailable: bool,
    undeletable: HashSet<String>,
    docs: BTreeMap<String, Document>,
    designs: HashMap<String, DesignDocument>,
}

/// Clone-friendly in-memory store; clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    database: String,
    latency: Option<Duration>,
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// A store whose database has not been created yet.
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            latency: None,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Sleep for `latency` before every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While set, every call fails with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.unavailable = unavailable;
        }
    }

    /// Make every deletion of `id` fail with a transport error.
    pub fn fail_deletes_of(&self, id: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.undeletable.insert(id.to_string());
        }
    }

    /// Number of data documents (design documents excluded).
    pub fn document_count(&self) -> usize {
        self.inner.read().map(|inner| inner.docs.len()).unwrap_or(0)
    }

    /// Whether a design document with this name is installed.
    pub fn has_design(&self, name: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.designs.contains_key(name))
            .unwrap_or(false)
    }

    async fn enter(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Transport("lock poisoned".into()))?;
        check_available(&inner, &self.database)?;
        Ok(inner)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        let inner = self
            .inner
            .write()
            .map_err(|_| StoreError::Transport("lock poisoned".into()))?;
        check_available(&inner, &self.database)?;
        Ok(inner)
    }
}

fn check_available(inner: &Inner, database: &str) -> StoreResult<()> {
    if inner.unavailable {
        return Err(StoreError::Transport(format!("{database}: connection refused")));
    }
    Ok(())
}

fn require_database(inner: &Inner) -> StoreResult<()> {
    if inner.exists {
        Ok(())
    } else {
        Err(StoreError::NotFound("Database does not exist.".into()))
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn rev_of(doc: &Document) -> Option<&str> {
    doc.get(REV_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn database_exists(&self) -> StoreResult<bool> {
        self.enter().await;
        Ok(self.read()?.exists)
    }

    async fn create_database(&self) -> StoreResult<()> {
        self.enter().await;
        let mut inner = self.write()?;
        if inner.exists {
            return Err(StoreError::AlreadyExists(format!(
                "database {} exists",
                self.database
            )));
        }
        inner.exists = true;
        debug!(database = %self.database, "in-memory database created");
        Ok(())
    }

    async fn put_design(&self, name: &str, design: &DesignDocument) -> StoreResult<DocRevision> {
        self.enter().await;
        let mut inner = self.write()?;
        require_database(&inner)?;
        inner.designs.insert(name.to_string(), design.clone());
        Ok(DocRevision {
            id: format!("_design/{name}"),
            rev: next_rev(None),
        })
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.enter().await;
        let inner = self.read()?;
        require_database(&inner)?;
        Ok(inner.docs.get(id).cloned())
    }

    async fn create(&self, mut fields: Document) -> StoreResult<DocRevision> {
        self.enter().await;
        let mut inner = self.write()?;
        require_database(&inner)?;

        let id = match fields.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => new_id(),
        };
        if inner.docs.contains_key(&id) {
            return Err(StoreError::Conflict(format!("document {id} exists")));
        }

        let rev = next_rev(None);
        fields.insert(ID_FIELD.to_string(), json!(id));
        fields.insert(REV_FIELD.to_string(), json!(rev));
        inner.docs.insert(id.clone(), fields);
        Ok(DocRevision { id, rev })
    }

    async fn update(&self, id: &str, rev: &str, mut fields: Document) -> StoreResult<DocRevision> {
        self.enter().await;
        let mut inner = self.write()?;
        require_database(&inner)?;

        let current = inner
            .docs
            .get(id)
            .and_then(rev_of)
            .ok_or_else(|| StoreError::Conflict(format!("document {id} is missing")))?;
        if current != rev {
            return Err(StoreError::Conflict(format!(
                "document {id} is at {current}, not {rev}"
            )));
        }

        let new_rev = next_rev(Some(rev));
        fields.insert(ID_FIELD.to_string(), json!(id));
        fields.insert(REV_FIELD.to_string(), json!(new_rev));
        inner.docs.insert(id.to_string(), fields);
        Ok(DocRevision {
            id: id.to_string(),
            rev: new_rev,
        })
    }

    async fn delete(&self, id: &str, rev: &str) -> StoreResult<()> {
        self.enter().await;
        let mut inner = self.write()?;
        require_database(&inner)?;

        let current = inner
            .docs
            .get(id)
            .and_then(rev_of)
            .ok_or_else(|| StoreError::NotFound(format!("document {id} is missing")))?;
        if inner.undeletable.contains(id) {
            return Err(StoreError::Transport(format!("deleting {id}: connection reset")));
        }
        if current != rev {
            return Err(StoreError::Conflict(format!(
                "document {id} is at {current}, not {rev}"
            )));
        }
        inner.docs.remove(id);
        Ok(())
    }

    async fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResult> {
        self.enter().await;
        let inner = self.read()?;
        require_database(&inner)?;

        let definition = inner
            .designs
            .get(design)
            .ok_or_else(|| StoreError::NotFound(format!("missing design {design}")))?
            .view(view)
            .ok_or_else(|| StoreError::NotFound(format!("missing_named_view {view}")))?;
        let map = definition
            .native
            .ok_or_else(|| StoreError::Unsupported(format!("view {view} has no native map")))?;

        let mut emitted: Vec<(Value, String, Value, &Document)> = Vec::new();
        for (id, doc) in &inner.docs {
            for (key, value) in map(doc) {
                emitted.push((key, id.clone(), value, doc));
            }
        }
        let total_rows = emitted.len() as u64;
        emitted.sort_by(|a, b| collate(&a.0, &b.0).then_with(|| a.1.cmp(&b.1)));

        let mut selected: Vec<_> = match &query.key {
            Some(key) => emitted.into_iter().filter(|row| row.0 == *key).collect(),
            None => emitted,
        };
        if query.descending {
            selected.reverse();
        }

        if definition.reduce.is_some() {
            if query.include_docs {
                return Err(StoreError::BadRequest(
                    "include_docs is invalid for reduce".into(),
                ));
            }
            let reducer = definition.reducer().ok_or_else(|| {
                StoreError::Unsupported(format!("view {view} uses a custom reduce"))
            })?;
            return Ok(ViewResult {
                total_rows: None,
                offset: None,
                rows: reduce_rows(reducer, &selected)?,
            });
        }

        let rows = selected
            .into_iter()
            .map(|(key, id, value, doc)| ViewRow {
                id: Some(id),
                key,
                value,
                doc: query.include_docs.then(|| doc.clone()),
            })
            .collect();
        Ok(ViewResult {
            total_rows: Some(total_rows),
            offset: Some(0),
            rows,
        })
    }
}

// ── View evaluation ────────────────────────────────────────────────

/// Reduce every selected row into one; no rows reduce to none.
fn reduce_rows(
    reducer: Reducer,
    rows: &[(Value, String, Value, &Document)],
) -> StoreResult<Vec<ViewRow>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<&Value> = rows.iter().map(|row| &row.2).collect();
    Ok(vec![ViewRow {
        id: None,
        key: Value::Null,
        value: reduce(reducer, &values)?,
        doc: None,
    }])
}

fn reduce(reducer: Reducer, values: &[&Value]) -> StoreResult<Value> {
    if reducer == Reducer::Count {
        return Ok(json!(values.len()));
    }
    let numbers = values
        .iter()
        .map(|value| {
            value.as_f64().ok_or_else(|| {
                StoreError::BadRequest(format!("{} expects numbers, got {value}", reducer.builtin()))
            })
        })
        .collect::<StoreResult<Vec<f64>>>()?;
    let sum: f64 = numbers.iter().sum();
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let sumsqr: f64 = numbers.iter().map(|n| n * n).sum();
    Ok(json!({
        "sum": number(sum),
        "count": numbers.len(),
        "min": number(min),
        "max": number(max),
        "sumsqr": number(sumsqr),
    }))
}

/// Integral values come back as JSON integers, like CouchDB.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Simplified CouchDB key collation: null < booleans < numbers < strings <
/// arrays < objects.
fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| collate(l, r))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}
