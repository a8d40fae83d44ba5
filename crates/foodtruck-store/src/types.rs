//! Shapes exchanged with a document store: documents, revisions, design
//! documents and view queries/results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw stored document, including `_id` and `_rev` when read back.
pub type Document = serde_json::Map<String, Value>;

/// Document id field.
pub const ID_FIELD: &str = "_id";

/// Revision marker field.
pub const REV_FIELD: &str = "_rev";

/// Native mirror of a JavaScript map function: every `(key, value)` pair the
/// view emits for one document.
pub type NativeMap = fn(&Document) -> Vec<(Value, Value)>;

/// Identity and current revision of a stored document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocRevision {
    pub id: String,
    pub rev: String,
}

// ── Design documents ───────────────────────────────────────────────

/// A design document holding named views.
#[derive(Debug, Clone, Serialize)]
pub struct DesignDocument {
    pub language: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

impl DesignDocument {
    pub fn new() -> Self {
        Self {
            language: "javascript".to_string(),
            views: BTreeMap::new(),
        }
    }

    pub fn with_view(mut self, name: &str, view: ViewDefinition) -> Self {
        self.views.insert(name.to_string(), view);
        self
    }

    pub fn view(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.get(name)
    }
}

impl Default for DesignDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// One view: JavaScript map source, optional built-in reduce, and an
/// optional native mirror of the map for stores that cannot run JavaScript.
#[derive(Debug, Clone, Serialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
    #[serde(skip)]
    pub native: Option<NativeMap>,
}

impl ViewDefinition {
    pub fn map(source: &str) -> Self {
        Self {
            map: source.to_string(),
            reduce: None,
            native: None,
        }
    }

    pub fn reduce(mut self, reducer: Reducer) -> Self {
        self.reduce = Some(reducer.builtin().to_string());
        self
    }

    pub fn native(mut self, map: NativeMap) -> Self {
        self.native = Some(map);
        self
    }

    /// The built-in reducer, if the reduce is one this crate understands.
    pub fn reducer(&self) -> Option<Reducer> {
        self.reduce.as_deref().and_then(Reducer::from_builtin)
    }
}

/// CouchDB built-in reduce functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Count,
    Stats,
}

impl Reducer {
    pub fn builtin(self) -> &'static str {
        match self {
            Reducer::Count => "_count",
            Reducer::Stats => "_stats",
        }
    }

    pub fn from_builtin(name: &str) -> Option<Self> {
        match name {
            "_count" => Some(Reducer::Count),
            "_stats" => Some(Reducer::Stats),
            _ => None,
        }
    }
}

// ── View queries ───────────────────────────────────────────────────

/// Parameters for a view query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub descending: bool,
    pub include_docs: bool,
    pub key: Option<Value>,
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

}

/// One row of a view result. Reduced rows carry no `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// A view query response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
}

impl ViewResult {
    /// Value of the single row of a reduced query, if any.
    pub fn reduced_value(&self) -> Option<&Value> {
        self.rows.first().map(|row| &row.value)
    }
}
