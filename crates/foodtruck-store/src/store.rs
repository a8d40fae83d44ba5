//! The document store capability consumed by the backend.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{DesignDocument, DocRevision, Document, ViewQuery, ViewResult};

/// CRUD and view queries against a single database.
///
/// Implementations are shared across request tasks, hence `Send + Sync`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database this store is bound to.
    fn database_name(&self) -> &str;

    /// Whether the database exists.
    async fn database_exists(&self) -> StoreResult<bool>;

    /// Create the database. Fails with `AlreadyExists` if it is present.
    async fn create_database(&self) -> StoreResult<()>;

    /// Install (or replace) the design document `_design/{name}`.
    async fn put_design(&self, name: &str, design: &DesignDocument) -> StoreResult<DocRevision>;

    /// Fetch a document, `None` when it does not exist.
    async fn get(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Insert a new document; the store assigns the id.
    async fn create(&self, fields: Document) -> StoreResult<DocRevision>;

    /// Replace a document, guarded by its current revision.
    async fn update(&self, id: &str, rev: &str, fields: Document) -> StoreResult<DocRevision>;

    /// Delete a document, guarded by its current revision.
    async fn delete(&self, id: &str, rev: &str) -> StoreResult<()>;

    /// Query a view of a design document.
    async fn query_view(&self, design: &str, view: &str, query: &ViewQuery)
    -> StoreResult<ViewResult>;
}
