//! CouchDB HTTP client.
//!
//! Maps [`DocumentStore`] calls onto the CouchDB REST API:
//!
//! | Call | Request |
//! |---|---|
//! | `database_exists` | `HEAD /{db}` |
//! | `create_database` | `PUT /{db}` |
//! | `put_design` | `PUT /{db}/_design/{name}` |
//! | `get` | `GET /{db}/{id}` |
//! | `create` | `POST /{db}` |
//! | `update` | `PUT /{db}/{id}` with `_rev` in the body |
//! | `delete` | `DELETE /{db}/{id}?rev=...` |
//! | `query_view` | `GET /{db}/_design/{d}/_view/{v}` |

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;
use crate::types::{
    DesignDocument, DocRevision, Document, ID_FIELD, REV_FIELD, ViewQuery, ViewResult,
};

macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// CouchDB error body, e.g. `{"error": "conflict", "reason": "Document update conflict."}`.
#[derive(Debug, Deserialize)]
struct CouchErrorBody {
    error: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Write acknowledgement, e.g. `{"ok": true, "id": "...", "rev": "..."}`.
#[derive(Debug, Deserialize)]
struct WriteAck {
    id: String,
    rev: String,
}

/// Thread-safe CouchDB client bound to one database.
#[derive(Clone)]
pub struct CouchClient {
    http: Client,
    server: Url,
    database: String,
    credentials: Option<(String, Option<String>)>,
}

impl CouchClient {
    pub fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let server = Url::parse(&config.server_url()).map_err(map_err!(InvalidUrl))?;
        let http = Client::builder()
            .user_agent(concat!("foodtruck-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(map_err!(Transport))?;
        debug!(%server, database = %config.database_name, secured = config.secured(), "couch client configured");
        Ok(Self {
            http,
            server,
            database: config.database_name.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    /// `{server}/{db}/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.server.to_string()))?
            .clear()
            .push(&self.database)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        builder.send().await.map_err(map_err!(Transport))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<T> {
        response.json::<T>().await.map_err(map_err!(Decode))
    }
}

/// Turn a non-2xx response into the matching `StoreError`.
async fn error_for(response: Response) -> StoreError {
    let status = response.status();
    let reason = match response.json::<CouchErrorBody>().await {
        Ok(body) => match body.reason {
            Some(reason) => format!("{}: {reason}", body.error),
            None => body.error,
        },
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    status_error(status, reason)
}

fn status_error(status: StatusCode, reason: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(reason),
        StatusCode::CONFLICT => StoreError::Conflict(reason),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(reason),
        StatusCode::PRECONDITION_FAILED => StoreError::AlreadyExists(reason),
        StatusCode::BAD_REQUEST => StoreError::BadRequest(reason),
        other => StoreError::Status {
            status: other.as_u16(),
            reason,
        },
    }
}

async fn ensure_success(response: Response) -> StoreResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_for(response).await)
    }
}

/// Query-string parameters for a view request. Keys are JSON-encoded.
fn view_params(query: &ViewQuery) -> StoreResult<Vec<(&'static str, String)>> {
    let mut params = Vec::new();
    if query.descending {
        params.push(("descending", "true".to_string()));
    }
    if query.include_docs {
        params.push(("include_docs", "true".to_string()));
    }
    if let Some(key) = &query.key {
        params.push(("key", serde_json::to_string(key).map_err(map_err!(Encode))?));
    }
    Ok(params)
}

#[async_trait]
impl DocumentStore for CouchClient {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn database_exists(&self) -> StoreResult<bool> {
        let response = self.send(self.request(Method::HEAD, self.url(&[])?)).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            // HEAD responses carry no body to decode.
            status => Err(status_error(
                status,
                status.canonical_reason().unwrap_or("unknown").to_string(),
            )),
        }
    }

    async fn create_database(&self) -> StoreResult<()> {
        let response = self.send(self.request(Method::PUT, self.url(&[])?)).await?;
        ensure_success(response).await?;
        debug!(database = %self.database, "database created");
        Ok(())
    }

    async fn put_design(&self, name: &str, design: &DesignDocument) -> StoreResult<DocRevision> {
        let url = self.url(&["_design", name])?;
        let response = self.send(self.request(Method::PUT, url).json(design)).await?;
        let ack: WriteAck = Self::json(ensure_success(response).await?).await?;
        debug!(design = name, rev = %ack.rev, "design document stored");
        Ok(DocRevision {
            id: ack.id,
            rev: ack.rev,
        })
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        let response = self.send(self.request(Method::GET, self.url(&[id])?)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Document = Self::json(ensure_success(response).await?).await?;
        Ok(Some(doc))
    }

    async fn create(&self, mut fields: Document) -> StoreResult<DocRevision> {
        fields.remove(REV_FIELD);
        let response = self
            .send(self.request(Method::POST, self.url(&[])?).json(&fields))
            .await?;
        let ack: WriteAck = Self::json(ensure_success(response).await?).await?;
        debug!(id = %ack.id, rev = %ack.rev, "document created");
        Ok(DocRevision {
            id: ack.id,
            rev: ack.rev,
        })
    }

    async fn update(&self, id: &str, rev: &str, mut fields: Document) -> StoreResult<DocRevision> {
        fields.insert(ID_FIELD.to_string(), json!(id));
        fields.insert(REV_FIELD.to_string(), json!(rev));
        let response = self
            .send(self.request(Method::PUT, self.url(&[id])?).json(&fields))
            .await?;
        let ack: WriteAck = Self::json(ensure_success(response).await?).await?;
        debug!(%id, rev = %ack.rev, "document updated");
        Ok(DocRevision {
            id: ack.id,
            rev: ack.rev,
        })
    }

    async fn delete(&self, id: &str, rev: &str) -> StoreResult<()> {
        let response = self
            .send(
                self.request(Method::DELETE, self.url(&[id])?)
                    .query(&[("rev", rev)]),
            )
            .await?;
        ensure_success(response).await?;
        debug!(%id, "document deleted");
        Ok(())
    }

    async fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<ViewResult> {
        let url = self.url(&["_design", design, "_view", view])?;
        let params = view_params(query)?;
        let response = self
            .send(self.request(Method::GET, url).query(&params))
            .await?;
        let result: ViewResult = Self::json(ensure_success(response).await?).await?;
        debug!(design, view, rows = result.rows.len(), "view queried");
        Ok(result)
    }
}
