//! foodtruck-store — document database access for the food truck API.
//!
//! The backend talks to its database only through [`DocumentStore`]: raw
//! document CRUD guarded by revision markers, plus queries against named
//! map/reduce views of a design document.
//!
//! Two implementations:
//! - [`CouchClient`] speaks the CouchDB HTTP API (`reqwest`).
//! - [`MemoryStore`] keeps documents in memory and evaluates views through
//!   the native map mirrors carried by [`ViewDefinition`] (for tests).

pub mod config;
pub mod couch;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use config::DatabaseConfig;
pub use couch::CouchClient;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::DocumentStore;
pub use types::*;
