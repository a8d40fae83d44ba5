//! foodtruck-backend — the food truck domain on top of a document store.
//!
//! [`FoodTruckBackend`] is the capability the HTTP layer depends on. Two
//! implementations:
//! - [`CouchBackend`] translates every operation into document CRUD and
//!   queries against the views of [`design`], over any [`DocumentStore`].
//! - [`MemoryBackend`] is a self-contained fake with the same observable
//!   behaviour, for exercising callers without a store.
//!
//! Trucks and reviews live in one database, told apart by a `type` field;
//! only [`document`] knows how entities map to stored documents.
//!
//! [`DocumentStore`]: foodtruck_store::DocumentStore

pub mod backend;
pub mod couch_backend;
pub mod design;
pub mod document;
pub mod error;
pub mod memory;

pub use backend::{DEFAULT_RATING, FoodTruckBackend};
pub use couch_backend::CouchBackend;
pub use design::{SchemaStatus, ensure_schema};
pub use error::{BackendError, BackendResult};
pub use memory::MemoryBackend;
