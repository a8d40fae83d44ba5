//! View definitions and database provisioning.
//!
//! | View | Emits | Reduce |
//! |---|---|---|
//! | `all_documents` | every document: `_id` → `[_id, _rev]` | |
//! | `all_trucks` | trucks: `_id` → `[_id, name, foodtype, avgcost, latitude, longitude]` | |
//! | `total_trucks` | trucks: `_id` → `1` | `_count` |
//! | `all_reviews` | reviews: `truckid` → `[_id, truckid, reviewtitle, reviewtext, starrating]` | |
//! | `total_reviews` | reviews: `truckid` → `1` | `_count` |
//! | `avg_rating` | reviews: `truckid` → `starrating` | `_stats` |
//!
//! Each view carries its JavaScript source and a native mirror of the same
//! emit logic.

use foodtruck_store::{
    DesignDocument, Document, DocumentStore, ID_FIELD, REV_FIELD, Reducer, StoreResult,
    ViewDefinition,
};
use serde_json::{Value, json};
use tracing::info;

use crate::document::{REVIEW_KIND, TRUCK_KIND, TYPE_FIELD};

pub const DESIGN_NAME: &str = "foodtruckdesign";

pub const ALL_DOCUMENTS: &str = "all_documents";
pub const ALL_TRUCKS: &str = "all_trucks";
pub const TOTAL_TRUCKS: &str = "total_trucks";
pub const ALL_REVIEWS: &str = "all_reviews";
pub const TOTAL_REVIEWS: &str = "total_reviews";
pub const AVG_RATING: &str = "avg_rating";

/// Outcome of [`ensure_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// The database was missing; it and the design document were created.
    Created,
    /// The database already existed and was left untouched.
    Existing,
}

/// The fixed view set.
pub fn design_document() -> DesignDocument {
    DesignDocument::new()
        .with_view(
            ALL_DOCUMENTS,
            ViewDefinition::map("function(doc) { emit(doc._id, [doc._id, doc._rev]); }")
                .native(emit_all_documents),
        )
        .with_view(
            ALL_TRUCKS,
            ViewDefinition::map(
                "function(doc) { if (doc.type == 'foodtruck') { emit(doc._id, [doc._id, doc.name, doc.foodtype, doc.avgcost, doc.latitude, doc.longitude]); } }",
            )
            .native(emit_all_trucks),
        )
        .with_view(
            TOTAL_TRUCKS,
            ViewDefinition::map("function(doc) { if (doc.type == 'foodtruck') { emit(doc._id, 1); } }")
                .reduce(Reducer::Count)
                .native(emit_truck_ones),
        )
        .with_view(
            ALL_REVIEWS,
            ViewDefinition::map(
                "function(doc) { if (doc.type == 'review') { emit(doc.truckid, [doc._id, doc.truckid, doc.reviewtitle, doc.reviewtext, doc.starrating]); } }",
            )
            .native(emit_all_reviews),
        )
        .with_view(
            TOTAL_REVIEWS,
            ViewDefinition::map("function(doc) { if (doc.type == 'review') { emit(doc.truckid, 1); } }")
                .reduce(Reducer::Count)
                .native(emit_review_ones),
        )
        .with_view(
            AVG_RATING,
            ViewDefinition::map(
                "function(doc) { if (doc.type == 'review') { emit(doc.truckid, doc.starrating); } }",
            )
            .reduce(Reducer::Stats)
            .native(emit_ratings),
        )
}

/// Create the database and install the views if the database is missing.
///
/// An existing database is not inspected: views are neither verified nor
/// upgraded.
pub async fn ensure_schema<S: DocumentStore + ?Sized>(store: &S) -> StoreResult<SchemaStatus> {
    let database = store.database_name().to_string();
    if store.database_exists().await? {
        info!(%database, "database exists");
        return Ok(SchemaStatus::Existing);
    }

    info!(%database, "database missing, creating");
    store.create_database().await?;
    let rev = store.put_design(DESIGN_NAME, &design_document()).await?;
    info!(%database, design = DESIGN_NAME, rev = %rev.rev, "design document installed");
    Ok(SchemaStatus::Created)
}

// ── Native map mirrors ─────────────────────────────────────────────

/// `doc.<field>`, `null` when absent (JavaScript emits `undefined` as null).
fn field(doc: &Document, name: &str) -> Value {
    doc.get(name).cloned().unwrap_or(Value::Null)
}

fn is_kind(doc: &Document, kind: &str) -> bool {
    doc.get(TYPE_FIELD).and_then(Value::as_str) == Some(kind)
}

fn emit_all_documents(doc: &Document) -> Vec<(Value, Value)> {
    vec![(
        field(doc, ID_FIELD),
        json!([field(doc, ID_FIELD), field(doc, REV_FIELD)]),
    )]
}

fn emit_all_trucks(doc: &Document) -> Vec<(Value, Value)> {
    if !is_kind(doc, TRUCK_KIND) {
        return Vec::new();
    }
    vec![(
        field(doc, ID_FIELD),
        json!([
            field(doc, ID_FIELD),
            field(doc, "name"),
            field(doc, "foodtype"),
            field(doc, "avgcost"),
            field(doc, "latitude"),
            field(doc, "longitude"),
        ]),
    )]
}

fn emit_truck_ones(doc: &Document) -> Vec<(Value, Value)> {
    if !is_kind(doc, TRUCK_KIND) {
        return Vec::new();
    }
    vec![(field(doc, ID_FIELD), json!(1))]
}

fn emit_all_reviews(doc: &Document) -> Vec<(Value, Value)> {
    if !is_kind(doc, REVIEW_KIND) {
        return Vec::new();
    }
    vec![(
        field(doc, "truckid"),
        json!([
            field(doc, ID_FIELD),
            field(doc, "truckid"),
            field(doc, "reviewtitle"),
            field(doc, "reviewtext"),
            field(doc, "starrating"),
        ]),
    )]
}

fn emit_review_ones(doc: &Document) -> Vec<(Value, Value)> {
    if !is_kind(doc, REVIEW_KIND) {
        return Vec::new();
    }
    vec![(field(doc, "truckid"), json!(1))]
}

fn emit_ratings(doc: &Document) -> Vec<(Value, Value)> {
    if !is_kind(doc, REVIEW_KIND) {
        return Vec::new();
    }
    vec![(field(doc, "truckid"), field(doc, "starrating"))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodtruck_store::{MemoryStore, ViewQuery};

    #[test]
    fn design_declares_every_view() {
        let design = design_document();
        let names: Vec<&str> = design.views.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![ALL_DOCUMENTS, ALL_REVIEWS, ALL_TRUCKS, AVG_RATING, TOTAL_REVIEWS, TOTAL_TRUCKS]
        );
        assert!(design.views.values().all(|view| view.native.is_some()));
        assert_eq!(design.view(TOTAL_TRUCKS).unwrap().reducer(), Some(Reducer::Count));
        assert_eq!(design.view(TOTAL_REVIEWS).unwrap().reducer(), Some(Reducer::Count));
        assert_eq!(design.view(AVG_RATING).unwrap().reducer(), Some(Reducer::Stats));
        assert_eq!(design.view(ALL_TRUCKS).unwrap().reduce, None);
    }

    #[test]
    fn native_maps_partition_by_kind() {
        let truck = json!({"_id": "t1", "_rev": "1-a", "type": "foodtruck", "name": "T"});
        let review = json!({"_id": "r1", "_rev": "1-b", "type": "review", "truckid": "t1", "starrating": 4});
        let truck = truck.as_object().unwrap();
        let review = review.as_object().unwrap();

        assert_eq!(emit_all_documents(truck), vec![(json!("t1"), json!(["t1", "1-a"]))]);
        assert_eq!(emit_all_documents(review).len(), 1);

        assert_eq!(emit_all_trucks(review), Vec::new());
        let (key, value) = &emit_all_trucks(truck)[0];
        assert_eq!(key, "t1");
        assert_eq!(value[1], "T");
        // Missing fields emit null, like `undefined` in JavaScript.
        assert_eq!(value[2], Value::Null);

        assert_eq!(emit_review_ones(truck), Vec::new());
        assert_eq!(emit_ratings(review), vec![(json!("t1"), json!(4))]);
    }

    #[tokio::test]
    async fn ensure_schema_creates_database_and_views() {
        let store = MemoryStore::new("foodtruckapi");
        assert_eq!(ensure_schema(&store).await.unwrap(), SchemaStatus::Created);
        assert!(store.database_exists().await.unwrap());
        assert!(store.has_design(DESIGN_NAME));

        let result = store
            .query_view(DESIGN_NAME, TOTAL_TRUCKS, &ViewQuery::new())
            .await
            .unwrap();
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn ensure_schema_leaves_existing_database_alone() {
        let store = MemoryStore::new("foodtruckapi");
        store.create_database().await.unwrap();

        assert_eq!(ensure_schema(&store).await.unwrap(), SchemaStatus::Existing);
        // No migration path: the views are not installed after the fact.
        assert!(!store.has_design(DESIGN_NAME));
    }

    #[tokio::test]
    async fn ensure_schema_surfaces_store_failures() {
        let store = MemoryStore::new("foodtruckapi");
        store.set_unavailable(true);
        assert!(ensure_schema(&store).await.is_err());
    }
}
