//! Mapping between entities and stored documents.
//!
//! Truck document: `{type: "foodtruck", name, foodtype, avgcost, latitude, longitude}`.
//! Review document: `{type: "review", truckid, reviewtitle, reviewtext, starrating}`.
//! Both carry `_id` and `_rev` once stored. Field names match the wire names
//! of the model types.

use foodtruck_model::{FieldMap, NewReview, NewTruck, ReviewItem, TruckItem, to_field_map};
use foodtruck_store::{Document, ID_FIELD, REV_FIELD};
use serde_json::{Value, json};

use crate::error::{BackendError, BackendResult};

/// Kind discriminator field.
pub const TYPE_FIELD: &str = "type";
pub const TRUCK_KIND: &str = "foodtruck";
pub const REVIEW_KIND: &str = "review";

/// Order of the `all_trucks` value tuple.
pub const TRUCK_TUPLE: [&str; 6] = ["id", "name", "foodtype", "avgcost", "latitude", "longitude"];

/// Order of the `all_reviews` value tuple.
pub const REVIEW_TUPLE: [&str; 5] = ["id", "truckid", "reviewtitle", "reviewtext", "starrating"];

fn tagged(mut fields: FieldMap, kind: &str) -> Document {
    fields.remove("id");
    fields.insert(TYPE_FIELD.to_string(), json!(kind));
    fields
}

pub fn truck_document(truck: &NewTruck) -> Document {
    tagged(to_field_map(truck), TRUCK_KIND)
}

pub fn review_document(review: &NewReview) -> Document {
    tagged(to_field_map(review), REVIEW_KIND)
}

/// Overwrite the entity fields of a fetched document, keeping any other
/// fields it carries. `_id` and `_rev` are stripped; the store sets them.
pub fn merge_truck(mut doc: Document, truck: &TruckItem) -> Document {
    doc.remove(ID_FIELD);
    doc.remove(REV_FIELD);
    doc.extend(tagged(truck.to_fields(), TRUCK_KIND));
    doc
}

pub fn merge_review(mut doc: Document, review: &ReviewItem) -> Document {
    doc.remove(ID_FIELD);
    doc.remove(REV_FIELD);
    doc.extend(tagged(review.to_fields(), REVIEW_KIND));
    doc
}

pub fn document_id(doc: &Document) -> &str {
    doc.get(ID_FIELD).and_then(Value::as_str).unwrap_or("<unknown>")
}

/// Current revision of a fetched document.
pub fn revision(doc: &Document) -> BackendResult<String> {
    doc.get(REV_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Parse(format!("document {} has no revision", document_id(doc))))
}

/// Fails with `Parse` unless the document's `type` is `kind`.
pub fn check_kind(doc: &Document, kind: &str) -> BackendResult<()> {
    match doc.get(TYPE_FIELD).and_then(Value::as_str) {
        Some(found) if found == kind => Ok(()),
        found => Err(BackendError::Parse(format!(
            "document {} is of kind {:?}, expected {kind}",
            document_id(doc),
            found
        ))),
    }
}

/// Stored fields under the entity's wire names, with `_id` as `id`.
fn entity_fields(doc: &Document, names: &[&str]) -> FieldMap {
    names
        .iter()
        .filter_map(|name| {
            let source = if *name == "id" { ID_FIELD } else { *name };
            doc.get(source).map(|value| (name.to_string(), value.clone()))
        })
        .collect()
}

pub fn truck_from_document(doc: &Document) -> BackendResult<TruckItem> {
    check_kind(doc, TRUCK_KIND)?;
    TruckItem::from_fields(&entity_fields(doc, &TRUCK_TUPLE)).ok_or_else(|| {
        BackendError::Parse(format!("truck document {} is incomplete", document_id(doc)))
    })
}

pub fn review_from_document(doc: &Document) -> BackendResult<ReviewItem> {
    check_kind(doc, REVIEW_KIND)?;
    ReviewItem::from_fields(&entity_fields(doc, &REVIEW_TUPLE)).ok_or_else(|| {
        BackendError::Parse(format!("review document {} is incomplete", document_id(doc)))
    })
}

fn tuple_fields(value: &Value, names: &[&str]) -> Option<FieldMap> {
    let items = value.as_array()?;
    if items.len() < names.len() {
        return None;
    }
    Some(
        names
            .iter()
            .zip(items)
            .map(|(name, item)| (name.to_string(), item.clone()))
            .collect(),
    )
}

/// Parse an `all_trucks` row value.
pub fn truck_from_tuple(value: &Value) -> Option<TruckItem> {
    TruckItem::from_fields(&tuple_fields(value, &TRUCK_TUPLE)?)
}

/// Parse an `all_reviews` row value.
pub fn review_from_tuple(value: &Value) -> Option<ReviewItem> {
    ReviewItem::from_fields(&tuple_fields(value, &REVIEW_TUPLE)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_truck() -> NewTruck {
        NewTruck {
            name: "T".to_string(),
            food_type: "BBQ".to_string(),
            avg_cost: 10.0,
            latitude: 1.0,
            longitude: 2.0,
        }
    }

    fn stored(mut doc: Document, id: &str) -> Document {
        doc.insert(ID_FIELD.to_string(), json!(id));
        doc.insert(REV_FIELD.to_string(), json!("1-a"));
        doc
    }

    #[test]
    fn truck_document_is_tagged() {
        let doc = truck_document(&new_truck());
        assert_eq!(doc[TYPE_FIELD], TRUCK_KIND);
        assert_eq!(doc["foodtype"], "BBQ");
        assert!(!doc.contains_key("id"));
        assert!(!doc.contains_key(ID_FIELD));
    }

    #[test]
    fn stored_truck_parses_back() {
        let doc = stored(truck_document(&new_truck()), "t1");
        let truck = truck_from_document(&doc).unwrap();
        assert_eq!(truck, new_truck().with_id("t1"));
        assert_eq!(revision(&doc).unwrap(), "1-a");
    }

    #[test]
    fn missing_field_is_a_parse_error() {
        let mut doc = stored(truck_document(&new_truck()), "t1");
        doc.remove("avgcost");
        assert!(matches!(truck_from_document(&doc), Err(BackendError::Parse(_))));
    }

    #[test]
    fn wrong_kind_is_a_parse_error() {
        let review = NewReview {
            truck_id: "t1".to_string(),
            title: "Nice".to_string(),
            text: String::new(),
            star_rating: 4,
        };
        let doc = stored(review_document(&review), "r1");
        assert!(matches!(truck_from_document(&doc), Err(BackendError::Parse(_))));
        assert_eq!(review_from_document(&doc).unwrap(), review.with_id("r1"));
    }

    #[test]
    fn revision_required() {
        let mut doc = stored(truck_document(&new_truck()), "t1");
        doc.remove(REV_FIELD);
        assert!(matches!(revision(&doc), Err(BackendError::Parse(_))));
    }

    #[test]
    fn merge_keeps_unknown_fields() {
        let mut doc = stored(truck_document(&new_truck()), "t1");
        doc.insert("owner".to_string(), json!("sam"));
        let mut truck = new_truck().with_id("t1");
        truck.name = "Renamed".to_string();

        let merged = merge_truck(doc, &truck);
        assert_eq!(merged["name"], "Renamed");
        assert_eq!(merged["owner"], "sam");
        assert_eq!(merged[TYPE_FIELD], TRUCK_KIND);
        assert!(!merged.contains_key(REV_FIELD));
        assert!(!merged.contains_key("id"));
    }

    #[test]
    fn tuples_parse_in_emit_order() {
        let truck = truck_from_tuple(&json!(["t1", "T", "BBQ", 10.0, 1.0, 2.0])).unwrap();
        assert_eq!(truck, new_truck().with_id("t1"));

        let review = review_from_tuple(&json!(["r1", "t1", "Nice", "", 4])).unwrap();
        assert_eq!(review.truck_id, "t1");
        assert_eq!(review.star_rating, 4);
    }

    #[test]
    fn malformed_tuples_are_rejected() {
        assert!(truck_from_tuple(&json!(["t1", "T", "BBQ"])).is_none());
        assert!(truck_from_tuple(&json!(["t1", null, "BBQ", 10.0, 1.0, 2.0])).is_none());
        assert!(truck_from_tuple(&json!({"id": "t1"})).is_none());
        assert!(review_from_tuple(&json!(["r1", "t1", "Nice", "", "4"])).is_none());
    }
}
