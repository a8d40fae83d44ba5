//! foodtruck-model — entity types for the food truck API.
//!
//! `TruckItem` and `ReviewItem` are immutable values with structural
//! equality. Their serde shape is the wire shape: lowercase field names
//! (`foodtype`, `avgcost`, `reviewtitle`, ...) shared by HTTP bodies and
//! stored documents.
//!
//! Inputs come in two flavours: `New*` for creation and `*Patch` for partial
//! updates, where every field is optional and `None` means "not supplied".

pub mod review;
pub mod truck;

pub use review::{NewReview, ReviewItem, ReviewPatch};
pub use truck::{NewTruck, TruckItem, TruckPatch};

/// Generic string-keyed field mapping used for transport.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Serialize a value into a field map. Values that do not serialize to a
/// JSON object yield an empty map.
pub fn to_field_map<T: serde::Serialize>(value: &T) -> FieldMap {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => FieldMap::new(),
    }
}

pub(crate) fn from_field_map<T: serde::de::DeserializeOwned>(fields: &FieldMap) -> Option<T> {
    serde_json::from_value(serde_json::Value::Object(fields.clone())).ok()
}
