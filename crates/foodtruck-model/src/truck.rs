//! Food truck listing.

use serde::{Deserialize, Serialize};

use crate::FieldMap;

/// One food truck listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TruckItem {
    /// Store-assigned identity.
    pub id: String,
    pub name: String,
    #[serde(rename = "foodtype")]
    pub food_type: String,
    /// Average cost per meal. Not range-checked.
    #[serde(rename = "avgcost")]
    pub avg_cost: f32,
    pub latitude: f32,
    pub longitude: f32,
}

impl TruckItem {
    /// Convert into a generic field mapping keyed by wire names.
    pub fn to_fields(&self) -> FieldMap {
        crate::to_field_map(self)
    }

    /// Build from a field mapping. `None` if any field is missing or mistyped.
    pub fn from_fields(fields: &FieldMap) -> Option<Self> {
        crate::from_field_map(fields)
    }
}

/// Fields of a truck about to be created. The id is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTruck {
    pub name: String,
    #[serde(rename = "foodtype")]
    pub food_type: String,
    #[serde(rename = "avgcost")]
    pub avg_cost: f32,
    pub latitude: f32,
    pub longitude: f32,
}

impl NewTruck {
    /// Attach the store-assigned id.
    pub fn with_id(self, id: impl Into<String>) -> TruckItem {
        TruckItem {
            id: id.into(),
            name: self.name,
            food_type: self.food_type,
            avg_cost: self.avg_cost,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Partial update of a truck. A `None` field keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TruckPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "foodtype", default, skip_serializing_if = "Option::is_none")]
    pub food_type: Option<String>,
    #[serde(rename = "avgcost", default, skip_serializing_if = "Option::is_none")]
    pub avg_cost: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f32>,
}

impl TruckPatch {
    /// Merge this patch over `current`.
    pub fn apply(&self, current: &TruckItem) -> TruckItem {
        TruckItem {
            id: current.id.clone(),
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            food_type: self
                .food_type
                .clone()
                .unwrap_or_else(|| current.food_type.clone()),
            avg_cost: self.avg_cost.unwrap_or(current.avg_cost),
            latitude: self.latitude.unwrap_or(current.latitude),
            longitude: self.longitude.unwrap_or(current.longitude),
        }
    }
}
