//! Review of a single food truck.

use serde::{Deserialize, Serialize};

use crate::FieldMap;

/// One review, referencing exactly one truck by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewItem {
    pub id: String,
    /// Id of the reviewed truck. Existence is not checked at write time.
    #[serde(rename = "truckid")]
    pub truck_id: String,
    #[serde(rename = "reviewtitle")]
    pub title: String,
    #[serde(rename = "reviewtext")]
    pub text: String,
    /// 1 to 5 by convention; not validated here.
    #[serde(rename = "starrating")]
    pub star_rating: i32,
}

impl ReviewItem {
    pub fn to_fields(&self) -> FieldMap {
        crate::to_field_map(self)
    }

    pub fn from_fields(fields: &FieldMap) -> Option<Self> {
        crate::from_field_map(fields)
    }
}

/// Fields of a review about to be created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewReview {
    #[serde(rename = "truckid")]
    pub truck_id: String,
    #[serde(rename = "reviewtitle")]
    pub title: String,
    #[serde(rename = "reviewtext")]
    pub text: String,
    #[serde(rename = "starrating")]
    pub star_rating: i32,
}

impl NewReview {
    pub fn with_id(self, id: impl Into<String>) -> ReviewItem {
        ReviewItem {
            id: id.into(),
            truck_id: self.truck_id,
            title: self.title,
            text: self.text,
            star_rating: self.star_rating,
        }
    }
}

/// Partial update of a review. The owning truck cannot be changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewPatch {
    #[serde(rename = "reviewtitle", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "reviewtext", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "starrating", default, skip_serializing_if = "Option::is_none")]
    pub star_rating: Option<i32>,
}

impl ReviewPatch {
    pub fn apply(&self, current: &ReviewItem) -> ReviewItem {
        ReviewItem {
            id: current.id.clone(),
            truck_id: current.truck_id.clone(),
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            text: self.text.clone().unwrap_or_else(|| current.text.clone()),
            star_rating: self.star_rating.unwrap_or(current.star_rating),
        }
    }
}
