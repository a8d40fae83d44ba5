//! REST API handlers.
//!
//! Each handler validates its input, makes at most one backend call and
//! maps the outcome onto a status code. Invalid input never reaches the
//! backend. Backend failures are logged here and answered with a generic
//! 400; clients only ever see the status reason.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use foodtruck_backend::BackendError;
use foodtruck_model::{NewReview, NewTruck, ReviewPatch, TruckPatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::ApiState;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// 200 with `value` as the JSON body.
fn json_ok<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "response serialization failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn error_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("error");
    (status, axum::Json(ErrorBody { error: reason })).into_response()
}

fn rejected(reason: &str) -> Response {
    warn!(reason, "rejecting request");
    error_response(StatusCode::BAD_REQUEST)
}

fn backend_failure(operation: &str, e: BackendError) -> Response {
    error!(operation, error = %e, "backend call failed");
    error_response(StatusCode::BAD_REQUEST)
}

/// Path ids must carry at least one non-blank character.
fn valid_id(id: &str) -> bool {
    !id.trim().is_empty()
}

/// Any method on an id route whose id segment is empty.
pub async fn missing_id() -> Response {
    rejected("missing id")
}

/// Decode a request body that must be a JSON object.
fn parse_object<T: DeserializeOwned>(body: &[u8]) -> Result<T, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| "body is not JSON")?;
    if !value.is_object() {
        return Err("body is not a JSON object");
    }
    serde_json::from_value(value).map_err(|_| "body has a mistyped field")
}

fn required(field: Option<String>, name: &'static str) -> Result<String, &'static str> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(name),
    }
}

/// POST body for a truck. Only `name` is required.
#[derive(Deserialize)]
struct TruckBody {
    name: Option<String>,
    foodtype: Option<String>,
    avgcost: Option<f32>,
    latitude: Option<f32>,
    longitude: Option<f32>,
}

impl TruckBody {
    fn into_new(self) -> Result<NewTruck, &'static str> {
        Ok(NewTruck {
            name: required(self.name, "missing name")?,
            food_type: self.foodtype.unwrap_or_default(),
            avg_cost: self.avgcost.unwrap_or_default(),
            latitude: self.latitude.unwrap_or_default(),
            longitude: self.longitude.unwrap_or_default(),
        })
    }
}

/// POST body for a review. Only `reviewtitle` is required; the truck comes
/// from the path.
#[derive(Deserialize)]
struct ReviewBody {
    reviewtitle: Option<String>,
    reviewtext: Option<String>,
    starrating: Option<i32>,
}

impl ReviewBody {
    fn into_new(self, truck_id: String) -> Result<NewReview, &'static str> {
        Ok(NewReview {
            truck_id,
            title: required(self.reviewtitle, "missing reviewtitle")?,
            text: self.reviewtext.unwrap_or_default(),
            star_rating: self.starrating.unwrap_or_default(),
        })
    }
}

fn truck_patch(body: &[u8]) -> Result<TruckPatch, &'static str> {
    let patch: TruckPatch = parse_object(body)?;
    if patch.name.as_deref() == Some("") {
        return Err("empty name");
    }
    Ok(patch)
}

fn review_patch(body: &[u8]) -> Result<ReviewPatch, &'static str> {
    let patch: ReviewPatch = parse_object(body)?;
    if patch.title.as_deref() == Some("") {
        return Err("empty reviewtitle");
    }
    Ok(patch)
}

// ── Trucks ─────────────────────────────────────────────────────

/// GET /api/v1/trucks
pub async fn list_trucks(State(state): State<ApiState>) -> Response {
    match state.backend.list_trucks().await {
        Ok(trucks) => json_ok(&trucks),
        Err(e) => backend_failure("list_trucks", e),
    }
}

/// POST /api/v1/trucks
pub async fn add_truck(State(state): State<ApiState>, body: Bytes) -> Response {
    let truck = match parse_object::<TruckBody>(&body).and_then(TruckBody::into_new) {
        Ok(truck) => truck,
        Err(reason) => return rejected(reason),
    };
    match state.backend.add_truck(truck).await {
        Ok(truck) => {
            debug!(id = %truck.id, "truck created");
            json_ok(&truck)
        }
        Err(e) => backend_failure("add_truck", e),
    }
}

/// GET /api/v1/trucks/count
pub async fn count_trucks(State(state): State<ApiState>) -> Response {
    match state.backend.count_trucks().await {
        Ok(count) => json_ok(&json!({ "count": count })),
        Err(e) => backend_failure("count_trucks", e),
    }
}

/// GET /api/v1/trucks/{id}
pub async fn get_truck(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.get_truck(&id).await {
        Ok(Some(truck)) => json_ok(&truck),
        Ok(None) => error_response(StatusCode::NOT_FOUND),
        Err(e) => backend_failure("get_truck", e),
    }
}

/// PUT /api/v1/trucks/{id}
pub async fn update_truck(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    let patch = match truck_patch(&body) {
        Ok(patch) => patch,
        Err(reason) => return rejected(reason),
    };
    match state.backend.update_truck(&id, patch).await {
        Ok(truck) => json_ok(&truck),
        Err(e) => backend_failure("update_truck", e),
    }
}

/// DELETE /api/v1/trucks/{id}
pub async fn delete_truck(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.delete_truck(&id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => backend_failure("delete_truck", e),
    }
}

/// GET /api/v1/trucks/reviews/{id}
pub async fn list_reviews(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.list_reviews_for_truck(&id).await {
        Ok(reviews) => json_ok(&reviews),
        Err(e) => backend_failure("list_reviews_for_truck", e),
    }
}

// ── Reviews ────────────────────────────────────────────────────

/// GET /api/v1/reviews/{id}
pub async fn get_review(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.get_review(&id).await {
        Ok(Some(review)) => json_ok(&review),
        Ok(None) => error_response(StatusCode::NOT_FOUND),
        Err(e) => backend_failure("get_review", e),
    }
}

/// POST /api/v1/reviews/{id}, where `id` names the reviewed truck.
pub async fn add_review(
    State(state): State<ApiState>,
    Path(truck_id): Path<String>,
    body: Bytes,
) -> Response {
    if !valid_id(&truck_id) {
        return rejected("blank id");
    }
    let review = match parse_object::<ReviewBody>(&body).and_then(|b| b.into_new(truck_id)) {
        Ok(review) => review,
        Err(reason) => return rejected(reason),
    };
    match state.backend.add_review(review).await {
        Ok(review) => {
            debug!(id = %review.id, truck_id = %review.truck_id, "review created");
            json_ok(&review)
        }
        Err(e) => backend_failure("add_review", e),
    }
}

/// PUT /api/v1/reviews/{id}
pub async fn update_review(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    let patch = match review_patch(&body) {
        Ok(patch) => patch,
        Err(reason) => return rejected(reason),
    };
    match state.backend.update_review(&id, patch).await {
        Ok(review) => json_ok(&review),
        Err(e) => backend_failure("update_review", e),
    }
}

/// DELETE /api/v1/reviews/{id}
pub async fn delete_review(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.delete_review(&id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => backend_failure("delete_review", e),
    }
}

/// GET /api/v1/reviews/count
pub async fn count_reviews(State(state): State<ApiState>) -> Response {
    match state.backend.count_reviews().await {
        Ok(count) => json_ok(&json!({ "count": count })),
        Err(e) => backend_failure("count_reviews", e),
    }
}

/// GET /api/v1/reviews/count/{id}
pub async fn count_reviews_for_truck(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.count_reviews_for_truck(&id).await {
        Ok(count) => json_ok(&json!({ "count": count })),
        Err(e) => backend_failure("count_reviews_for_truck", e),
    }
}

/// GET /api/v1/reviews/rating/{id}
pub async fn average_rating(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if !valid_id(&id) {
        return rejected("blank id");
    }
    match state.backend.average_rating(&id).await {
        Ok(rating) => json_ok(&json!({ "rating": rating })),
        Err(e) => backend_failure("average_rating", e),
    }
}
