//! The capability interface consumed by the HTTP controller.

use async_trait::async_trait;
use foodtruck_model::{NewReview, NewTruck, ReviewItem, ReviewPatch, TruckItem, TruckPatch};

use crate::error::BackendResult;

/// Rating reported for a truck without reviews.
pub const DEFAULT_RATING: i32 = 1;

/// Every food truck and review operation.
///
/// By-id reads return `Ok(None)` when nothing is stored under the id; writes
/// that need the current document fail with `BackendError::Auth` instead.
#[async_trait]
pub trait FoodTruckBackend: Send + Sync {
    // ── Trucks ─────────────────────────────────────────────────────

    async fn list_trucks(&self) -> BackendResult<Vec<TruckItem>>;

    async fn get_truck(&self, id: &str) -> BackendResult<Option<TruckItem>>;

    async fn add_truck(&self, truck: NewTruck) -> BackendResult<TruckItem>;

    /// Merge `patch` over the stored truck and return the result.
    async fn update_truck(&self, id: &str, patch: TruckPatch) -> BackendResult<TruckItem>;

    /// Delete a truck and every review referencing it.
    async fn delete_truck(&self, id: &str) -> BackendResult<()>;

    async fn count_trucks(&self) -> BackendResult<u64>;

    /// Delete every document. Administrative reset; not safe against
    /// concurrent writers.
    async fn clear_all(&self) -> BackendResult<()>;

    // ── Reviews ────────────────────────────────────────────────────

    async fn list_reviews_for_truck(&self, truck_id: &str) -> BackendResult<Vec<ReviewItem>>;

    async fn get_review(&self, id: &str) -> BackendResult<Option<ReviewItem>>;

    async fn add_review(&self, review: NewReview) -> BackendResult<ReviewItem>;

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> BackendResult<ReviewItem>;

    async fn delete_review(&self, id: &str) -> BackendResult<()>;

    async fn count_reviews(&self) -> BackendResult<u64>;

    async fn count_reviews_for_truck(&self, truck_id: &str) -> BackendResult<u64>;

    /// Mean star rating rounded half-up, or [`DEFAULT_RATING`] without reviews.
    async fn average_rating(&self, truck_id: &str) -> BackendResult<i32>;
}

/// Round half-up, the convention for reported ratings.
pub(crate) fn round_rating(sum: f64, count: f64) -> i32 {
    (sum / count + 0.5).floor() as i32
}
