//! In-process fake of [`FoodTruckBackend`].
//!
//! Same observable behaviour as [`crate::CouchBackend`], without a store.
//! Records how many operations reached it and can be switched into a
//! failing mode, so callers can check what they forward.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use foodtruck_model::{NewReview, NewTruck, ReviewItem, ReviewPatch, TruckItem, TruckPatch};
use foodtruck_store::StoreError;
use uuid::Uuid;

use crate::backend::{DEFAULT_RATING, FoodTruckBackend, round_rating};
use crate::document::{REVIEW_KIND, TRUCK_KIND};
use crate::error::{BackendError, BackendResult};

#[derive(Default)]
struct State {
    trucks: BTreeMap<String, TruckItem>,
    reviews: BTreeMap<String, ReviewItem>,
}

/// Shared handle; clones see the same data and counters.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations invoked so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When set, every operation fails with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn enter(&self) -> BackendResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory backend set to fail".into()).into());
        }
        Ok(())
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, State>> {
        self.enter()?;
        self.state
            .read()
            .map_err(|_| StoreError::Transport("lock poisoned".into()).into())
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, State>> {
        self.enter()?;
        self.state
            .write()
            .map_err(|_| StoreError::Transport("lock poisoned".into()).into())
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn missing(id: &str) -> BackendError {
    BackendError::Auth(format!("document {id} not found"))
}

fn wrong_kind(id: &str, expected: &str) -> BackendError {
    BackendError::Parse(format!("document {id} is not a {expected}"))
}

impl State {
    /// Reject ids that name a document of the other kind.
    fn expect_truck(&self, id: &str) -> BackendResult<()> {
        if self.reviews.contains_key(id) {
            return Err(wrong_kind(id, TRUCK_KIND));
        }
        Ok(())
    }

    fn expect_review(&self, id: &str) -> BackendResult<()> {
        if self.trucks.contains_key(id) {
            return Err(wrong_kind(id, REVIEW_KIND));
        }
        Ok(())
    }
}

#[async_trait]
impl FoodTruckBackend for MemoryBackend {
    async fn list_trucks(&self) -> BackendResult<Vec<TruckItem>> {
        Ok(self.read()?.trucks.values().rev().cloned().collect())
    }

    async fn get_truck(&self, id: &str) -> BackendResult<Option<TruckItem>> {
        let state = self.read()?;
        state.expect_truck(id)?;
        Ok(state.trucks.get(id).cloned())
    }

    async fn add_truck(&self, truck: NewTruck) -> BackendResult<TruckItem> {
        let item = truck.with_id(new_id());
        self.write()?.trucks.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn update_truck(&self, id: &str, patch: TruckPatch) -> BackendResult<TruckItem> {
        let mut state = self.write()?;
        state.expect_truck(id)?;
        let current = state.trucks.get_mut(id).ok_or_else(|| missing(id))?;
        *current = patch.apply(current);
        Ok(current.clone())
    }

    async fn delete_truck(&self, id: &str) -> BackendResult<()> {
        let mut state = self.write()?;
        state.expect_truck(id)?;
        state.trucks.remove(id).ok_or_else(|| missing(id))?;
        state.reviews.retain(|_, review| review.truck_id != id);
        Ok(())
    }

    async fn count_trucks(&self) -> BackendResult<u64> {
        Ok(self.read()?.trucks.len() as u64)
    }

    async fn clear_all(&self) -> BackendResult<()> {
        let mut state = self.write()?;
        state.trucks.clear();
        state.reviews.clear();
        Ok(())
    }

    async fn list_reviews_for_truck(&self, truck_id: &str) -> BackendResult<Vec<ReviewItem>> {
        Ok(self
            .read()?
            .reviews
            .values()
            .filter(|review| review.truck_id == truck_id)
            .cloned()
            .collect())
    }

    async fn get_review(&self, id: &str) -> BackendResult<Option<ReviewItem>> {
        let state = self.read()?;
        state.expect_review(id)?;
        Ok(state.reviews.get(id).cloned())
    }

    async fn add_review(&self, review: NewReview) -> BackendResult<ReviewItem> {
        let item = review.with_id(new_id());
        self.write()?.reviews.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> BackendResult<ReviewItem> {
        let mut state = self.write()?;
        state.expect_review(id)?;
        let current = state.reviews.get_mut(id).ok_or_else(|| missing(id))?;
        *current = patch.apply(current);
        Ok(current.clone())
    }

    async fn delete_review(&self, id: &str) -> BackendResult<()> {
        let mut state = self.write()?;
        state.expect_review(id)?;
        state.reviews.remove(id).ok_or_else(|| missing(id))?;
        Ok(())
    }

    async fn count_reviews(&self) -> BackendResult<u64> {
        Ok(self.read()?.reviews.len() as u64)
    }

    async fn count_reviews_for_truck(&self, truck_id: &str) -> BackendResult<u64> {
        let state = self.read()?;
        Ok(state
            .reviews
            .values()
            .filter(|review| review.truck_id == truck_id)
            .count() as u64)
    }

    async fn average_rating(&self, truck_id: &str) -> BackendResult<i32> {
        let state = self.read()?;
        let (sum, count) = state
            .reviews
            .values()
            .filter(|review| review.truck_id == truck_id)
            .fold((0.0, 0.0), |(sum, count), review| {
                (sum + f64::from(review.star_rating), count + 1.0)
            });
        if count == 0.0 {
            return Ok(DEFAULT_RATING);
        }
        Ok(round_rating(sum, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truck(name: &str) -> NewTruck {
        NewTruck {
            name: name.to_string(),
            food_type: "Tacos".to_string(),
            avg_cost: 8.0,
            latitude: 0.5,
            longitude: 0.5,
        }
    }

    fn review(truck_id: &str, stars: i32) -> NewReview {
        NewReview {
            truck_id: truck_id.to_string(),
            title: "title".to_string(),
            text: "text".to_string(),
            star_rating: stars,
        }
    }

    #[tokio::test]
    async fn counts_calls() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.calls(), 0);
        backend.add_truck(truck("a")).await.unwrap();
        backend.count_trucks().await.unwrap();
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn failing_mode_passes_through_store_error() {
        let backend = MemoryBackend::new();
        backend.set_failing(true);
        assert!(matches!(
            backend.list_trucks().await,
            Err(BackendError::Store(StoreError::Transport(_)))
        ));
        assert_eq!(backend.calls(), 1);

        backend.set_failing(false);
        assert!(backend.list_trucks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();
        handle.add_truck(truck("a")).await.unwrap();
        assert_eq!(backend.count_trucks().await.unwrap(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn delete_truck_cascades() {
        let backend = MemoryBackend::new();
        let a = backend.add_truck(truck("a")).await.unwrap();
        let b = backend.add_truck(truck("b")).await.unwrap();
        backend.add_review(review(&a.id, 1)).await.unwrap();
        backend.add_review(review(&b.id, 2)).await.unwrap();

        backend.delete_truck(&a.id).await.unwrap();
        assert_eq!(backend.count_reviews().await.unwrap(), 1);
        assert_eq!(backend.count_reviews_for_truck(&a.id).await.unwrap(), 0);
        assert!(matches!(
            backend.delete_truck(&a.id).await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_is_auth_error() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.update_review("nope", ReviewPatch::default()).await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn ids_of_the_other_kind_are_parse_errors() {
        let backend = MemoryBackend::new();
        let t = backend.add_truck(truck("a")).await.unwrap();
        let r = backend.add_review(review(&t.id, 3)).await.unwrap();

        assert!(matches!(backend.get_truck(&r.id).await, Err(BackendError::Parse(_))));
        assert!(matches!(backend.get_review(&t.id).await, Err(BackendError::Parse(_))));
        assert!(matches!(
            backend.update_truck(&r.id, TruckPatch::default()).await,
            Err(BackendError::Parse(_))
        ));
        assert!(matches!(
            backend.update_review(&t.id, ReviewPatch::default()).await,
            Err(BackendError::Parse(_))
        ));
        assert!(matches!(backend.delete_truck(&r.id).await, Err(BackendError::Parse(_))));
        assert!(matches!(backend.delete_review(&t.id).await, Err(BackendError::Parse(_))));

        assert_eq!(backend.count_trucks().await.unwrap(), 1);
        assert_eq!(backend.count_reviews_for_truck(&t.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rating_matches_store_backend() {
        let backend = MemoryBackend::new();
        let a = backend.add_truck(truck("a")).await.unwrap();
        assert_eq!(backend.average_rating(&a.id).await.unwrap(), DEFAULT_RATING);
        backend.add_review(review(&a.id, 4)).await.unwrap();
        backend.add_review(review(&a.id, 5)).await.unwrap();
        assert_eq!(backend.average_rating(&a.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn list_trucks_is_descending_by_id() {
        let backend = MemoryBackend::new();
        for name in ["a", "b", "c", "d"] {
            backend.add_truck(truck(name)).await.unwrap();
        }
        let ids: Vec<String> = backend
            .list_trucks()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
    }
}
