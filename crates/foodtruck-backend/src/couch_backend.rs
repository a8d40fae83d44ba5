//! Store-backed implementation of [`FoodTruckBackend`].
//!
//! Reads go through the views of [`crate::design`]; writes go through
//! revision-checked document CRUD. Every store call is bounded by a timeout.
//! Nothing is retried.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use foodtruck_model::{NewReview, NewTruck, ReviewItem, ReviewPatch, TruckItem, TruckPatch};
use foodtruck_store::{DocRevision, Document, DocumentStore, StoreResult, ViewQuery, ViewResult};
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{DEFAULT_RATING, FoodTruckBackend, round_rating};
use crate::design::{
    ALL_DOCUMENTS, ALL_REVIEWS, ALL_TRUCKS, AVG_RATING, DESIGN_NAME, TOTAL_REVIEWS, TOTAL_TRUCKS,
};
use crate::document::{self, REVIEW_KIND, TRUCK_KIND};
use crate::error::{BackendError, BackendResult};

/// Deletions issued concurrently during cascades and resets.
const DELETE_BATCH: usize = 16;

/// [`FoodTruckBackend`] over any [`DocumentStore`].
pub struct CouchBackend<S> {
    store: S,
    timeout: Duration,
}

impl<S: DocumentStore> CouchBackend<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one store call under the timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>> + Send,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(BackendError::from),
            Err(_) => {
                warn!(operation, limit = ?self.timeout, "store call timed out");
                Err(BackendError::Timeout {
                    operation,
                    limit: self.timeout,
                })
            }
        }
    }

    async fn view(&self, view: &str, query: ViewQuery) -> BackendResult<ViewResult> {
        self.bounded("query_view", self.store.query_view(DESIGN_NAME, view, &query))
            .await
    }

    /// Fetch a document that is about to be rewritten or deleted.
    async fn fetch_for_write(&self, id: &str) -> BackendResult<(Document, String)> {
        let doc = self
            .bounded("get", self.store.get(id))
            .await?
            .ok_or_else(|| BackendError::Auth(format!("document {id} not found")))?;
        let rev = document::revision(&doc)?;
        Ok((doc, rev))
    }

    /// Reduced `_count` view, optionally restricted to one key.
    async fn count(&self, view: &str, key: Option<&str>) -> BackendResult<u64> {
        let query = match key {
            Some(key) => ViewQuery::new().key(key),
            None => ViewQuery::new(),
        };
        let result = self.view(view, query).await?;
        match result.reduced_value() {
            None => Ok(0),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| BackendError::Parse(format!("{view} reduced to {value}"))),
        }
    }

    async fn delete_document(&self, target: &DocRevision) -> BackendResult<()> {
        self.bounded("delete", self.store.delete(&target.id, &target.rev))
            .await
    }

    /// Delete every target and wait for all of them. Reports the first
    /// failure after all deletions have settled; nothing is rolled back.
    async fn delete_all(&self, targets: &[DocRevision]) -> BackendResult<()> {
        let mut first_failure = None;
        let mut failures = 0usize;
        for batch in targets.chunks(DELETE_BATCH) {
            let results = join_all(batch.iter().map(|target| self.delete_document(target))).await;
            for (target, result) in batch.iter().zip(results) {
                if let Err(e) = result {
                    warn!(id = %target.id, error = %e, "deletion failed");
                    failures += 1;
                    first_failure.get_or_insert(e);
                }
            }
        }
        match first_failure {
            Some(e) => {
                warn!(failures, total = targets.len(), "bulk deletion incomplete");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Revisions of every review of a truck.
    async fn review_revisions(&self, truck_id: &str) -> BackendResult<Vec<DocRevision>> {
        let result = self
            .view(ALL_REVIEWS, ViewQuery::new().key(truck_id).include_docs(true))
            .await?;
        result
            .rows
            .iter()
            .map(|row| {
                let rev = row
                    .doc
                    .as_ref()
                    .map(document::revision)
                    .transpose()?
                    .ok_or_else(|| BackendError::Parse("review row without document".into()))?;
                let id = row
                    .id
                    .clone()
                    .ok_or_else(|| BackendError::Parse("review row without id".into()))?;
                Ok(DocRevision { id, rev })
            })
            .collect()
    }
}

/// `[_id, _rev]` from an `all_documents` row.
fn id_and_rev(value: &Value) -> Option<DocRevision> {
    let pair = value.as_array()?;
    Some(DocRevision {
        id: pair.first()?.as_str()?.to_string(),
        rev: pair.get(1)?.as_str()?.to_string(),
    })
}

#[async_trait]
impl<S: DocumentStore> FoodTruckBackend for CouchBackend<S> {
    // ── Trucks ─────────────────────────────────────────────────────

    async fn list_trucks(&self) -> BackendResult<Vec<TruckItem>> {
        let result = self
            .view(ALL_TRUCKS, ViewQuery::new().descending(true).include_docs(true))
            .await?;
        let trucks = result
            .rows
            .iter()
            .filter_map(|row| {
                let truck = document::truck_from_tuple(&row.value);
                if truck.is_none() {
                    warn!(id = ?row.id, "dropping malformed truck row");
                }
                truck
            })
            .collect();
        Ok(trucks)
    }

    async fn get_truck(&self, id: &str) -> BackendResult<Option<TruckItem>> {
        match self.bounded("get", self.store.get(id)).await? {
            Some(doc) => document::truck_from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn add_truck(&self, truck: NewTruck) -> BackendResult<TruckItem> {
        let created = self
            .bounded("create", self.store.create(document::truck_document(&truck)))
            .await?;
        info!(id = %created.id, name = %truck.name, "truck added");
        Ok(truck.with_id(created.id))
    }

    async fn update_truck(&self, id: &str, patch: TruckPatch) -> BackendResult<TruckItem> {
        let (doc, rev) = self.fetch_for_write(id).await?;
        let merged = patch.apply(&document::truck_from_document(&doc)?);
        let body = document::merge_truck(doc, &merged);
        let updated = self
            .bounded("update", self.store.update(id, &rev, body))
            .await?;
        debug!(%id, rev = %updated.rev, "truck updated");
        Ok(merged)
    }

    async fn delete_truck(&self, id: &str) -> BackendResult<()> {
        let (doc, rev) = self.fetch_for_write(id).await?;
        document::check_kind(&doc, TRUCK_KIND)?;

        let reviews = self.review_revisions(id).await?;
        self.delete_all(&reviews).await?;

        self.bounded("delete", self.store.delete(id, &rev)).await?;
        info!(%id, reviews = reviews.len(), "truck deleted");
        Ok(())
    }

    async fn count_trucks(&self) -> BackendResult<u64> {
        self.count(TOTAL_TRUCKS, None).await
    }

    async fn clear_all(&self) -> BackendResult<()> {
        let result = self
            .view(ALL_DOCUMENTS, ViewQuery::new().descending(true))
            .await?;
        let targets = result
            .rows
            .iter()
            .map(|row| {
                id_and_rev(&row.value).ok_or_else(|| {
                    BackendError::Parse(format!("all_documents row {:?} lacks id or revision", row.id))
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;
        self.delete_all(&targets).await?;
        info!(documents = targets.len(), "all documents cleared");
        Ok(())
    }

    // ── Reviews ────────────────────────────────────────────────────

    async fn list_reviews_for_truck(&self, truck_id: &str) -> BackendResult<Vec<ReviewItem>> {
        let result = self
            .view(ALL_REVIEWS, ViewQuery::new().key(truck_id).include_docs(true))
            .await?;
        let reviews = result
            .rows
            .iter()
            .filter_map(|row| {
                let review = document::review_from_tuple(&row.value);
                if review.is_none() {
                    warn!(id = ?row.id, %truck_id, "dropping malformed review row");
                }
                review
            })
            .collect();
        Ok(reviews)
    }

    async fn get_review(&self, id: &str) -> BackendResult<Option<ReviewItem>> {
        match self.bounded("get", self.store.get(id)).await? {
            Some(doc) => document::review_from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    async fn add_review(&self, review: NewReview) -> BackendResult<ReviewItem> {
        let created = self
            .bounded("create", self.store.create(document::review_document(&review)))
            .await?;
        info!(id = %created.id, truck_id = %review.truck_id, "review added");
        Ok(review.with_id(created.id))
    }

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> BackendResult<ReviewItem> {
        let (doc, rev) = self.fetch_for_write(id).await?;
        let merged = patch.apply(&document::review_from_document(&doc)?);
        let body = document::merge_review(doc, &merged);
        let updated = self
            .bounded("update", self.store.update(id, &rev, body))
            .await?;
        debug!(%id, rev = %updated.rev, "review updated");
        Ok(merged)
    }

    async fn delete_review(&self, id: &str) -> BackendResult<()> {
        let (doc, rev) = self.fetch_for_write(id).await?;
        document::check_kind(&doc, REVIEW_KIND)?;
        self.bounded("delete", self.store.delete(id, &rev)).await?;
        info!(%id, "review deleted");
        Ok(())
    }

    async fn count_reviews(&self) -> BackendResult<u64> {
        self.count(TOTAL_REVIEWS, None).await
    }

    async fn count_reviews_for_truck(&self, truck_id: &str) -> BackendResult<u64> {
        self.count(TOTAL_REVIEWS, Some(truck_id)).await
    }

    async fn average_rating(&self, truck_id: &str) -> BackendResult<i32> {
        let result = self
            .view(AVG_RATING, ViewQuery::new().key(truck_id))
            .await?;
        let Some(stats) = result.reduced_value() else {
            return Ok(DEFAULT_RATING);
        };
        let stat = |name: &str| {
            stats
                .get(name)
                .and_then(Value::as_f64)
                .ok_or_else(|| BackendError::Parse(format!("{AVG_RATING} result lacks {name}")))
        };
        let (sum, count) = (stat("sum")?, stat("count")?);
        if count == 0.0 {
            return Ok(DEFAULT_RATING);
        }
        Ok(round_rating(sum, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::ensure_schema;
    use foodtruck_store::{MemoryStore, StoreError};
    use serde_json::json;

    async fn backend() -> CouchBackend<MemoryStore> {
        let store = MemoryStore::new("foodtruckapi");
        ensure_schema(&store).await.unwrap();
        CouchBackend::new(store, Duration::from_secs(5))
    }

    fn truck(name: &str) -> NewTruck {
        NewTruck {
            name: name.to_string(),
            food_type: "BBQ".to_string(),
            avg_cost: 10.0,
            latitude: 1.0,
            longitude: 2.0,
        }
    }

    fn review(truck_id: &str, stars: i32) -> NewReview {
        NewReview {
            truck_id: truck_id.to_string(),
            title: format!("{stars} stars"),
            text: "text".to_string(),
            star_rating: stars,
        }
    }

    #[tokio::test]
    async fn add_then_get_truck() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        assert!(!added.id.is_empty());

        let fetched = backend.get_truck(&added.id).await.unwrap();
        assert_eq!(fetched, Some(added));
    }

    #[tokio::test]
    async fn get_missing_truck_is_none() {
        let backend = backend().await;
        assert_eq!(backend.get_truck("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_truck_with_review_id_is_parse_error() {
        let backend = backend().await;
        let added = backend.add_review(review("t1", 3)).await.unwrap();
        assert!(matches!(
            backend.get_truck(&added.id).await,
            Err(BackendError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn list_trucks_descending_by_id() {
        let backend = backend().await;
        for name in ["a", "b", "c"] {
            backend.add_truck(truck(name)).await.unwrap();
        }
        let trucks = backend.list_trucks().await.unwrap();
        assert_eq!(trucks.len(), 3);
        let ids: Vec<&str> = trucks.iter().map(|t| t.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn list_trucks_drops_malformed_rows() {
        let backend = backend().await;
        backend.add_truck(truck("good")).await.unwrap();
        let broken = json!({"type": "foodtruck", "name": "broken"});
        backend
            .store()
            .create(broken.as_object().unwrap().clone())
            .await
            .unwrap();

        let trucks = backend.list_trucks().await.unwrap();
        assert_eq!(trucks.len(), 1);
        assert_eq!(trucks[0].name, "good");
        assert_eq!(backend.count_trucks().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_merges_supplied_fields() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        let patch = TruckPatch {
            name: Some("UpdatedTruck".to_string()),
            latitude: Some(0.0),
            ..Default::default()
        };

        let updated = backend.update_truck(&added.id, patch).await.unwrap();
        assert_eq!(updated.name, "UpdatedTruck");
        assert_eq!(updated.latitude, 0.0);
        assert_eq!(updated.food_type, added.food_type);
        assert_eq!(updated.longitude, added.longitude);

        let fetched = backend.get_truck(&added.id).await.unwrap();
        assert_eq!(fetched, Some(updated));
    }

    #[tokio::test]
    async fn update_missing_truck_is_auth_error() {
        let backend = backend().await;
        let result = backend.update_truck("nope", TruckPatch::default()).await;
        assert!(matches!(result, Err(BackendError::Auth(_))));
    }

    #[tokio::test]
    async fn delete_truck_cascades_to_its_reviews() {
        let backend = backend().await;
        let doomed = backend.add_truck(truck("doomed")).await.unwrap();
        let kept = backend.add_truck(truck("kept")).await.unwrap();
        for stars in [3, 4, 5] {
            backend.add_review(review(&doomed.id, stars)).await.unwrap();
        }
        backend.add_review(review(&kept.id, 2)).await.unwrap();

        backend.delete_truck(&doomed.id).await.unwrap();

        assert_eq!(backend.get_truck(&doomed.id).await.unwrap(), None);
        assert_eq!(backend.count_trucks().await.unwrap(), 1);
        assert_eq!(backend.count_reviews_for_truck(&doomed.id).await.unwrap(), 0);
        assert_eq!(backend.count_reviews_for_truck(&kept.id).await.unwrap(), 1);
        assert_eq!(backend.count_reviews().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_missing_truck_is_auth_error() {
        let backend = backend().await;
        assert!(matches!(
            backend.delete_truck("nope").await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn delete_review_refuses_a_truck_id() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        backend.add_review(review(&added.id, 4)).await.unwrap();

        assert!(matches!(
            backend.delete_review(&added.id).await,
            Err(BackendError::Parse(_))
        ));
        assert_eq!(backend.get_truck(&added.id).await.unwrap(), Some(added.clone()));
        assert_eq!(backend.count_reviews_for_truck(&added.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_truck_refuses_a_review_id() {
        let backend = backend().await;
        let added = backend.add_review(review("t1", 4)).await.unwrap();

        assert!(matches!(
            backend.delete_truck(&added.id).await,
            Err(BackendError::Parse(_))
        ));
        assert_eq!(backend.get_review(&added.id).await.unwrap(), Some(added));
    }

    #[tokio::test]
    async fn failed_cascade_keeps_the_truck() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        let stuck = backend.add_review(review(&added.id, 2)).await.unwrap();
        for stars in [3, 4] {
            backend.add_review(review(&added.id, stars)).await.unwrap();
        }
        backend.store().fail_deletes_of(&stuck.id);

        assert!(matches!(
            backend.delete_truck(&added.id).await,
            Err(BackendError::Store(StoreError::Transport(_)))
        ));
        // The other deletions still ran; nothing is restored.
        assert_eq!(backend.get_truck(&added.id).await.unwrap(), Some(added.clone()));
        assert_eq!(backend.count_reviews_for_truck(&added.id).await.unwrap(), 1);
        assert_eq!(backend.get_review(&stuck.id).await.unwrap(), Some(stuck));
    }

    #[tokio::test]
    async fn concurrent_updates_surface_a_conflict() {
        let store = MemoryStore::new("foodtruckapi");
        ensure_schema(&store).await.unwrap();
        let added = CouchBackend::new(store.clone(), Duration::from_secs(5))
            .add_truck(truck("T"))
            .await
            .unwrap();

        // Both updates read the same revision before either writes.
        let backend = CouchBackend::new(
            store.with_latency(Duration::from_millis(10)),
            Duration::from_secs(5),
        );
        let rename = |name: &str| TruckPatch {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let (first, second) = tokio::join!(
            backend.update_truck(&added.id, rename("A")),
            backend.update_truck(&added.id, rename("B")),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(BackendError::Store(StoreError::Conflict(_))))));
    }

    #[tokio::test]
    async fn clear_all_empties_both_collections() {
        let backend = backend().await;
        for i in 0..20 {
            let added = backend.add_truck(truck(&format!("t{i}"))).await.unwrap();
            backend.add_review(review(&added.id, 4)).await.unwrap();
        }
        assert_eq!(backend.count_trucks().await.unwrap(), 20);

        backend.clear_all().await.unwrap();

        assert_eq!(backend.count_trucks().await.unwrap(), 0);
        assert_eq!(backend.count_reviews().await.unwrap(), 0);
        assert_eq!(backend.store().document_count(), 0);
        // Views keep working: the design document is not a data document.
        assert!(backend.list_trucks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counts_default_to_zero() {
        let backend = backend().await;
        assert_eq!(backend.count_trucks().await.unwrap(), 0);
        assert_eq!(backend.count_reviews().await.unwrap(), 0);
        assert_eq!(backend.count_reviews_for_truck("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reviews_are_scoped_to_their_truck() {
        let backend = backend().await;
        let a = backend.add_truck(truck("a")).await.unwrap();
        let b = backend.add_truck(truck("b")).await.unwrap();
        let first = backend.add_review(review(&a.id, 5)).await.unwrap();
        backend.add_review(review(&a.id, 1)).await.unwrap();
        backend.add_review(review(&b.id, 3)).await.unwrap();

        let reviews = backend.list_reviews_for_truck(&a.id).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.truck_id == a.id));
        assert!(reviews.contains(&first));
        assert_eq!(backend.count_reviews().await.unwrap(), 3);
        assert_eq!(backend.count_reviews_for_truck(&a.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn review_round_trip_and_update() {
        let backend = backend().await;
        let added = backend.add_review(review("t1", 2)).await.unwrap();
        assert_eq!(backend.get_review(&added.id).await.unwrap(), Some(added.clone()));

        let patch = ReviewPatch {
            star_rating: Some(5),
            ..Default::default()
        };
        let updated = backend.update_review(&added.id, patch).await.unwrap();
        assert_eq!(updated.star_rating, 5);
        assert_eq!(updated.title, added.title);
        assert_eq!(backend.get_review(&added.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn delete_review() {
        let backend = backend().await;
        let added = backend.add_review(review("t1", 2)).await.unwrap();
        backend.delete_review(&added.id).await.unwrap();
        assert_eq!(backend.get_review(&added.id).await.unwrap(), None);
        assert!(matches!(
            backend.delete_review(&added.id).await,
            Err(BackendError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn average_rating_rounds_half_up() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        backend.add_review(review(&added.id, 4)).await.unwrap();
        backend.add_review(review(&added.id, 5)).await.unwrap();
        assert_eq!(backend.average_rating(&added.id).await.unwrap(), 5);

        backend.add_review(review(&added.id, 3)).await.unwrap();
        assert_eq!(backend.average_rating(&added.id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn average_rating_without_reviews_is_default() {
        let backend = backend().await;
        let added = backend.add_truck(truck("T")).await.unwrap();
        assert_eq!(backend.average_rating(&added.id).await.unwrap(), DEFAULT_RATING);
    }

    #[tokio::test]
    async fn store_errors_pass_through() {
        let backend = backend().await;
        backend.store().set_unavailable(true);
        assert!(matches!(
            backend.list_trucks().await,
            Err(BackendError::Store(StoreError::Transport(_)))
        ));
    }

    #[tokio::test]
    async fn missing_views_surface_as_store_errors() {
        let store = MemoryStore::new("foodtruckapi");
        store.create_database().await.unwrap();
        let backend = CouchBackend::new(store, Duration::from_secs(5));
        assert!(matches!(
            backend.count_trucks().await,
            Err(BackendError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn slow_store_calls_time_out() {
        let store = MemoryStore::new("foodtruckapi");
        ensure_schema(&store).await.unwrap();
        let backend = CouchBackend::new(
            store.with_latency(Duration::from_millis(200)),
            Duration::from_millis(20),
        );
        assert!(matches!(
            backend.count_trucks().await,
            Err(BackendError::Timeout { operation: "query_view", .. })
        ));
    }

    #[test]
    fn id_and_rev_parsing() {
        assert_eq!(
            id_and_rev(&json!(["a", "1-x"])),
            Some(DocRevision {
                id: "a".to_string(),
                rev: "1-x".to_string()
            })
        );
        assert_eq!(id_and_rev(&json!(["a"])), None);
        assert_eq!(id_and_rev(&json!("a")), None);
    }
}
