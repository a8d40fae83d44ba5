//! foodtruck-api — REST API for food trucks and their reviews.
//!
//! Handlers depend only on [`FoodTruckBackend`]; the binary decides which
//! implementation sits behind it.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/trucks` | List all trucks |
//! | POST | `/api/v1/trucks` | Add a truck |
//! | GET | `/api/v1/trucks/count` | Number of trucks |
//! | GET | `/api/v1/trucks/{id}` | Get a truck |
//! | PUT | `/api/v1/trucks/{id}` | Update some fields of a truck |
//! | DELETE | `/api/v1/trucks/{id}` | Delete a truck and its reviews |
//! | GET | `/api/v1/trucks/reviews/{id}` | List reviews of a truck |
//! | GET | `/api/v1/reviews/{id}` | Get a review |
//! | POST | `/api/v1/reviews/{id}` | Add a review to truck `id` |
//! | PUT | `/api/v1/reviews/{id}` | Update some fields of a review |
//! | DELETE | `/api/v1/reviews/{id}` | Delete a review |
//! | GET | `/api/v1/reviews/count` | Number of reviews |
//! | GET | `/api/v1/reviews/count/{id}` | Number of reviews of a truck |
//! | GET | `/api/v1/reviews/rating/{id}` | Average star rating of a truck |
//!
//! An id route reached with an empty id (`/api/v1/trucks/`, `/api/v1/reviews/`
//! and so on) answers 400 for every method.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use foodtruck_backend::FoodTruckBackend;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<dyn FoodTruckBackend>,
}

/// Build the API router, every route under `/api/v1`.
pub fn build_router(backend: Arc<dyn FoodTruckBackend>) -> Router {
    let api_routes = Router::new()
        .route("/trucks", get(handlers::list_trucks).post(handlers::add_truck))
        .route("/trucks/count", get(handlers::count_trucks))
        .route(
            "/trucks/{id}",
            get(handlers::get_truck)
                .put(handlers::update_truck)
                .delete(handlers::delete_truck),
        )
        .route("/trucks/reviews/{id}", get(handlers::list_reviews))
        .route("/reviews/count", get(handlers::count_reviews))
        .route("/reviews/count/{id}", get(handlers::count_reviews_for_truck))
        .route("/reviews/rating/{id}", get(handlers::average_rating))
        .route(
            "/reviews/{id}",
            get(handlers::get_review)
                .post(handlers::add_review)
                .put(handlers::update_review)
                .delete(handlers::delete_review),
        )
        .route("/trucks/", any(handlers::missing_id))
        .route("/trucks/reviews/", any(handlers::missing_id))
        .route("/reviews/", any(handlers::missing_id))
        .route("/reviews/count/", any(handlers::missing_id))
        .route("/reviews/rating/", any(handlers::missing_id))
        .with_state(ApiState { backend });

    Router::new().nest("/api/v1", api_routes)
}
