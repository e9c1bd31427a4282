//! Routes for exposed services: `GET /:segment/:id`, `POST /:segment`, `DELETE /:segment`.

use crate::handlers::service::{read, remove, write};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn service_routes(state: AppState) -> Router {
    Router::new()
        .route("/:segment", post(write).delete(remove))
        .route("/:segment/", post(write).delete(remove))
        .route("/:segment/:id", get(read))
        .with_state(state)
}
