//! Entity CRUD routes built from the resolved model.
//! Parameterized paths: handlers resolve the entity from the path segment.

use crate::handlers::entity::{create, delete, list, list_filtered, read, update};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route("/:path_segment/all", post(list_filtered))
        .route("/:path_segment/:id", get(read).patch(update).delete(delete))
        .with_state(state)
}
