//! Route tables. `router` mounts everything under the standard prefixes.

mod common;
mod entity;
mod service;

pub use common::common_routes;
pub use entity::entity_routes;
pub use service::service_routes;

use crate::state::AppState;
use axum::Router;

pub const ENTITY_PREFIX: &str = "/api/v1";
pub const SERVICE_PREFIX: &str = "/api/v1/services";

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest(SERVICE_PREFIX, service_routes(state.clone()))
        .nest(ENTITY_PREFIX, entity_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SERVICES_SEGMENT;

    #[test]
    fn service_prefix_is_the_reserved_entity_segment() {
        assert_eq!(SERVICE_PREFIX, format!("{}/{}", ENTITY_PREFIX, SERVICES_SEGMENT));
    }
}
