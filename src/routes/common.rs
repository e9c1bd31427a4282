//! Common routes: health, readiness, version, and the route listing at `/`.

use super::{ENTITY_PREFIX, SERVICE_PREFIX};
use crate::service::segment_for;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    store: &'static str,
}

#[derive(Serialize)]
struct RouteInfo {
    method: &'static str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<String>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error = %e, "store not ready");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                store: "unavailable",
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        store: "ok",
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteInfo>> {
    let mut routes = Vec::new();
    for name in state.registry.external_services() {
        let base = format!("{}/{}", SERVICE_PREFIX, segment_for(name));
        for (method, path) in [
            ("GET", format!("{}/:id", base)),
            ("POST", format!("{}/", base)),
            ("DELETE", format!("{}/", base)),
        ] {
            routes.push(RouteInfo {
                method,
                path,
                service: Some(name.to_string()),
                entity: None,
            });
        }
    }
    for e in state.model.exposed() {
        let Some(segment) = &e.path_segment else { continue };
        let base = format!("{}/{}", ENTITY_PREFIX, segment);
        for (op, method, path) in [
            ("read", "GET", base.clone()),
            ("read", "POST", format!("{}/all", base)),
            ("read", "GET", format!("{}/:id", base)),
            ("create", "POST", base.clone()),
            ("update", "PATCH", format!("{}/:id", base)),
            ("delete", "DELETE", format!("{}/:id", base)),
        ] {
            if e.allows(op) {
                routes.push(RouteInfo {
                    method,
                    path,
                    service: None,
                    entity: Some(e.name.clone()),
                });
            }
        }
    }
    Json(routes)
}

/// GET /, /health, /ready, /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_routes))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
