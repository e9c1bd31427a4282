//! Service verb handlers: each request constructs the service behind the URL segment and runs
//! one verb on it.

use crate::response::{service_envelope, service_failure};
use crate::service::VerbOptions;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

async fn run(state: &AppState, segment: &str, method: &str, opts: VerbOptions) -> Response {
    let result = match state.external_service(segment) {
        Ok(svc) => svc.execute_verb(method, opts).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        tracing::debug!(segment, method, error = %e, "service request failed");
    }
    service_envelope(result)
}

pub async fn read(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let opts = VerbOptions {
        params: HashMap::from([("id".to_string(), id)]),
        query,
        body: None,
    };
    run(&state, &segment, "GET", opts).await
}

/// An empty body is no body. Anything else must be JSON sent as `application/json`.
fn json_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Option<Value>, String> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let is_json = content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"));
    if !is_json {
        return Err("expected a request body with `Content-Type: application/json`".into());
    }
    Json::<Value>::from_bytes(bytes)
        .map(|Json(v)| Some(v))
        .map_err(|rejection| rejection.body_text())
}

pub async fn write(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let body = match json_body(&headers, &bytes) {
        Ok(body) => body,
        Err(message) => {
            tracing::debug!(segment, error = %message, "service request body rejected");
            return service_failure(StatusCode::BAD_REQUEST, message);
        }
    };
    let opts = VerbOptions {
        params: HashMap::new(),
        query,
        body,
    };
    run(&state, &segment, "POST", opts).await
}

pub async fn remove(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let opts = VerbOptions {
        params: HashMap::new(),
        query,
        body: None,
    };
    run(&state, &segment, "DELETE", opts).await
}
