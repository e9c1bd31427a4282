//! Shared fixtures: a widget/audit model served from `MemoryStore`, with two services.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use modelrest::{
    resolve, router, AppState, ExternalService, FullConfig, MemoryStore, Record, Service,
    ServiceActions, ServiceError, ServiceRegistry, VerbOptions,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub fn config() -> FullConfig {
    serde_json::from_value(json!({
        "schemas": [{ "id": "main", "name": "public" }],
        "tables": [
            { "id": "widget", "name": "widgets", "primary_key": "id" },
            { "id": "audit", "name": "audit_log", "primary_key": "id" }
        ],
        "columns": [
            { "id": "widget.id", "table_id": "widget", "name": "id", "type": "bigserial", "nullable": false },
            { "id": "widget.name", "table_id": "widget", "name": "name", "type": "text", "nullable": false },
            { "id": "widget.color", "table_id": "widget", "name": "color", "type": "text" },
            { "id": "widget.secret", "table_id": "widget", "name": "secret", "type": "text" },
            { "id": "audit.id", "table_id": "audit", "name": "id", "type": "bigserial", "nullable": false },
            { "id": "audit.action", "table_id": "audit", "name": "action", "type": "text" }
        ],
        "api_entities": [
            {
                "entity_id": "widget",
                "path_segment": "widgets",
                "sensitive_columns": ["secret"],
                "validation": { "name": { "required": true, "max_length": 20 } }
            },
            { "entity_id": "audit", "path_segment": "audit", "operations": ["read"] }
        ]
    }))
    .expect("fixture config")
}

/// Write creates a widget from the body; read returns the widget at `:id` or fails with
/// "missing"; delete removes the widget named by `?id=`.
#[derive(Default)]
pub struct WidgetService;

#[async_trait]
impl ServiceActions for WidgetService {
    async fn do_read(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        let id = opts.params.get("id").cloned().unwrap_or_default();
        svc.model_instance("widget", Some(&Value::String(id)))
            .await?
            .ok_or_else(|| ServiceError::action("missing"))
    }

    async fn do_write(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        svc.create_model_instance("widget", &opts.body_record()).await
    }

    async fn do_delete(&self, svc: &ExternalService, opts: VerbOptions) -> Result<Value, ServiceError> {
        let id = opts.query.get("id").cloned().unwrap_or_default();
        let removed = svc.destroy_model_instance("widget", &Value::String(id)).await?;
        Ok(json!({ "deleted": removed.is_some() }))
    }
}

/// Read writes a widget and then fails with "missing".
#[derive(Default)]
pub struct ScratchService;

#[async_trait]
impl ServiceActions for ScratchService {
    async fn do_read(&self, svc: &ExternalService, _opts: VerbOptions) -> Result<Value, ServiceError> {
        let data: Record = [("name".to_string(), json!("scratch"))].into_iter().collect();
        svc.create_model_instance("widget", &data).await?;
        Err(ServiceError::action("missing"))
    }
}

pub struct TestApp {
    pub store: MemoryStore,
    pub router: Router,
}

pub fn app() -> TestApp {
    let model = Arc::new(resolve(&config()).expect("fixture model"));
    let store = MemoryStore::new(model.clone());
    let mut registry = ServiceRegistry::new();
    registry.register_default::<WidgetService>("WidgetService", true);
    registry.register_default::<ScratchService>("ScratchService", true);
    let state = AppState::new(Arc::new(store.clone()), model, Arc::new(registry));
    TestApp {
        store,
        router: router(state),
    }
}

impl TestApp {
    /// Send one request; the body is parsed as JSON (`Null` when empty).
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.dispatch(req).await
    }

    /// Send `body` verbatim with the given content type.
    pub async fn send_raw(&self, method: &str, uri: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .expect("request");
        self.dispatch(req).await
    }

    async fn dispatch(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }
}
