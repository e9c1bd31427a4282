#![cfg(test)]
//! Fixtures shared by unit tests: a two-table model (exposed `widget`, internal `audit`) and
//! a couple of service actions over it.

use crate::config::{resolve, FullConfig, ResolvedModel};
use crate::error::ServiceError;
use crate::service::{ExternalService, Service, ServiceActions, ServiceRegistry, VerbOptions};
use crate::store::{MemoryStore, Record};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn widget_config() -> FullConfig {
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
            { "id": "audit.id", "table_id": "audit", "name": "id", "type": "uuid", "nullable": false,
              "default": { "expression": "gen_random_uuid()" } },
            { "id": "audit.widget_id", "table_id": "audit", "name": "widget_id", "type": "bigint" },
            { "id": "audit.action", "table_id": "audit", "name": "action", "type": "text" }
        ],
        "relationships": [{
            "id": "audit_widget_fk",
            "from_schema_id": "main", "from_table_id": "audit", "from_column_id": "audit.widget_id",
            "to_schema_id": "main", "to_table_id": "widget", "to_column_id": "widget.id"
        }],
        "api_entities": [{
            "entity_id": "widget",
            "path_segment": "widgets",
            "sensitive_columns": ["secret"],
            "validation": { "name": { "required": true, "max_length": 20 } }
        }]
    }))
    .expect("fixture config")
}

pub fn widget_model() -> Arc<ResolvedModel> {
    Arc::new(resolve(&widget_config()).expect("fixture model"))
}

pub fn memory_store() -> MemoryStore {
    MemoryStore::new(widget_model())
}

pub fn empty_registry() -> Arc<ServiceRegistry> {
    Arc::new(ServiceRegistry::new())
}

/// Registry with `WidgetService` (exposed) and `Scratch` (internal).
pub fn widget_registry() -> Arc<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    registry.register_default::<WidgetActions>("WidgetService", true);
    registry.register_default::<ScratchThenFail>("Scratch", false);
    Arc::new(registry)
}

/// Write creates a widget from the body; read looks one up by the `id` param and fails with
/// "missing" when there is none; delete removes the `id` given in the query.
#[derive(Default)]
pub struct WidgetActions;

#[async_trait]
impl ServiceActions for WidgetActions {
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

/// Read creates a widget, then fails with "missing".
#[derive(Default)]
pub struct ScratchThenFail;

#[async_trait]
impl ServiceActions for ScratchThenFail {
    async fn do_read(&self, svc: &ExternalService, _opts: VerbOptions) -> Result<Value, ServiceError> {
        let data: Record = [("name".to_string(), json!("scratch"))].into_iter().collect();
        svc.create_model_instance("widget", &data).await?;
        Err(ServiceError::action("missing"))
    }
}
