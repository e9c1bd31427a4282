//! Entity CRUD handlers. Each request runs in its own transactional service and commits on
//! success or rolls back on error.

use crate::config::{PkType, ResolvedEntity};
use crate::error::{AppError, ServiceError};
use crate::response::{success_created, success_many, success_one};
use crate::service::{RequestValidator, Service, TransactionalService};
use crate::state::AppState;
use crate::store::{Filter, Record};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn entity<'a>(state: &'a AppState, path_segment: &str, operation: &str) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !entity.allows(operation) {
        return Err(AppError::BadRequest(format!("{} not allowed", operation)));
    }
    Ok(entity)
}

fn parse_id(id_str: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

fn body_to_record(value: Value) -> Result<Record, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Query-string value typed after the column it filters.
fn query_value_for_column(entity: &ResolvedEntity, col: &str, s: &str) -> Value {
    let pg_type = entity
        .column(col)
        .and_then(|c| c.pg_type.as_deref())
        .unwrap_or("")
        .to_lowercase();
    if pg_type.contains("int") {
        if let Ok(n) = s.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if pg_type.starts_with("bool") {
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
    }
    if s.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    Value::String(s.to_string())
}

fn filter_from_query(entity: &ResolvedEntity, params: HashMap<String, String>) -> Filter {
    let mut filter = Filter::new();
    let mut keys: Vec<_> = params.into_iter().collect();
    keys.sort();
    for (k, v) in keys {
        match k.as_str() {
            "limit" => filter.limit = v.parse().ok(),
            "offset" => filter.offset = v.parse().ok(),
            _ if entity.column(&k).is_some() => {
                let val = query_value_for_column(entity, &k, &v);
                filter = filter.eq(k, val);
            }
            _ => {}
        }
    }
    filter
}

/// End the request's transaction: commit when `result` is Ok, roll back otherwise.
async fn finish<T>(svc: &TransactionalService, result: Result<T, ServiceError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            svc.commit()
                .await
                .map_err(|e| ServiceError::CommitFailed(e.to_string()))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = svc.rollback().await {
                tracing::warn!(error = %rb, "rollback failed");
            }
            Err(err.into())
        }
    }
}

fn stripped(entity: &ResolvedEntity, mut row: Value) -> Value {
    entity.strip_sensitive(&mut row);
    row
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "read")?;
    let filter = filter_from_query(entity, params);
    let svc = state.transactional();
    let rows = finish(&svc, svc.record_set(&entity.name, &filter).await).await?;
    Ok(success_many(rows.into_iter().map(|r| stripped(entity, r)).collect()))
}

/// Filter given as a JSON body: `{"where": {..}, "limit": n, "offset": n}` or a bare column map.
pub async fn list_filtered(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "read")?;
    let filter = Filter::from_json(&body)?;
    let svc = state.transactional();
    let rows = finish(&svc, svc.record_set(&entity.name, &filter).await).await?;
    Ok(success_many(rows.into_iter().map(|r| stripped(entity, r)).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "create")?;
    let body = body_to_record(body)?;
    RequestValidator::check_create(entity, &body)?;
    let svc = state.transactional();
    let row = finish(&svc, svc.create_model_instance(&entity.name, &body).await).await?;
    tracing::debug!(entity = %entity.name, "created");
    Ok(success_created(stripped(entity, row)))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "read")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let svc = state.transactional();
    let row = finish(&svc, svc.model_instance(&entity.name, Some(&id)).await)
        .await?
        .ok_or(AppError::NotFound(id_str))?;
    Ok(success_one(stripped(entity, row)))
}

pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "update")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let mut body = body_to_record(body)?;
    RequestValidator::check_update(entity, &body)?;
    body.insert(entity.pk().to_string(), id);
    let svc = state.transactional();
    let row = finish(&svc, svc.save_model_instance(&entity.name, &body).await)
        .await?
        .ok_or(AppError::NotFound(id_str))?;
    Ok(success_one(stripped(entity, row)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "delete")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let svc = state.transactional();
    finish(&svc, svc.destroy_model_instance(&entity.name, &id).await)
        .await?
        .ok_or(AppError::NotFound(id_str))?;
    Ok(StatusCode::NO_CONTENT)
}
