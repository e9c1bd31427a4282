//! Response envelopes: `{"data": ..}` for entity routes, `{.., "success": ..}` for service routes.

use crate::error::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn success_created<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data }))
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data }))
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<SuccessMany<T>>) {
    let count = data.len() as u64;
    (
        StatusCode::OK,
        Json(SuccessMany {
            data,
            meta: MetaCount { count },
        }),
    )
}

/// Service result merged with `"success": true`; a non-object result goes under `"data"`.
/// Errors become `{"success": false, "error": <message>}` with the error's status.
pub fn service_envelope(result: Result<Value, ServiceError>) -> Response {
    match result {
        Ok(Value::Object(mut map)) => {
            map.insert("success".into(), Value::Bool(true));
            (StatusCode::OK, Json(Value::Object(map))).into_response()
        }
        Ok(other) => (StatusCode::OK, Json(json!({ "data": other, "success": true }))).into_response(),
        Err(e) => service_failure(e.status(), e.to_string()),
    }
}

pub fn service_failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": message.into() }))).into_response()
}
