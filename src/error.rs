//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} id '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: table {table_id} column {column}")]
    InvalidPrimaryKey { table_id: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Errors raised by a data store or by a transaction handle.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("transaction already finished")]
    TransactionClosed,
}

/// Errors surfaced by services and the verb execution protocol.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("unrecognized method: {0}")]
    UnrecognizedVerb(String),
    /// Failure raised by a service action. Displays as the bare message.
    #[error("{0}")]
    Action(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn action(message: impl Into<String>) -> Self {
        ServiceError::Action(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ServiceError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::UnrecognizedVerb(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::Action(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::CommitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Store(StoreError::InvalidRecord(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn store_status(e: &StoreError) -> (StatusCode, &'static str) {
    match e {
        StoreError::Db(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::UnknownEntity(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::InvalidRecord(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        StoreError::Db(_) | StoreError::TransactionClosed => {
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Store(e) => store_status(e),
            AppError::Service(ServiceError::Store(e)) => store_status(e),
            AppError::Service(e) => (e.status(), "service_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
