//! API error handling: maps every internal error type onto the `{error}` JSON
//! envelope and a status code, per SPEC_FULL.md's error handling design.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    InsufficientScope(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::InsufficientScope(scope) => (
                StatusCode::FORBIDDEN,
                "insufficient_scope",
                format!("missing scope: {scope}"),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "dependency_failed", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        // `insufficient_scope` is surfaced as the bare `error` string per SPEC_FULL.md §6;
        // every other kind carries a `kind` alongside the human-readable message.
        let body = if kind == "insufficient_scope" {
            json!({ "error": kind })
        } else {
            json!({ "error": message, "kind": kind })
        };

        (status, Json(body)).into_response()
    }
}

impl From<buildit_core::Error> for ApiError {
    fn from(err: buildit_core::Error) -> Self {
        match &err {
            buildit_core::Error::Validation(_) => ApiError::BadRequest(err.to_string()),
            buildit_core::Error::NotFound(_) => ApiError::NotFound(err.to_string()),
            buildit_core::Error::Conflict(_) => ApiError::Conflict(err.to_string()),
            buildit_core::Error::Unauthorized(_) => ApiError::Unauthorized(err.to_string()),
            buildit_core::Error::InsufficientScope(scope) => ApiError::InsufficientScope(scope.clone()),
            buildit_core::Error::QueueUnavailable(_)
            | buildit_core::Error::DependencyFailed(_)
            | buildit_core::Error::SandboxTimeout { .. }
            | buildit_core::Error::SandboxCrash(_)
            | buildit_core::Error::SandboxViolation(_)
            | buildit_core::Error::BundleUnrecoverable(_)
            | buildit_core::Error::ChecksumMismatch { .. } => ApiError::BadGateway(err.to_string()),
            buildit_core::Error::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<buildit_db::DbError> for ApiError {
    fn from(err: buildit_db::DbError) -> Self {
        match err {
            buildit_db::DbError::NotFound(msg) => ApiError::NotFound(msg),
            buildit_db::DbError::Duplicate(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<buildit_scheduler::SchedulerError> for ApiError {
    fn from(err: buildit_scheduler::SchedulerError) -> Self {
        match err {
            buildit_scheduler::SchedulerError::Db(e) => e.into(),
            buildit_scheduler::SchedulerError::Core(e) => e.into(),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<buildit_bundle_store::error::BundleStoreError> for ApiError {
    fn from(err: buildit_bundle_store::error::BundleStoreError) -> Self {
        use buildit_bundle_store::error::BundleStoreError as E;
        match err {
            E::NotFound(msg) => ApiError::NotFound(msg),
            E::InvalidToken(msg) => ApiError::Unauthorized(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
