// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Postgres SQLSTATE for a serialization failure under SERIALIZABLE.
const SERIALIZATION_FAILURE: &str = "40001";
/// Postgres SQLSTATE for a detected deadlock.
const DEADLOCK_DETECTED: &str = "40P01";
/// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error (unrecoverable storage failure and the like)
    InternalServerError(String),

    // 500 once retries are exhausted; retried internally before that
    TransientConflict(String),

    // 400 Bad Request (validation errors)
    BadRequest(String),

    // 400 Attempt requested outside the exam window or submitted past the deadline
    OutOfWindow(String),

    // 400 Learner already used every allowed attempt
    AttemptsExhausted(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate row)
    Conflict(String),
}

impl AppError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientConflict(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::TransientConflict(msg) => {
                tracing::error!("Write conflict persisted after retries: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The server is busy, please try again".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::OutOfWindow(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AttemptsExhausted(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Returns true when the database rejected the statement because of a
/// concurrent transaction (serialization failure or deadlock).
pub fn is_transient_conflict(err: &sqlx::Error) -> bool {
    sqlx_code(err).is_some_and(|code| code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
}

fn sqlx_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// Converts `sqlx::Error` into `AppError`.
/// Allows using `?` operator on database queries; concurrency failures stay
/// distinguishable so callers can retry them.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_conflict(&err) {
            return AppError::TransientConflict(err.to_string());
        }
        if sqlx_code(&err).as_deref() == Some(UNIQUE_VIOLATION) {
            return AppError::Conflict("Resource already exists".to_string());
        }
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::OutOfWindow("x".into()), StatusCode::BAD_REQUEST),
            (AppError::AttemptsExhausted("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::AuthError("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::TransientConflict("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::InternalServerError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_non_database_errors_are_not_transient() {
        assert!(!is_transient_conflict(&sqlx::Error::RowNotFound));
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::InternalServerError(_)));
        assert!(!err.is_transient());
    }
}
