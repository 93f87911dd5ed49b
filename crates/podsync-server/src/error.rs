use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use podsync_core::error::{ApiErrorKind, AppError};

/// API error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A control transition was requested from a state that forbids it;
    /// the body carries the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::AlreadyRunning(state) => {
                ApiError::Conflict(format!("a sync job is already active (state: {state})"))
            }
            AppError::InvalidTransition { requested, current } => {
                ApiError::Conflict(format!("cannot {requested} from state {current}"))
            }
            AppError::DatabaseError(_) => ApiError::Internal("database error".to_string()),
            AppError::ConfigError(msg) => {
                ApiError::Internal(format!("configuration error: {msg}"))
            }
            AppError::CredentialsExhausted => {
                ApiError::ServiceUnavailable("credential pool exhausted".to_string())
            }
            AppError::ApiError(details) if details.kind == ApiErrorKind::QuotaExceeded => {
                ApiError::ServiceUnavailable("external API quota exhausted".to_string())
            }
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::ClientError(_) => {
                ApiError::ServiceUnavailable("external service unavailable".to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
