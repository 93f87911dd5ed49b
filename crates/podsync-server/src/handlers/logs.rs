//! Sync log endpoint.

use axum::{Json, extract::Query, extract::State};

use podsync_core::SessionStore;

use crate::dto::{LogEntryResponse, LogsQuery, SessionResponse};
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

/// Recent sync log entries, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "Recent log entries", body = Vec<LogEntryResponse>),
    ),
    tag = "sync"
)]
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntryResponse>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .min(MAX_LOG_LIMIT)
        .max(1);

    let entries = state
        .sessions
        .recent_logs(limit)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Recent sync sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    responses(
        (status = 200, description = "Recent sync sessions", body = Vec<SessionResponse>),
    ),
    tag = "sync"
)]
pub async fn get_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state
        .sessions
        .list_sessions(20)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}
