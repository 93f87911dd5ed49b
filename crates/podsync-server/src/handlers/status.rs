//! Status endpoint: live controller state merged with session history.

use axum::{Json, extract::State};

use podsync_core::SessionStore;

use crate::dto::StatusResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Current sync status: state machine position, live progress, aggregate
/// statistics, and per-credential quota usage.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Current sync status", body = StatusResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sync"
)]
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let controller_status = state.controller.status();
    let last_session = state.sessions.latest_session().await.map_err(ApiError::from)?;
    let credentials = state.credential_pool.snapshot();

    Ok(Json(StatusResponse::from_parts(
        controller_status,
        last_session.as_ref(),
        credentials,
    )))
}
