//! Control transitions: start, pause, resume, stop.
//!
//! Pause/resume/stop are idempotent from the state they target: asking to
//! pause an already-paused job echoes the current state with 200 instead of
//! erroring. Genuinely invalid transitions (pausing an idle engine) return
//! 409 with the current state in the body.

use axum::{Json, extract::State, http::StatusCode};

use podsync_core::{JobOptions, JobState, SettingsStore, TracingReporter, TriggerType};

use crate::dto::{ControlResponse, TriggerSyncRequest};
use crate::error::ApiError;
use crate::state::AppState;

fn control_response(state: JobState, session_id: Option<uuid::Uuid>, message: &str) -> ControlResponse {
    ControlResponse {
        state: state.as_str().to_string(),
        session_id,
        message: message.to_string(),
    }
}

/// Start a sync job. Returns immediately; the job runs asynchronously.
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    request_body = TriggerSyncRequest,
    responses(
        (status = 202, description = "Sync job started", body = ControlResponse),
        (status = 409, description = "A job is already active"),
    ),
    tag = "sync"
)]
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<TriggerSyncRequest>,
) -> Result<(StatusCode, Json<ControlResponse>), ApiError> {
    // Persisted settings are the baseline; the request may override the
    // batching knobs for this run only.
    let settings = match state.settings_cache.get() {
        Some(settings) => settings,
        None => {
            let settings = state.settings.get_settings().await.map_err(ApiError::from)?;
            state.settings_cache.put(settings.clone());
            settings
        }
    };

    let mut config = settings.to_sync_config();
    if let Some(chunk_size) = request.chunk_size {
        config = config.with_chunk_size(chunk_size as usize);
    }
    if let Some(workers) = request.max_concurrent_items {
        config = config.with_max_concurrent_items(workers as usize);
    }

    let trigger = if request.test {
        TriggerType::Test
    } else {
        TriggerType::Manual
    };

    let session_id = state
        .controller
        .start(JobOptions::new(config, trigger), TracingReporter)
        .await
        .map_err(ApiError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(control_response(
            JobState::Running,
            Some(session_id),
            "sync job started",
        )),
    ))
}

/// Pause the running job at the next chunk boundary.
#[utoipa::path(
    post,
    path = "/api/v1/sync-pause",
    responses(
        (status = 200, description = "Pause requested", body = ControlResponse),
        (status = 409, description = "No running job to pause"),
    ),
    tag = "sync"
)]
pub async fn pause_sync(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, ApiError> {
    let new_state = state.controller.pause().map_err(ApiError::from)?;
    Ok(Json(control_response(
        new_state,
        state.controller.status().session_id,
        "pause requested; in-flight chunk completes first",
    )))
}

/// Resume a paused job from its checkpoint.
#[utoipa::path(
    post,
    path = "/api/v1/sync-resume",
    responses(
        (status = 200, description = "Resumed", body = ControlResponse),
        (status = 409, description = "No paused job to resume"),
    ),
    tag = "sync"
)]
pub async fn resume_sync(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, ApiError> {
    let new_state = state.controller.resume().map_err(ApiError::from)?;
    Ok(Json(control_response(
        new_state,
        state.controller.status().session_id,
        "resumed from last checkpoint",
    )))
}

/// Stop the job after the current chunk; partial counts are preserved.
#[utoipa::path(
    post,
    path = "/api/v1/stop",
    responses(
        (status = 200, description = "Stop requested", body = ControlResponse),
        (status = 409, description = "No active job to stop"),
    ),
    tag = "sync"
)]
pub async fn stop_sync(
    State(state): State<AppState>,
) -> Result<Json<ControlResponse>, ApiError> {
    let new_state = state.controller.stop().map_err(ApiError::from)?;
    Ok(Json(control_response(
        new_state,
        state.controller.status().session_id,
        "stop requested; current chunk completes, then the session is frozen",
    )))
}
