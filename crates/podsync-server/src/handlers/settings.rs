//! Auto-sync settings endpoints.

use axum::{Json, extract::State};

use podsync_core::{AutoSyncSettings, SettingsStore, TriggerType};

use crate::dto::{SettingsResponse, UpdateSettingsRequest};
use crate::error::ApiError;
use crate::state::AppState;

/// Current auto-sync scheduling configuration.
#[utoipa::path(
    get,
    path = "/api/v1/auto-sync-settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse),
    ),
    tag = "settings"
)]
pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<SettingsResponse>, ApiError> {
    if let Some(settings) = state.settings_cache.get() {
        return Ok(Json(settings.into()));
    }

    let settings = state.settings.get_settings().await.map_err(ApiError::from)?;
    state.settings_cache.put(settings.clone());
    Ok(Json(settings.into()))
}

/// Update scheduling configuration; consumed on the next job start.
#[utoipa::path(
    post,
    path = "/api/v1/auto-sync-settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = SettingsResponse),
        (status = 400, description = "Invalid settings"),
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    if request.interval_minutes == 0 {
        return Err(ApiError::BadRequest(
            "interval_minutes must be at least 1".to_string(),
        ));
    }
    if request.chunk_size == 0 || request.chunk_size > 10_000 {
        return Err(ApiError::BadRequest(
            "chunk_size must be between 1 and 10000".to_string(),
        ));
    }
    if request.max_concurrent_items == 0 || request.max_concurrent_items > 64 {
        return Err(ApiError::BadRequest(
            "max_concurrent_items must be between 1 and 64".to_string(),
        ));
    }

    let settings = AutoSyncSettings {
        enabled: request.enabled,
        interval_minutes: request.interval_minutes,
        chunk_size: request.chunk_size,
        max_concurrent_items: request.max_concurrent_items,
        mode: TriggerType::Scheduled,
    };

    state
        .settings
        .save_settings(&settings)
        .await
        .map_err(ApiError::from)?;
    state.settings_cache.invalidate();

    Ok(Json(settings.into()))
}
