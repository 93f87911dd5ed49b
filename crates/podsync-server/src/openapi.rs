//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::dto::{
    ControlResponse, CredentialStatusDto, HealthResponse, LogEntryResponse, ProgressDto,
    ServiceStatus, SessionResponse, SettingsResponse, StatusResponse, SyncStatsDto,
    TriggerSyncRequest, UpdateSettingsRequest,
};
use crate::handlers::{health, logs, settings, status, sync};

/// OpenAPI documentation for the podsync control plane.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "podsync control plane",
        version = "1.0.0",
        description = "Operator API for the podcast-directory sync engine.

Drives background synchronization of podcast metadata and engagement
statistics from the hosting platform's Data API into the directory
database.

## Typical flow

1. Check engine state: `GET /api/v1/status`
2. Start a run: `POST /api/v1/sync`
3. Pause/resume/stop as needed; progress checkpoints survive restarts
4. Inspect the audit trail: `GET /api/v1/logs`
",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health::health_check,
        status::get_status,
        sync::start_sync,
        sync::pause_sync,
        sync::resume_sync,
        sync::stop_sync,
        logs::get_logs,
        logs::get_sessions,
        settings::get_settings,
        settings::update_settings,
    ),
    components(
        schemas(
            // Request types
            TriggerSyncRequest,
            UpdateSettingsRequest,
            // Response types
            HealthResponse,
            ServiceStatus,
            StatusResponse,
            ProgressDto,
            SyncStatsDto,
            CredentialStatusDto,
            ControlResponse,
            SessionResponse,
            LogEntryResponse,
            SettingsResponse,
        )
    ),
    tags(
        (name = "system", description = "Health and process metrics"),
        (name = "sync", description = "Sync job control and observation"),
        (name = "settings", description = "Auto-sync scheduling configuration"),
    )
)]
pub struct ApiDoc;
