//! Request DTOs for API endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// Body for POST /sync.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TriggerSyncRequest {
    /// Record the session as a test run rather than a manual one.
    #[serde(default)]
    pub test: bool,

    /// Override the configured chunk size for this run only.
    pub chunk_size: Option<u32>,

    /// Override the configured worker count for this run only.
    pub max_concurrent_items: Option<u32>,
}

/// Body for POST /auto-sync-settings.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub chunk_size: u32,
    pub max_concurrent_items: u32,
}

/// Query parameters for GET /logs.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LogsQuery {
    /// Maximum entries to return (default 50, capped at 500).
    pub limit: Option<usize>,
}
