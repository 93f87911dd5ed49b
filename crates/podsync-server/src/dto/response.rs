//! Response DTOs for API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use podsync_core::credentials::CredentialStatus;
use podsync_core::{AutoSyncSettings, ControllerStatus, SyncLogEntry, SyncSession, SyncStats};

// =============================================================================
// Status
// =============================================================================

/// Aggregate sync statistics.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncStatsDto {
    pub podcasts_processed: usize,
    pub podcasts_failed: usize,
    pub episodes_created: usize,
    pub episodes_updated: usize,
    pub episodes_unchanged: usize,
    pub episodes_failed: usize,
    pub episodes_total: usize,
}

impl From<SyncStats> for SyncStatsDto {
    fn from(s: SyncStats) -> Self {
        Self {
            podcasts_processed: s.podcasts_processed,
            podcasts_failed: s.podcasts_failed,
            episodes_created: s.episodes_created,
            episodes_updated: s.episodes_updated,
            episodes_unchanged: s.episodes_unchanged,
            episodes_failed: s.episodes_failed,
            episodes_total: s.episodes_total(),
        }
    }
}

/// Live progress of the current run.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressDto {
    pub total_podcasts: usize,
    pub podcasts_done: usize,
    pub current_podcast: Option<String>,
}

/// One credential's quota view.
#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialStatusDto {
    pub id: String,
    pub quota_used: i64,
    pub quota_limit: i64,
    pub active: bool,
    pub exhausted: bool,
}

impl From<CredentialStatus> for CredentialStatusDto {
    fn from(c: CredentialStatus) -> Self {
        Self {
            id: c.id,
            quota_used: c.quota_used,
            quota_limit: c.quota_limit,
            active: c.active,
            exhausted: c.exhausted,
        }
    }
}

/// GET /status response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub is_running: bool,
    /// idle | running | paused | stopping | completed | failed | stopped
    pub current_status: String,
    pub session_id: Option<Uuid>,
    pub current_progress: ProgressDto,
    pub sync_stats: SyncStatsDto,
    pub elapsed_seconds: Option<i64>,
    pub estimated_remaining_seconds: Option<i64>,
    /// Completion time of the most recent finished session.
    pub last_sync_time: Option<DateTime<Utc>>,
    pub credentials: Vec<CredentialStatusDto>,
}

impl StatusResponse {
    pub fn from_parts(
        status: ControllerStatus,
        last_session: Option<&SyncSession>,
        credentials: Vec<CredentialStatus>,
    ) -> Self {
        // Prefer live stats while a run is active; fall back to the
        // persisted row between runs.
        let stats = if status.state.is_active() {
            status.progress.stats
        } else {
            last_session.map(|s| s.stats).unwrap_or_default()
        };

        Self {
            is_running: status.state.is_active(),
            current_status: status.state.as_str().to_string(),
            session_id: status.session_id,
            current_progress: ProgressDto {
                total_podcasts: status.progress.total_podcasts,
                podcasts_done: status.progress.podcasts_done,
                current_podcast: status.progress.current_podcast,
            },
            sync_stats: stats.into(),
            elapsed_seconds: status.elapsed_seconds,
            estimated_remaining_seconds: status.estimated_remaining_seconds,
            last_sync_time: last_session.and_then(|s| s.completed_at),
            credentials: credentials.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Control transitions
// =============================================================================

/// Response for POST /sync, /sync-pause, /sync-resume, /stop.
#[derive(Debug, Serialize, ToSchema)]
pub struct ControlResponse {
    /// State after the request was applied (or the unchanged current
    /// state for idempotent no-ops).
    pub state: String,
    pub session_id: Option<Uuid>,
    pub message: String,
}

// =============================================================================
// Sessions / logs
// =============================================================================

/// A sync session row.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub trigger: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub checkpoint: i64,
    pub stats: SyncStatsDto,
    pub error_message: Option<String>,
}

impl From<SyncSession> for SessionResponse {
    fn from(s: SyncSession) -> Self {
        Self {
            id: s.id,
            trigger: s.trigger.as_str().to_string(),
            status: s.status.as_str().to_string(),
            started_at: s.started_at,
            completed_at: s.completed_at,
            checkpoint: s.checkpoint,
            stats: s.stats.into(),
            error_message: s.error_message,
        }
    }
}

/// A sync log entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogEntryResponse {
    pub id: i64,
    pub session_id: Option<Uuid>,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<SyncLogEntry> for LogEntryResponse {
    fn from(e: SyncLogEntry) -> Self {
        Self {
            id: e.id,
            session_id: e.session_id,
            level: e.level.as_str().to_string(),
            message: e.message,
            created_at: e.created_at,
        }
    }
}

// =============================================================================
// Health / settings
// =============================================================================

/// Status of an individual service component.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /health response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Resident set size in bytes, when the platform exposes it.
    pub memory_rss_bytes: Option<u64>,
    pub database: ServiceStatus,
}

/// GET/POST /auto-sync-settings response.
#[derive(Debug, Serialize, ToSchema)]
pub struct SettingsResponse {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub chunk_size: u32,
    pub max_concurrent_items: u32,
    pub mode: String,
}

impl From<AutoSyncSettings> for SettingsResponse {
    fn from(s: AutoSyncSettings) -> Self {
        Self {
            enabled: s.enabled,
            interval_minutes: s.interval_minutes,
            chunk_size: s.chunk_size,
            max_concurrent_items: s.max_concurrent_items,
            mode: s.mode.as_str().to_string(),
        }
    }
}
