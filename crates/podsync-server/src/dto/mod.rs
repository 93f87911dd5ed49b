//! Request/response DTOs for the control-plane API.

pub mod request;
pub mod response;

pub use request::{LogsQuery, TriggerSyncRequest, UpdateSettingsRequest};
pub use response::{
    ControlResponse, CredentialStatusDto, HealthResponse, LogEntryResponse, ProgressDto,
    ServiceStatus, SessionResponse, SettingsResponse, StatusResponse, SyncStatsDto,
};
