//! Configuration types for podsync components.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::TriggerType;

/// HTTP client configuration for external API calls.
pub struct HttpConfig {
    /// Bounded per-request timeout. External calls never block the
    /// scheduler loop for longer than this.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Sync run configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Episodes per write chunk. Bounds peak memory and makes checkpoint
    /// granularity predictable.
    pub chunk_size: usize,
    /// Podcasts reconciled concurrently; also the worker pool size.
    pub max_concurrent_items: usize,
    /// Page size requested from the catalog store while iterating.
    pub catalog_page_size: i64,
    /// Sessions still `running` with a heartbeat older than this are
    /// considered orphaned by an unclean shutdown.
    pub stale_heartbeat_after: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_concurrent_items: 4,
            catalog_page_size: 50,
            stale_heartbeat_after: Duration::from_secs(120),
        }
    }
}

impl SyncConfig {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_max_concurrent_items(mut self, n: usize) -> Self {
        self.max_concurrent_items = n.max(1);
        self
    }
}

/// Operator-editable scheduling settings, persisted as a singleton row and
/// read when a job starts (manually or on the auto-sync cadence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSyncSettings {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub chunk_size: u32,
    pub max_concurrent_items: u32,
    /// Trigger recorded on sessions the auto-sync loop starts.
    pub mode: TriggerType,
}

impl Default for AutoSyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 360,
            chunk_size: 100,
            max_concurrent_items: 4,
            mode: TriggerType::Scheduled,
        }
    }
}

impl AutoSyncSettings {
    /// Applies these settings over the engine defaults.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_chunk_size(self.chunk_size as usize)
            .with_max_concurrent_items(self.max_concurrent_items as usize)
    }
}

// =============================================================================
// Credential configuration (credentials.toml)
// =============================================================================

/// One API credential definition.
///
/// # Example
///
/// ```toml
/// [[credentials]]
/// id = "primary"
/// api_key = "AIza..."
/// daily_quota = 10000
///
/// [[credentials]]
/// id = "spillover"
/// api_key = "AIza..."
/// daily_quota = 10000
/// enabled = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// Stable operator-chosen identifier, also the store key.
    pub id: String,
    /// The secret token attached to outbound calls.
    pub api_key: String,
    /// Quota ceiling in API units per reset window.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_daily_quota() -> i64 {
    10_000
}

fn default_enabled() -> bool {
    true
}

/// Root structure of `credentials.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub credentials: Vec<CredentialEntry>,
}

impl CredentialsConfig {
    pub fn enabled_entries(&self) -> Vec<&CredentialEntry> {
        self.credentials.iter().filter(|c| c.enabled).collect()
    }
}

/// Default search location for `credentials.toml`, next to the process cwd.
pub fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.toml")
}

/// Loads and validates the credentials file.
///
/// Duplicate ids and empty keys are configuration errors: catching them at
/// startup beats discovering them mid-run when the pool rotates onto the
/// broken entry.
pub fn load_credentials_config(path: Option<&Path>) -> Result<CredentialsConfig, AppError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_credentials_path);

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        AppError::ConfigError(format!("cannot read {}: {}", path.display(), e))
    })?;

    let config: CredentialsConfig = toml::from_str(&raw)
        .map_err(|e| AppError::ConfigError(format!("invalid {}: {}", path.display(), e)))?;

    let mut seen = std::collections::HashSet::new();
    for entry in &config.credentials {
        if entry.api_key.trim().is_empty() {
            return Err(AppError::ConfigError(format!(
                "credential '{}' has an empty api_key",
                entry.id
            )));
        }
        if entry.daily_quota <= 0 {
            return Err(AppError::ConfigError(format!(
                "credential '{}' has a non-positive daily_quota",
                entry.id
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(AppError::ConfigError(format!(
                "duplicate credential id '{}'",
                entry.id
            )));
        }
    }

    Ok(config)
}
