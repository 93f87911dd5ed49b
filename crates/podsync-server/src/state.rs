use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use podsync_client::TubeClient;
use podsync_core::{AutoSyncSettings, CredentialPool, JobController, TtlCache};
use podsync_db::{CatalogRepository, CredentialRepository, SessionRepository, SettingsRepository};

/// The controller specialized to the production store/client stack.
pub type Controller = JobController<CatalogRepository, TubeClient, SessionRepository>;

/// Shared application state for all handlers.
///
/// Axum clones this per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Job state machine and run lifecycle
    pub controller: Controller,

    /// Session/log store for status and history reads
    pub sessions: SessionRepository,

    /// Auto-sync settings store
    pub settings: SettingsRepository,

    /// Credential usage mirror (operator reset, status)
    pub credentials: CredentialRepository,

    /// In-memory credential pool, for the status surface
    pub credential_pool: CredentialPool,

    /// TTL cache in front of the settings row; invalidated on writes
    pub settings_cache: Arc<TtlCache<AutoSyncSettings>>,

    /// Database pool for health probes
    pub db: sqlx::PgPool,

    /// Token protecting mutating endpoints (None = disabled)
    pub admin_token: Option<String>,

    /// Process start, for uptime reporting
    pub started_at: Instant,

    /// Cancellation token for graceful shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        pool: sqlx::PgPool,
        client: TubeClient,
        credential_pool: CredentialPool,
        admin_token: Option<String>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let catalog = CatalogRepository::new(pool.clone());
        let sessions = SessionRepository::new(pool.clone());
        let settings = SettingsRepository::new(pool.clone());
        let credentials = CredentialRepository::new(pool.clone());
        let controller = JobController::new(catalog, client, sessions.clone());

        Self {
            controller,
            sessions,
            settings,
            credentials,
            credential_pool,
            settings_cache: Arc::new(TtlCache::new(Duration::from_secs(30))),
            db: pool,
            admin_token,
            started_at: Instant::now(),
            shutdown_token,
        }
    }
}
