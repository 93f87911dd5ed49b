//! Trait seams between the engine and its collaborators.
//!
//! The reconciliation engine, scheduler, and job controller are generic over
//! these traits; `podsync-db` provides the PostgreSQL implementations and
//! `podsync-client` the live Data API client. Tests supply in-memory mocks.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::AutoSyncSettings;
use crate::error::AppError;
use crate::job::SyncSession;
use crate::models::{
    DailySnapshot, EngagementCounters, EpisodeCounterUpdate, LogLevel, NewEpisode, Podcast,
    SyncLogEntry, TriggerType,
};
use crate::sync::SyncStats;

// =============================================================================
// External Data API
// =============================================================================

/// One row of a collection listing, validated at the client boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEpisode {
    pub external_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default)]
pub struct CollectionPage {
    pub items: Vec<RemoteEpisode>,
    pub next_page_token: Option<String>,
}

/// Client for the external metadata/engagement API.
///
/// Implementations attach one pool credential per call and classify error
/// responses; see `podsync-client`.
pub trait MediaClient: Send + Sync + Clone + 'static {
    /// Fetches one page of the collection listing.
    fn list_collection_page(
        &self,
        collection_id: &str,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<CollectionPage, AppError>> + Send;

    /// Fetches current counters for a set of external ids. Implementations
    /// split the set into API-sized batches; ids absent from the response
    /// are simply missing from the returned map.
    fn fetch_stats(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, EngagementCounters>, AppError>> + Send;
}

// =============================================================================
// Catalog persistence
// =============================================================================

/// Store for podcasts, episodes, and daily snapshots.
///
/// The engine only needs fetch-by-id, stable-ordered paging, existence
/// probes, and upserts by unique key; nothing store-specific leaks in.
pub trait CatalogStore: Send + Sync + Clone + 'static {
    fn count_podcasts(&self) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Lists podcasts in stable creation order (`created_at, id`), used by
    /// the scheduler for deterministic, resumable iteration.
    fn list_podcasts_page(
        &self,
        offset: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Podcast>, AppError>> + Send;

    /// Map of external id to stored counters for a podcast's episodes.
    /// This is the persisted side of the reconciliation diff.
    fn episode_counters(
        &self,
        podcast_id: Uuid,
    ) -> impl Future<Output = Result<HashMap<String, EngagementCounters>, AppError>> + Send;

    /// Highest assigned episode ordinal, or 0 when the podcast has none.
    fn max_episode_number(
        &self,
        podcast_id: Uuid,
    ) -> impl Future<Output = Result<i32, AppError>> + Send;

    /// Single-slug existence probe backing the suffix retry loop.
    fn episode_slug_exists(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Idempotent insert keyed by `external_id`; redelivery after a
    /// crash-and-resume must be safe.
    fn insert_episode(
        &self,
        episode: &NewEpisode,
    ) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    fn update_episode_counters(
        &self,
        update: &EpisodeCounterUpdate,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Writes the podcast's rolled-up counters, episode count, and
    /// `last_synced_at` after a successful reconcile.
    fn update_podcast_after_sync(
        &self,
        podcast_id: Uuid,
        counters: &EngagementCounters,
        episode_count: i32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Upsert keyed by `(podcast_id, snapshot_date)`: a second run on the
    /// same day overwrites, never duplicates.
    fn upsert_daily_snapshot(
        &self,
        snapshot: &DailySnapshot,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn snapshots_for_podcast(
        &self,
        podcast_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DailySnapshot>, AppError>> + Send;
}

// =============================================================================
// Session / control-plane persistence
// =============================================================================

/// Store for sync sessions and the append-only log.
pub trait SessionStore: Send + Sync + Clone + 'static {
    fn create_session(
        &self,
        trigger: TriggerType,
    ) -> impl Future<Output = Result<SyncSession, AppError>> + Send;

    fn get_session(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<SyncSession>, AppError>> + Send;

    /// Most recently started session, if any.
    fn latest_session(
        &self,
    ) -> impl Future<Output = Result<Option<SyncSession>, AppError>> + Send;

    fn list_sessions(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SyncSession>, AppError>> + Send;

    /// Sets a session's status; terminal states also stamp `completed_at`.
    fn update_status(
        &self,
        id: Uuid,
        status: crate::job::JobState,
        error_message: Option<&str>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Persists chunk-granularity progress: checkpoint, aggregate stats,
    /// and the heartbeat in one write.
    fn record_progress(
        &self,
        id: Uuid,
        checkpoint: i64,
        stats: &SyncStats,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Marks sessions left `running` with a heartbeat older than
    /// `stale_after` as failed. Returns how many were fenced off.
    fn fail_stale_running(
        &self,
        stale_after: Duration,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn append_log(
        &self,
        session_id: Option<Uuid>,
        level: LogLevel,
        message: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn recent_logs(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SyncLogEntry>, AppError>> + Send;
}

// =============================================================================
// Credential usage persistence
// =============================================================================

/// Persisted mirror of credential usage and active flags.
///
/// Writes are fire-and-forget relative to API calls: the pool spawns them
/// and logs failures instead of blocking the critical path.
pub trait CredentialStore: Send + Sync + Clone + 'static {
    fn record_usage(
        &self,
        credential_id: &str,
        units: i64,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn set_active(
        &self,
        credential_id: &str,
        active: bool,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Usage counters by credential id, used to seed the in-memory pool at
    /// process start.
    fn load_usage(&self) -> impl Future<Output = Result<HashMap<String, i64>, AppError>> + Send;
}

// =============================================================================
// Auto-sync settings persistence
// =============================================================================

/// Singleton-row store for operator scheduling settings, consumed on the
/// next job start.
pub trait SettingsStore: Send + Sync + Clone + 'static {
    fn get_settings(
        &self,
    ) -> impl Future<Output = Result<AutoSyncSettings, AppError>> + Send;

    fn save_settings(
        &self,
        settings: &AutoSyncSettings,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
