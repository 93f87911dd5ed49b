//! Mock implementations of the core traits for integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use podsync_core::error::AppError;
use podsync_core::job::{JobState, SyncSession};
use podsync_core::models::{
    DailySnapshot, EngagementCounters, EpisodeCounterUpdate, LogLevel, NewEpisode, Podcast,
    SyncLogEntry, TriggerType,
};
use podsync_core::progress::{ProgressEvent, ProgressReporter};
use podsync_core::sync::SyncStats;
use podsync_core::traits::{
    CatalogStore, CollectionPage, MediaClient, RemoteEpisode, SessionStore,
};

/// Deterministic counters for an episode index.
pub fn counters(views: i64) -> EngagementCounters {
    EngagementCounters {
        views,
        likes: views / 10,
        comments: views / 100,
        duration_seconds: 1800,
    }
}

/// A remote episode published `index` days after the epoch, so ascending
/// index means ascending publish time.
pub fn remote_episode(collection: &str, index: usize) -> RemoteEpisode {
    RemoteEpisode {
        external_id: format!("{collection}-ep{index:04}"),
        title: format!("Episode {index}"),
        published_at: publish_time(index),
    }
}

pub fn publish_time(index: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(index as i64)
}

// =============================================================================
// MockCatalog
// =============================================================================

#[derive(Clone)]
pub struct StoredEpisode {
    pub podcast_id: Uuid,
    pub title: String,
    pub slug: String,
    pub episode_number: i32,
    pub published_at: DateTime<Utc>,
    pub counters: EngagementCounters,
}

#[derive(Default)]
struct CatalogState {
    podcasts: Vec<Podcast>,
    /// Keyed by external_id, mirroring the unique constraint.
    episodes: HashMap<String, StoredEpisode>,
    snapshots: HashMap<(Uuid, NaiveDate), DailySnapshot>,
    rollup_calls: HashMap<Uuid, usize>,
    insert_calls: usize,
    update_calls: usize,
    fail_inserts_for: HashSet<String>,
}

/// In-memory catalog store.
#[derive(Clone, Default)]
pub struct MockCatalog {
    inner: Arc<Mutex<CatalogState>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a podcast; creation order follows call order.
    pub fn add_podcast(&self, collection_id: &str, title: &str) -> Podcast {
        let mut state = self.inner.lock().unwrap();
        let index = state.podcasts.len();
        let podcast = Podcast {
            id: Uuid::new_v4(),
            collection_id: collection_id.to_string(),
            title: title.to_string(),
            slug: podsync_core::slugify(title),
            counters: EngagementCounters::default(),
            episode_count: 0,
            created_at: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::hours(index as i64),
            last_synced_at: None,
        };
        state.podcasts.push(podcast.clone());
        podcast
    }

    pub fn fail_insert_for(&self, external_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_inserts_for
            .insert(external_id.to_string());
    }

    pub fn episode_count(&self) -> usize {
        self.inner.lock().unwrap().episodes.len()
    }

    #[allow(dead_code)]
    pub fn episode(&self, external_id: &str) -> Option<StoredEpisode> {
        self.inner.lock().unwrap().episodes.get(external_id).cloned()
    }

    #[allow(dead_code)]
    pub fn episodes_for(&self, podcast_id: Uuid) -> Vec<StoredEpisode> {
        let state = self.inner.lock().unwrap();
        let mut episodes: Vec<_> = state
            .episodes
            .values()
            .filter(|e| e.podcast_id == podcast_id)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.episode_number);
        episodes
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().unwrap().snapshots.len()
    }

    pub fn rollup_calls(&self, podcast_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .rollup_calls
            .get(&podcast_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn insert_calls(&self) -> usize {
        self.inner.lock().unwrap().insert_calls
    }

    pub fn update_calls(&self) -> usize {
        self.inner.lock().unwrap().update_calls
    }

    #[allow(dead_code)]
    pub fn podcast(&self, podcast_id: Uuid) -> Option<Podcast> {
        let state = self.inner.lock().unwrap();
        state.podcasts.iter().find(|p| p.id == podcast_id).cloned()
    }
}

impl CatalogStore for MockCatalog {
    async fn count_podcasts(&self) -> Result<i64, AppError> {
        Ok(self.inner.lock().unwrap().podcasts.len() as i64)
    }

    async fn list_podcasts_page(&self, offset: i64, limit: i64) -> Result<Vec<Podcast>, AppError> {
        let state = self.inner.lock().unwrap();
        let mut podcasts = state.podcasts.clone();
        podcasts.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(podcasts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn episode_counters(
        &self,
        podcast_id: Uuid,
    ) -> Result<HashMap<String, EngagementCounters>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .episodes
            .iter()
            .filter(|(_, e)| e.podcast_id == podcast_id)
            .map(|(id, e)| (id.clone(), e.counters))
            .collect())
    }

    async fn max_episode_number(&self, podcast_id: Uuid) -> Result<i32, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .episodes
            .values()
            .filter(|e| e.podcast_id == podcast_id)
            .map(|e| e.episode_number)
            .max()
            .unwrap_or(0))
    }

    async fn episode_slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state.episodes.values().any(|e| e.slug == slug))
    }

    async fn insert_episode(&self, episode: &NewEpisode) -> Result<Uuid, AppError> {
        let mut state = self.inner.lock().unwrap();
        state.insert_calls += 1;

        if state.fail_inserts_for.contains(&episode.external_id) {
            return Err(AppError::Generic(format!(
                "injected insert failure for {}",
                episode.external_id
            )));
        }

        // Idempotent upsert by external id: redelivery updates counters
        // and keeps the original slug/ordinal.
        match state.episodes.get_mut(&episode.external_id) {
            Some(existing) => {
                existing.counters = episode.counters;
                existing.title = episode.title.clone();
            }
            None => {
                state.episodes.insert(
                    episode.external_id.clone(),
                    StoredEpisode {
                        podcast_id: episode.podcast_id,
                        title: episode.title.clone(),
                        slug: episode.slug.clone(),
                        episode_number: episode.episode_number,
                        published_at: episode.published_at,
                        counters: episode.counters,
                    },
                );
            }
        }
        Ok(Uuid::new_v4())
    }

    async fn update_episode_counters(
        &self,
        update: &EpisodeCounterUpdate,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        state.update_calls += 1;
        match state.episodes.get_mut(&update.external_id) {
            Some(existing) => {
                existing.counters = update.counters;
                Ok(())
            }
            None => Err(AppError::Generic(format!(
                "no such episode: {}",
                update.external_id
            ))),
        }
    }

    async fn update_podcast_after_sync(
        &self,
        podcast_id: Uuid,
        counters: &EngagementCounters,
        episode_count: i32,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        *state.rollup_calls.entry(podcast_id).or_insert(0) += 1;
        if let Some(p) = state.podcasts.iter_mut().find(|p| p.id == podcast_id) {
            p.counters = *counters;
            p.episode_count = episode_count;
            p.last_synced_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_daily_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        state
            .snapshots
            .insert((snapshot.podcast_id, snapshot.snapshot_date), snapshot.clone());
        Ok(())
    }

    async fn snapshots_for_podcast(
        &self,
        podcast_id: Uuid,
    ) -> Result<Vec<DailySnapshot>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .snapshots
            .values()
            .filter(|s| s.podcast_id == podcast_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// MockClient
// =============================================================================

#[derive(Default)]
struct ClientState {
    collections: HashMap<String, Vec<RemoteEpisode>>,
    stats: HashMap<String, EngagementCounters>,
    fail_collections: HashSet<String>,
}

/// In-memory media client with configurable listings, stats, pagination
/// size, and injected failures.
#[derive(Clone)]
pub struct MockClient {
    inner: Arc<Mutex<ClientState>>,
    page_size: usize,
    exhausted: Arc<AtomicBool>,
    list_calls: Arc<AtomicUsize>,
    list_delay: Option<Duration>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClientState::default())),
            page_size: 100,
            exhausted: Arc::new(AtomicBool::new(false)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            list_delay: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds an artificial delay to listing calls, for tests that need the
    /// job to stay in flight.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Seeds a collection with `count` episodes and matching stats.
    pub fn seed_collection(&self, collection_id: &str, count: usize) {
        let mut state = self.inner.lock().unwrap();
        let items: Vec<_> = (0..count)
            .map(|i| remote_episode(collection_id, i))
            .collect();
        for (i, item) in items.iter().enumerate() {
            state
                .stats
                .insert(item.external_id.clone(), counters(1000 + i as i64));
        }
        state.collections.insert(collection_id.to_string(), items);
    }

    /// Seeds explicit items plus their stats.
    pub fn seed_items(&self, collection_id: &str, items: Vec<(RemoteEpisode, EngagementCounters)>) {
        let mut state = self.inner.lock().unwrap();
        let mut listing = Vec::with_capacity(items.len());
        for (item, c) in items {
            state.stats.insert(item.external_id.clone(), c);
            listing.push(item);
        }
        state.collections.insert(collection_id.to_string(), listing);
    }

    pub fn set_stats(&self, external_id: &str, c: EngagementCounters) {
        self.inner
            .lock()
            .unwrap()
            .stats
            .insert(external_id.to_string(), c);
    }

    pub fn remove_stats(&self, external_id: &str) {
        self.inner.lock().unwrap().stats.remove(external_id);
    }

    pub fn fail_collection(&self, collection_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_collections
            .insert(collection_id.to_string());
    }

    /// All further calls fail as if the whole credential pool were spent.
    pub fn exhaust_credentials(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaClient for MockClient {
    async fn list_collection_page(
        &self,
        collection_id: &str,
        page_token: Option<&str>,
    ) -> Result<CollectionPage, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(AppError::CredentialsExhausted);
        }

        let state = self.inner.lock().unwrap();
        if state.fail_collections.contains(collection_id) {
            return Err(AppError::NetworkError("injected listing failure".into()));
        }

        let items = state
            .collections
            .get(collection_id)
            .cloned()
            .unwrap_or_default();
        let offset: usize = page_token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let page: Vec<_> = items.iter().skip(offset).take(self.page_size).cloned().collect();
        let next = offset + page.len();
        let next_page_token = if next < items.len() {
            Some(next.to_string())
        } else {
            None
        };

        Ok(CollectionPage {
            items: page,
            next_page_token,
        })
    }

    async fn fetch_stats(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, EngagementCounters>, AppError> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(AppError::CredentialsExhausted);
        }
        let state = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.stats.get(id).map(|c| (id.clone(), *c)))
            .collect())
    }
}

// =============================================================================
// MockSessions
// =============================================================================

#[derive(Default)]
struct SessionState {
    sessions: Vec<SyncSession>,
    logs: Vec<SyncLogEntry>,
}

/// In-memory session store.
#[derive(Clone, Default)]
pub struct MockSessions {
    inner: Arc<Mutex<SessionState>>,
}

impl MockSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: Uuid) -> Option<SyncSession> {
        let state = self.inner.lock().unwrap();
        state.sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.inner.lock().unwrap().logs.clone()
    }

    /// Inserts a session row directly, for stale-recovery tests.
    pub fn inject_session(&self, session: SyncSession) {
        self.inner.lock().unwrap().sessions.push(session);
    }
}

impl SessionStore for MockSessions {
    async fn create_session(&self, trigger: TriggerType) -> Result<SyncSession, AppError> {
        let session = SyncSession {
            id: Uuid::new_v4(),
            trigger,
            status: JobState::Running,
            started_at: Utc::now(),
            completed_at: None,
            heartbeat_at: Utc::now(),
            checkpoint: 0,
            stats: SyncStats::default(),
            error_message: None,
        };
        self.inner.lock().unwrap().sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<SyncSession>, AppError> {
        Ok(self.session(id))
    }

    async fn latest_session(&self) -> Result<Option<SyncSession>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .sessions
            .iter()
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SyncSession>, AppError> {
        let state = self.inner.lock().unwrap();
        let mut sessions = state.sessions.clone();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobState,
        error_message: Option<&str>,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(s) = state.sessions.iter_mut().find(|s| s.id == id) {
            s.status = status;
            if let Some(msg) = error_message {
                s.error_message = Some(msg.to_string());
            }
            if status.is_terminal() {
                s.completed_at = Some(Utc::now());
            }
            s.heartbeat_at = Utc::now();
        }
        Ok(())
    }

    async fn record_progress(
        &self,
        id: Uuid,
        checkpoint: i64,
        stats: &SyncStats,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(s) = state.sessions.iter_mut().find(|s| s.id == id) {
            s.checkpoint = checkpoint;
            s.stats = *stats;
            s.heartbeat_at = Utc::now();
        }
        Ok(())
    }

    async fn fail_stale_running(&self, stale_after: Duration) -> Result<u64, AppError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(stale_after).unwrap();
        let mut fenced = 0;
        let mut state = self.inner.lock().unwrap();
        for s in state.sessions.iter_mut() {
            if s.status.is_active() && s.heartbeat_at < cutoff {
                s.status = JobState::Failed;
                s.error_message =
                    Some("stale heartbeat - coordinator shut down uncleanly".to_string());
                s.completed_at = Some(Utc::now());
                fenced += 1;
            }
        }
        Ok(fenced)
    }

    async fn append_log(
        &self,
        session_id: Option<Uuid>,
        level: LogLevel,
        message: &str,
    ) -> Result<(), AppError> {
        let mut state = self.inner.lock().unwrap();
        let id = state.logs.len() as i64 + 1;
        state.logs.push(SyncLogEntry {
            id,
            session_id,
            level,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>, AppError> {
        let state = self.inner.lock().unwrap();
        Ok(state.logs.iter().rev().take(limit).cloned().collect())
    }
}

// =============================================================================
// Recording reporter
// =============================================================================

/// Captures every event for assertions.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn chunk_events(&self) -> Vec<(String, usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::ChunkCompleted {
                    podcast,
                    chunk_index,
                    chunk_count,
                    ..
                } => Some((podcast, chunk_index, chunk_count)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
