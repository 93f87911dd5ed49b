//! Control plane over the scheduler: start/pause/resume/stop/status.
//!
//! One controller owns the engine's run lifecycle. Control calls are
//! short and lock-bounded; the job itself runs on a spawned task and
//! reports back through shared state, so operator tooling never blocks for
//! job duration.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{JobControls, JobOptions, JobState};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scheduler::SyncScheduler;
use crate::sync::SyncStats;
use crate::traits::{CatalogStore, MediaClient, SessionStore};

/// Live progress snapshot for the status surface, updated by the reporter
/// as events flow.
#[derive(Debug, Clone, Default)]
pub struct JobProgress {
    pub total_podcasts: usize,
    pub podcasts_done: usize,
    pub current_podcast: Option<String>,
    pub stats: SyncStats,
}

/// Reporter that keeps the latest [`JobProgress`] and forwards every event
/// to an inner reporter (typically [`crate::progress::TracingReporter`]).
#[derive(Clone)]
pub struct TrackingReporter<R: ProgressReporter> {
    progress: Arc<Mutex<JobProgress>>,
    inner: R,
}

impl<R: ProgressReporter> TrackingReporter<R> {
    pub fn new(progress: Arc<Mutex<JobProgress>>, inner: R) -> Self {
        Self { progress, inner }
    }
}

impl<R: ProgressReporter> ProgressReporter for TrackingReporter<R> {
    fn report(&self, event: ProgressEvent) {
        {
            let mut progress = self.progress.lock().unwrap();
            match &event {
                ProgressEvent::JobStarted {
                    total_podcasts,
                    resumed_from,
                    ..
                } => {
                    progress.total_podcasts = *total_podcasts;
                    progress.podcasts_done = *resumed_from as usize;
                    progress.current_podcast = None;
                    progress.stats = SyncStats::default();
                }
                ProgressEvent::PodcastStarted { title, .. } => {
                    progress.current_podcast = Some(title.clone());
                }
                ProgressEvent::ChunkCompleted { stats, .. } => {
                    progress.stats = *stats;
                }
                ProgressEvent::PodcastCompleted { .. } | ProgressEvent::PodcastFailed { .. } => {
                    progress.podcasts_done += 1;
                }
                ProgressEvent::JobCompleted { stats }
                | ProgressEvent::JobStopped { stats }
                | ProgressEvent::JobFailed { stats, .. } => {
                    progress.stats = *stats;
                    progress.current_podcast = None;
                }
                ProgressEvent::JobPaused | ProgressEvent::JobResumed => {}
            }
        }
        self.inner.report(event);
    }
}

/// Point-in-time controller status, merged from in-memory state and live
/// progress. Persisted history comes from the session store.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub state: JobState,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    pub elapsed_seconds: Option<i64>,
    /// Naive linear estimate; absent until some progress exists.
    pub estimated_remaining_seconds: Option<i64>,
}

struct ControllerInner {
    state: JobState,
    controls: Option<JobControls>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
}

/// Owns the run lifecycle of the sync engine.
pub struct JobController<Cs, C, Ss>
where
    Cs: CatalogStore,
    C: MediaClient,
    Ss: SessionStore,
{
    scheduler: Arc<SyncScheduler<Cs, C, Ss>>,
    sessions: Ss,
    inner: Arc<Mutex<ControllerInner>>,
    progress: Arc<Mutex<JobProgress>>,
}

impl<Cs, C, Ss> Clone for JobController<Cs, C, Ss>
where
    Cs: CatalogStore,
    C: MediaClient,
    Ss: SessionStore,
{
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            sessions: self.sessions.clone(),
            inner: Arc::clone(&self.inner),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<Cs, C, Ss> JobController<Cs, C, Ss>
where
    Cs: CatalogStore,
    C: MediaClient,
    Ss: SessionStore,
{
    pub fn new(catalog: Cs, client: C, sessions: Ss) -> Self {
        let scheduler = Arc::new(SyncScheduler::new(catalog, client, sessions.clone()));
        Self {
            scheduler,
            sessions,
            inner: Arc::new(Mutex::new(ControllerInner {
                state: JobState::Idle,
                controls: None,
                session_id: None,
                started_at: None,
            })),
            progress: Arc::new(Mutex::new(JobProgress::default())),
        }
    }

    /// Fences off sessions orphaned by an unclean shutdown. Must run once
    /// before the first `start`, so two coordinators never share a catalog.
    pub async fn recover(&self, stale_after: std::time::Duration) -> Result<u64, AppError> {
        let fenced = self.sessions.fail_stale_running(stale_after).await?;
        if fenced > 0 {
            tracing::warn!(
                sessions = fenced,
                "Marked stale running sessions as failed (unclean shutdown)"
            );
        }
        Ok(fenced)
    }

    /// Starts a job; rejects with [`AppError::AlreadyRunning`] while a
    /// session is active. Returns the new session id immediately; the job
    /// runs on a spawned task.
    pub async fn start<R>(&self, options: JobOptions, reporter: R) -> Result<Uuid, AppError>
    where
        R: ProgressReporter + Clone + 'static,
    {
        // Reserve the engine before any I/O so concurrent starts race on
        // the lock, not on the session store.
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state.is_active() {
                return Err(AppError::AlreadyRunning(inner.state));
            }
            inner.state = JobState::Running;
        }

        match self.spawn_job(options, reporter).await {
            Ok(session_id) => Ok(session_id),
            Err(e) => {
                let mut inner = self.inner.lock().unwrap();
                inner.state = JobState::Idle;
                Err(e)
            }
        }
    }

    async fn spawn_job<R>(&self, options: JobOptions, reporter: R) -> Result<Uuid, AppError>
    where
        R: ProgressReporter + Clone + 'static,
    {
        // A stopped or failed run leaves its checkpoint behind; the next
        // run continues from there instead of replaying the catalog.
        let resume_from = match self.sessions.latest_session().await? {
            Some(prev)
                if matches!(prev.status, JobState::Stopped | JobState::Failed)
                    && prev.checkpoint > 0 =>
            {
                prev.checkpoint
            }
            _ => 0,
        };

        let mut session = self.sessions.create_session(options.trigger).await?;
        if resume_from > 0 {
            self.sessions
                .record_progress(session.id, resume_from, &SyncStats::default())
                .await?;
            session.checkpoint = resume_from;
        }

        let controls = JobControls::new();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.controls = Some(controls.clone());
            inner.session_id = Some(session.id);
            inner.started_at = Some(session.started_at);
        }
        {
            let mut progress = self.progress.lock().unwrap();
            *progress = JobProgress::default();
        }

        let scheduler = Arc::clone(&self.scheduler);
        let inner_handle = Arc::clone(&self.inner);
        let tracking = TrackingReporter::new(Arc::clone(&self.progress), reporter);
        let session_id = session.id;

        tokio::spawn(async move {
            let outcome = scheduler
                .run(&session, &options, &controls, &tracking)
                .await;

            let mut inner = inner_handle.lock().unwrap();
            // A newer session may own the controller by now (start right
            // after stop); only record our outcome if we still do.
            if inner.session_id == Some(session_id) {
                inner.state = outcome.final_state;
                inner.controls = None;
            }
        });

        Ok(session_id)
    }

    /// Requests a pause; the scheduler acknowledges at the next chunk
    /// boundary (the in-flight chunk commits first). No-op when already
    /// paused.
    pub fn pause(&self) -> Result<JobState, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            JobState::Running => {
                if let Some(controls) = &inner.controls {
                    controls.pause();
                }
                inner.state = JobState::Paused;
                Ok(JobState::Paused)
            }
            JobState::Paused => Ok(JobState::Paused),
            current => Err(AppError::InvalidTransition {
                requested: "pause",
                current,
            }),
        }
    }

    /// Clears the pause flag; processing continues from the checkpoint.
    /// No-op when already running.
    pub fn resume(&self) -> Result<JobState, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            JobState::Paused => {
                if let Some(controls) = &inner.controls {
                    controls.resume();
                }
                inner.state = JobState::Running;
                Ok(JobState::Running)
            }
            JobState::Running => Ok(JobState::Running),
            current => Err(AppError::InvalidTransition {
                requested: "resume",
                current,
            }),
        }
    }

    /// Requests a cooperative stop; the current chunk completes, the
    /// session freezes its partial counts as `stopped`.
    pub fn stop(&self) -> Result<JobState, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            JobState::Running | JobState::Paused => {
                if let Some(controls) = &inner.controls {
                    controls.request_stop();
                }
                inner.state = JobState::Stopping;
                Ok(JobState::Stopping)
            }
            JobState::Stopping => Ok(JobState::Stopping),
            current => Err(AppError::InvalidTransition {
                requested: "stop",
                current,
            }),
        }
    }

    /// Current controller state (in-memory, cheap).
    pub fn state(&self) -> JobState {
        self.inner.lock().unwrap().state
    }

    /// Merged live status for the control plane.
    pub fn status(&self) -> ControllerStatus {
        let inner = self.inner.lock().unwrap();
        let progress = self.progress.lock().unwrap().clone();

        let elapsed_seconds = inner
            .started_at
            .filter(|_| inner.state.is_active())
            .map(|t| (Utc::now() - t).num_seconds());

        let estimated_remaining_seconds = match (elapsed_seconds, progress.podcasts_done) {
            (Some(elapsed), done) if done > 0 && progress.total_podcasts > done => {
                let remaining = (progress.total_podcasts - done) as i64;
                Some(elapsed * remaining / done as i64)
            }
            _ => None,
        };

        ControllerStatus {
            state: inner.state,
            session_id: inner.session_id,
            started_at: inner.started_at,
            progress,
            elapsed_seconds,
            estimated_remaining_seconds,
        }
    }
}
