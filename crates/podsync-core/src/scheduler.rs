//! Chunked, resumable iteration over the catalog.
//!
//! The scheduler walks podcasts in stable creation order, reconciles up to
//! `max_concurrent_items` of them concurrently, and pushes each plan's
//! writes through the worker pool in bounded chunks. Between chunks it
//! observes the cooperative pause/stop flags and persists progress, so a
//! crash or stop resumes at the next unprocessed podcast.
//!
//! Checkpointing uses a contiguous-completion frontier: with concurrent
//! podcasts finishing out of order, the persisted checkpoint only advances
//! past index `i` once every podcast at index `<= i` has fully committed.
//! Resume therefore never skips an unprocessed podcast and never repeats a
//! committed one.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use futures::stream::{self, StreamExt};
use tokio::sync::oneshot;

use crate::job::{JobControls, JobOptions, JobState, ResumeOutcome, SyncSession};
use crate::models::{LogLevel, Podcast};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::reconcile::{ReconcileEngine, chunk_writes};
use crate::sync::{AtomicSyncStats, SyncOutcome, SyncStats};
use crate::traits::{CatalogStore, MediaClient, SessionStore};
use crate::worker::{ChunkTask, WorkerPool};

/// How a single podcast's processing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PodcastRun {
    Completed,
    Failed,
    /// Stop/fatal observed before this podcast committed; it stays
    /// unprocessed for the next run.
    Aborted,
}

/// Result of a scheduler run, consumed by the job controller.
#[derive(Debug, Clone)]
pub struct SchedulerOutcome {
    pub final_state: JobState,
    pub stats: SyncStats,
    pub checkpoint: i64,
    pub error: Option<String>,
}

/// Shared per-run context threaded through the podcast futures.
struct RunContext<'a, Ss: SessionStore, R: ProgressReporter> {
    sessions: &'a Ss,
    reporter: &'a R,
    controls: &'a JobControls,
    stats: AtomicSyncStats,
    /// Contiguous-completion frontier (podcasts committed in order).
    frontier: AtomicI64,
    /// Out-of-order completions waiting for the frontier to reach them.
    completed: Mutex<BTreeSet<i64>>,
    /// First observer of the pause flag acknowledges it; the rest wait.
    pause_acknowledged: AtomicBool,
    /// First fatal error; set requests a run-wide stop.
    fatal: Mutex<Option<String>>,
    session_id: uuid::Uuid,
    total: usize,
}

impl<Ss: SessionStore, R: ProgressReporter> RunContext<'_, Ss, R> {
    /// Marks podcast `index` fully committed and advances the frontier
    /// over any contiguous run of completed indices.
    fn complete(&self, index: i64) -> i64 {
        let mut completed = self.completed.lock().unwrap();
        completed.insert(index);

        let mut frontier = self.frontier.load(Ordering::SeqCst);
        while completed.remove(&frontier) {
            frontier += 1;
        }
        self.frontier.store(frontier, Ordering::SeqCst);
        frontier
    }

    /// Persists checkpoint + stats + heartbeat; failures are logged, not
    /// propagated, so a flaky session write never kills a healthy run.
    async fn persist_progress(&self) {
        let checkpoint = self.frontier.load(Ordering::SeqCst);
        if let Err(e) = self
            .sessions
            .record_progress(self.session_id, checkpoint, &self.stats.to_stats())
            .await
        {
            tracing::warn!(error = %e, "Failed to persist sync progress");
        }
    }

    fn record_fatal(&self, message: String) {
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            *fatal = Some(message);
        }
        drop(fatal);
        self.controls.request_stop();
    }

    /// Pause/stop gate, observed between chunks. Returns `false` when the
    /// run must wind down.
    async fn gate(&self) -> bool {
        if self.controls.is_stop_requested() {
            return false;
        }

        if self.controls.is_paused() {
            if !self.pause_acknowledged.swap(true, Ordering::SeqCst) {
                self.reporter.report(ProgressEvent::JobPaused);
                if let Err(e) = self
                    .sessions
                    .update_status(self.session_id, JobState::Paused, None)
                    .await
                {
                    tracing::warn!(error = %e, "Failed to persist paused status");
                }
            }

            match self.controls.wait_resumed().await {
                ResumeOutcome::Stopped => return false,
                ResumeOutcome::Resumed => {
                    if self.pause_acknowledged.swap(false, Ordering::SeqCst) {
                        self.reporter.report(ProgressEvent::JobResumed);
                        if let Err(e) = self
                            .sessions
                            .update_status(self.session_id, JobState::Running, None)
                            .await
                        {
                            tracing::warn!(error = %e, "Failed to persist resumed status");
                        }
                    }
                }
            }
        }

        !self.controls.is_stop_requested()
    }
}

/// Drives one sync job from checkpoint to terminal state.
pub struct SyncScheduler<Cs, C, Ss>
where
    Cs: CatalogStore,
    C: MediaClient,
    Ss: SessionStore,
{
    catalog: Cs,
    engine: ReconcileEngine<Cs, C>,
    sessions: Ss,
}

impl<Cs, C, Ss> SyncScheduler<Cs, C, Ss>
where
    Cs: CatalogStore,
    C: MediaClient,
    Ss: SessionStore,
{
    pub fn new(catalog: Cs, client: C, sessions: Ss) -> Self {
        let engine = ReconcileEngine::new(catalog.clone(), client);
        Self {
            catalog,
            engine,
            sessions,
        }
    }

    /// Runs the job to a terminal state. The session row must already
    /// exist; `session.checkpoint` is where iteration starts.
    pub async fn run<R: ProgressReporter>(
        &self,
        session: &SyncSession,
        options: &JobOptions,
        controls: &JobControls,
        reporter: &R,
    ) -> SchedulerOutcome {
        let total = match self.catalog.count_podcasts().await {
            Ok(n) => n.max(0) as usize,
            Err(e) => {
                let message = format!("cannot enumerate catalog: {e}");
                return self.finish(session, JobState::Failed, SyncStats::default(),
                    session.checkpoint, Some(message), reporter).await;
            }
        };

        reporter.report(ProgressEvent::JobStarted {
            session_id: session.id,
            total_podcasts: total,
            resumed_from: session.checkpoint,
        });

        let ctx = RunContext {
            sessions: &self.sessions,
            reporter,
            controls,
            stats: AtomicSyncStats::new(),
            frontier: AtomicI64::new(session.checkpoint),
            completed: Mutex::new(BTreeSet::new()),
            pause_acknowledged: AtomicBool::new(false),
            fatal: Mutex::new(None),
            session_id: session.id,
            total,
        };

        let pool = WorkerPool::spawn(
            self.catalog.clone(),
            options.config.max_concurrent_items,
        );

        let mut offset = session.checkpoint;
        'pages: loop {
            if !ctx.gate().await {
                break;
            }

            let page = match self
                .catalog
                .list_podcasts_page(offset, options.config.catalog_page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    ctx.record_fatal(format!("cannot list catalog page at {offset}: {e}"));
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            let page_len = page.len() as i64;
            let page_offset = offset;

            let mut results = stream::iter(page.into_iter().enumerate())
                .map(|(i, podcast)| {
                    let index = page_offset + i as i64;
                    self.process_podcast(index, podcast, options, &pool, &ctx)
                })
                .buffer_unordered(options.config.max_concurrent_items);

            while let Some(run) = results.next().await {
                if run == PodcastRun::Aborted {
                    // Drain remaining futures; they all abort at their
                    // next gate now that stop is requested.
                    while results.next().await.is_some() {}
                    break 'pages;
                }
            }

            offset += page_len;
        }

        pool.shutdown().await;

        let stats = ctx.stats.to_stats();
        let checkpoint = ctx.frontier.load(Ordering::SeqCst);
        let fatal = ctx.fatal.lock().unwrap().clone();

        let final_state = if fatal.is_some() {
            JobState::Failed
        } else if controls.is_stop_requested() {
            JobState::Stopped
        } else {
            JobState::Completed
        };

        self.finish(session, final_state, stats, checkpoint, fatal, reporter)
            .await
    }

    /// One podcast: plan, chunked writes through the pool, rollup, events.
    async fn process_podcast<R: ProgressReporter>(
        &self,
        index: i64,
        podcast: Podcast,
        options: &JobOptions,
        pool: &WorkerPool,
        ctx: &RunContext<'_, Ss, R>,
    ) -> PodcastRun {
        if !ctx.gate().await {
            return PodcastRun::Aborted;
        }

        ctx.reporter.report(ProgressEvent::PodcastStarted {
            index: index as usize,
            total: ctx.total,
            title: podcast.title.clone(),
        });

        let today = chrono::Utc::now().date_naive();
        let plan = match self.engine.plan(&podcast, today).await {
            Ok(plan) => plan,
            Err(e) if e.is_fatal() => {
                ctx.record_fatal(e.to_string());
                return PodcastRun::Aborted;
            }
            Err(e) => {
                return self.fail_podcast(index, &podcast, &e.to_string(), ctx).await;
            }
        };

        ctx.stats
            .record_episodes(SyncOutcome::Unchanged, plan.unchanged);
        let podcast_counters = plan.podcast_counters;
        let episode_count = plan.episode_count;
        let snapshot = plan.snapshot.clone();
        let (writes, plan_errors) = plan.into_writes();

        for error in &plan_errors {
            ctx.stats.record_episode(SyncOutcome::Failed);
            let line = match &error.external_id {
                Some(id) => format!("{}: item {}: {}", podcast.title, id, error.message),
                None => format!("{}: {}", podcast.title, error.message),
            };
            if let Err(e) = ctx
                .sessions
                .append_log(Some(ctx.session_id), LogLevel::Warn, &line)
                .await
            {
                tracing::warn!(error = %e, "Failed to append sync log entry");
            }
        }

        let chunks = chunk_writes(writes, options.config.chunk_size);
        let chunk_count = chunks.len();

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            if !ctx.gate().await {
                return PodcastRun::Aborted;
            }

            let episodes_in_chunk = chunk.len();
            let (reply_tx, reply_rx) = oneshot::channel();
            let task = ChunkTask {
                podcast_id: podcast.id,
                podcast_title: podcast.title.clone(),
                chunk_index,
                chunk_count,
                writes: chunk,
                reply: reply_tx,
            };

            if pool.submit(task).await.is_err() {
                return PodcastRun::Aborted;
            }
            let outcome = match reply_rx.await {
                Ok(outcome) => outcome,
                Err(_) => return PodcastRun::Aborted,
            };

            ctx.stats.record_episodes(SyncOutcome::Created, outcome.created);
            ctx.stats.record_episodes(SyncOutcome::Updated, outcome.updated);
            ctx.stats.record_episodes(SyncOutcome::Failed, outcome.failed);
            for error in &outcome.errors {
                tracing::warn!(
                    podcast = %podcast.title,
                    item = error.external_id.as_deref().unwrap_or("?"),
                    "{}", error.message
                );
            }

            ctx.reporter.report(ProgressEvent::ChunkCompleted {
                podcast: podcast.title.clone(),
                chunk_index,
                chunk_count,
                episodes_in_chunk,
                stats: ctx.stats.to_stats(),
            });
            ctx.persist_progress().await;
        }

        // Rollup: podcast counters, episode count, and today's snapshot.
        if let Err(e) = self
            .catalog
            .update_podcast_after_sync(podcast.id, &podcast_counters, episode_count)
            .await
        {
            return self
                .fail_podcast(index, &podcast, &format!("rollup failed: {e}"), ctx)
                .await;
        }
        if let Err(e) = self.catalog.upsert_daily_snapshot(&snapshot).await {
            return self
                .fail_podcast(index, &podcast, &format!("snapshot failed: {e}"), ctx)
                .await;
        }

        ctx.stats.record_podcast(false);
        ctx.reporter.report(ProgressEvent::PodcastCompleted {
            index: index as usize,
            total: ctx.total,
            title: podcast.title.clone(),
        });
        ctx.complete(index);
        ctx.persist_progress().await;

        PodcastRun::Completed
    }

    /// Records a podcast-level failure: aggregated, logged, frontier still
    /// advances (the podcast was processed, unsuccessfully).
    async fn fail_podcast<R: ProgressReporter>(
        &self,
        index: i64,
        podcast: &Podcast,
        error: &str,
        ctx: &RunContext<'_, Ss, R>,
    ) -> PodcastRun {
        ctx.stats.record_podcast(true);
        ctx.reporter.report(ProgressEvent::PodcastFailed {
            index: index as usize,
            total: ctx.total,
            title: podcast.title.clone(),
            error: error.to_string(),
        });
        if let Err(e) = ctx
            .sessions
            .append_log(
                Some(ctx.session_id),
                LogLevel::Error,
                &format!("{}: {}", podcast.title, error),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to append sync log entry");
        }
        ctx.complete(index);
        ctx.persist_progress().await;
        PodcastRun::Failed
    }

    /// Persists the terminal state and emits the closing event.
    async fn finish<R: ProgressReporter>(
        &self,
        session: &SyncSession,
        final_state: JobState,
        stats: SyncStats,
        checkpoint: i64,
        error: Option<String>,
        reporter: &R,
    ) -> SchedulerOutcome {
        if let Err(e) = self
            .sessions
            .record_progress(session.id, checkpoint, &stats)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist final progress");
        }
        if let Err(e) = self
            .sessions
            .update_status(session.id, final_state, error.as_deref())
            .await
        {
            tracing::warn!(error = %e, "Failed to persist terminal session status");
        }

        let event = match final_state {
            JobState::Completed => ProgressEvent::JobCompleted { stats },
            JobState::Stopped => ProgressEvent::JobStopped { stats },
            _ => ProgressEvent::JobFailed {
                error: error.clone().unwrap_or_else(|| "unknown".to_string()),
                stats,
            },
        };
        reporter.report(event);

        let level = if final_state == JobState::Failed {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        let message = match &error {
            Some(e) => format!("sync {}: {}", final_state, e),
            None => format!(
                "sync {}: {} podcasts, {} episodes ({} failed)",
                final_state,
                stats.podcasts_processed,
                stats.episodes_total(),
                stats.episodes_failed
            ),
        };
        if let Err(e) = self
            .sessions
            .append_log(Some(session.id), level, &message)
            .await
        {
            tracing::warn!(error = %e, "Failed to append sync log entry");
        }

        SchedulerOutcome {
            final_state,
            stats,
            checkpoint,
            error,
        }
    }
}
