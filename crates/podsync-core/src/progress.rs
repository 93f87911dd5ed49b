//! Progress reporting decoupled from any particular sink.
//!
//! The scheduler emits [`ProgressEvent`]s through a [`ProgressReporter`];
//! binaries plug in [`TracingReporter`], tests a recording mock, and the
//! control plane a tracker that keeps the latest snapshot for `/status`.

use uuid::Uuid;

use crate::sync::SyncStats;

/// Events emitted while a sync job runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A job began; `total_podcasts` is the catalog size at start.
    JobStarted {
        session_id: Uuid,
        total_podcasts: usize,
        resumed_from: i64,
    },
    /// A podcast entered processing.
    PodcastStarted {
        index: usize,
        total: usize,
        title: String,
    },
    /// One chunk of episode writes committed.
    ChunkCompleted {
        podcast: String,
        chunk_index: usize,
        chunk_count: usize,
        episodes_in_chunk: usize,
        stats: SyncStats,
    },
    /// A podcast finished (its chunks all committed, snapshot written).
    PodcastCompleted {
        index: usize,
        total: usize,
        title: String,
    },
    /// A podcast failed as a whole (fetch error after retries, etc.).
    PodcastFailed {
        index: usize,
        total: usize,
        title: String,
        error: String,
    },
    /// Pause flag acknowledged at a chunk boundary.
    JobPaused,
    /// Resume observed; processing continues from the checkpoint.
    JobResumed,
    /// Terminal: ran to the end of the catalog.
    JobCompleted { stats: SyncStats },
    /// Terminal: operator stop honored; partial counts frozen.
    JobStopped { stats: SyncStats },
    /// Terminal: fatal error (e.g. credential pool exhausted).
    JobFailed { error: String, stats: SyncStats },
}

/// Receives progress events. Implementations must be cheap: the scheduler
/// calls this on its hot path between chunks.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent) {
        let _ = event;
    }
}

/// Ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Logs events through `tracing`, for the server and CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::JobStarted {
                session_id,
                total_podcasts,
                resumed_from,
            } => {
                tracing::info!(%session_id, total_podcasts, resumed_from, "Sync job started");
            }
            ProgressEvent::PodcastStarted { index, total, title } => {
                tracing::info!(index, total, podcast = %title, "Syncing podcast");
            }
            ProgressEvent::ChunkCompleted {
                podcast,
                chunk_index,
                chunk_count,
                episodes_in_chunk,
                ..
            } => {
                tracing::debug!(
                    podcast = %podcast,
                    chunk = chunk_index + 1,
                    of = chunk_count,
                    episodes = episodes_in_chunk,
                    "Chunk committed"
                );
            }
            ProgressEvent::PodcastCompleted { index, total, title } => {
                tracing::info!(index, total, podcast = %title, "Podcast synced");
            }
            ProgressEvent::PodcastFailed {
                title, error, ..
            } => {
                tracing::warn!(podcast = %title, error = %error, "Podcast sync failed");
            }
            ProgressEvent::JobPaused => tracing::info!("Sync job paused"),
            ProgressEvent::JobResumed => tracing::info!("Sync job resumed"),
            ProgressEvent::JobCompleted { stats } => {
                tracing::info!(
                    podcasts = stats.podcasts_processed,
                    episodes = stats.episodes_total(),
                    failed = stats.episodes_failed,
                    "Sync job completed"
                );
            }
            ProgressEvent::JobStopped { stats } => {
                tracing::info!(
                    podcasts = stats.podcasts_processed,
                    "Sync job stopped by operator"
                );
            }
            ProgressEvent::JobFailed { error, stats } => {
                tracing::error!(
                    error = %error,
                    podcasts = stats.podcasts_processed,
                    "Sync job failed"
                );
            }
        }
    }
}
