//! Job state machine types and cooperative run controls.
//!
//! States:
//! ```text
//! idle → running → {paused, stopping} → {completed, failed, stopped}
//!           ↑          |
//!           +-- resume +--→ stopping → stopped
//! ```
//!
//! Pause and stop are cooperative: the scheduler observes the flags at
//! chunk boundaries, so an in-flight chunk always commits before the
//! transition is acknowledged. Nothing is killed mid-write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::models::TriggerType;
use crate::sync::SyncStats;

/// Overall run status of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
    Stopped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Stopping => "stopping",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Stopped => "stopped",
        }
    }

    /// Terminal states never transition again; a new run starts a new
    /// session instead.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped
        )
    }

    /// True while a session owns the engine (a `start` must be rejected).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Running | JobState::Paused | JobState::Stopping
        )
    }

    /// Legal transition table for the control plane.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Stopping)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Completed)
                | (Stopping, Failed)
                | (Completed | Failed | Stopped, Running)
        )
    }
}

/// Error type for parsing a [`JobState`] from its storage string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStateError(String);

impl std::fmt::Display for ParseJobStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid job state: {}", self.0)
    }
}

impl std::error::Error for ParseJobStateError {}

impl std::str::FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(JobState::Idle),
            "running" => Ok(JobState::Running),
            "paused" => Ok(JobState::Paused),
            "stopping" => Ok(JobState::Stopping),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "stopped" => Ok(JobState::Stopped),
            _ => Err(ParseJobStateError(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One sync run, persisted for the whole of its life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: Uuid,
    pub trigger: TriggerType,
    pub status: JobState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Stamped at every chunk boundary; a stale value under `running`
    /// means the coordinating process died uncleanly.
    pub heartbeat_at: DateTime<Utc>,
    /// Contiguous-completion frontier: podcasts fully committed in stable
    /// catalog order. Resume starts here.
    pub checkpoint: i64,
    pub stats: SyncStats,
    pub error_message: Option<String>,
}

/// Per-run options resolved when a job starts.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub config: SyncConfig,
    pub trigger: TriggerType,
}

impl JobOptions {
    pub fn new(config: SyncConfig, trigger: TriggerType) -> Self {
        Self { config, trigger }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            config: SyncConfig::default(),
            trigger: TriggerType::Manual,
        }
    }
}

/// Outcome of waiting at a pause point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    Stopped,
}

/// Cooperative pause/stop flags shared between the control plane and the
/// scheduler. Cloneable handle; all clones observe the same flags.
#[derive(Clone)]
pub struct JobControls {
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
    stop: CancellationToken,
}

impl JobControls {
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            resume_notify: Arc::new(Notify::new()),
            stop: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume_notify.notify_waiters();
    }

    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Blocks while the pause flag is set; a stop request wins over a
    /// pending resume.
    pub async fn wait_resumed(&self) -> ResumeOutcome {
        loop {
            if self.stop.is_cancelled() {
                return ResumeOutcome::Stopped;
            }
            if !self.is_paused() {
                return ResumeOutcome::Resumed;
            }

            let notified = self.resume_notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = self.stop.cancelled() => return ResumeOutcome::Stopped,
            }
        }
    }
}

impl Default for JobControls {
    fn default() -> Self {
        Self::new()
    }
}
