//! podsync core - domain types, reconciliation, scheduling, and job control.
//!
//! This crate holds everything store- and transport-agnostic:
//!
//! - **Domain models**: [`Podcast`], [`Episode`], [`DailySnapshot`], …
//! - **Credential pool**: quota-aware rotation over API keys
//! - **Reconciliation**: [`ReconcileEngine`] diffs external state against
//!   the store and produces the write set
//! - **Scheduling**: [`SyncScheduler`] drives chunked, resumable iteration
//!   over the catalog through a [`WorkerPool`]
//! - **Control plane**: [`JobController`] with the
//!   idle/running/paused/stopping state machine
//! - **Traits**: [`CatalogStore`], [`SessionStore`], [`CredentialStore`],
//!   [`MediaClient`] seams implemented by `podsync-db` and
//!   `podsync-client`, mocked in tests
//!
//! The engine is generic over those traits so the same logic runs against
//! PostgreSQL and the live Data API in production and fully in memory in
//! tests.

pub mod cache;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod job;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod scheduler;
pub mod sync;
pub mod traits;
pub mod worker;

// Error handling
pub use error::{ApiErrorDetails, ApiErrorKind, AppError};

// Configuration
pub use config::{
    AutoSyncSettings, CredentialEntry, CredentialsConfig, HttpConfig, SyncConfig,
    default_credentials_path, load_credentials_config,
};

// Domain models
pub use models::{
    DailySnapshot, EngagementCounters, Episode, EpisodeCounterUpdate, LogLevel, NewEpisode,
    Podcast, SyncLogEntry, TriggerType, slugify,
};

// Credential pool
pub use credentials::{Credential, CredentialLease, CredentialPool, CredentialStatus, UsageMessage};

// Sync bookkeeping
pub use sync::{
    AtomicSyncStats, PeriodGains, SyncOutcome, SyncStats, counter_gains, gain, period_gains,
};

// Reconciliation
pub use reconcile::{EpisodeWrite, ItemError, ReconcileEngine, ReconcilePlan, chunk_writes};

// Scheduling and workers
pub use scheduler::{SchedulerOutcome, SyncScheduler};
pub use worker::{ChunkOutcome, ChunkTask, WorkerPool};

// Job state machine and control plane
pub use controller::{ControllerStatus, JobController, JobProgress, TrackingReporter};
pub use job::{JobControls, JobOptions, JobState, ResumeOutcome, SyncSession};

// Progress reporting
pub use progress::{ProgressEvent, ProgressReporter, SilentReporter, TracingReporter};

// Caching
pub use cache::TtlCache;

// Traits for dependency injection
pub use traits::{
    CatalogStore, CollectionPage, CredentialStore, MediaClient, RemoteEpisode, SessionStore,
    SettingsStore,
};
