//! Pure sync bookkeeping: outcomes, statistics, and period-gain math.
//!
//! Everything here is I/O-free so it can be exercised without a store or a
//! live API.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{DailySnapshot, EngagementCounters};

/// Outcome of processing a single episode during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored counters already match the external snapshot.
    Unchanged,
    /// Counters changed; a counter-only update was produced.
    Updated,
    /// First time this external id was seen; an insert was produced.
    Created,
    /// Processing failed for this episode (recorded, siblings unaffected).
    Failed,
}

/// Aggregate statistics for one sync session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub podcasts_processed: usize,
    pub podcasts_failed: usize,
    pub episodes_created: usize,
    pub episodes_updated: usize,
    pub episodes_unchanged: usize,
    pub episodes_failed: usize,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total episodes seen across all outcomes.
    pub fn episodes_total(&self) -> usize {
        self.episodes_created + self.episodes_updated + self.episodes_unchanged
            + self.episodes_failed
    }
}

/// Lock-free counterpart of [`SyncStats`] shared between the coordinator
/// and concurrently completing chunks.
#[derive(Debug, Default)]
pub struct AtomicSyncStats {
    podcasts_processed: AtomicUsize,
    podcasts_failed: AtomicUsize,
    episodes_created: AtomicUsize,
    episodes_updated: AtomicUsize,
    episodes_unchanged: AtomicUsize,
    episodes_failed: AtomicUsize,
}

impl AtomicSyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_episode(&self, outcome: SyncOutcome) {
        let counter = match outcome {
            SyncOutcome::Created => &self.episodes_created,
            SyncOutcome::Updated => &self.episodes_updated,
            SyncOutcome::Unchanged => &self.episodes_unchanged,
            SyncOutcome::Failed => &self.episodes_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_episodes(&self, outcome: SyncOutcome, count: usize) {
        let counter = match outcome {
            SyncOutcome::Created => &self.episodes_created,
            SyncOutcome::Updated => &self.episodes_updated,
            SyncOutcome::Unchanged => &self.episodes_unchanged,
            SyncOutcome::Failed => &self.episodes_failed,
        };
        counter.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_podcast(&self, failed: bool) {
        if failed {
            self.podcasts_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.podcasts_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_stats(&self) -> SyncStats {
        SyncStats {
            podcasts_processed: self.podcasts_processed.load(Ordering::Relaxed),
            podcasts_failed: self.podcasts_failed.load(Ordering::Relaxed),
            episodes_created: self.episodes_created.load(Ordering::Relaxed),
            episodes_updated: self.episodes_updated.load(Ordering::Relaxed),
            episodes_unchanged: self.episodes_unchanged.load(Ordering::Relaxed),
            episodes_failed: self.episodes_failed.load(Ordering::Relaxed),
        }
    }
}

/// Zero-floored counter gain.
///
/// The external source occasionally reports a decrease (content removal);
/// the directory never shows negative growth, so the gain floors at zero.
pub fn gain(today: i64, prior: i64) -> i64 {
    (today - prior).max(0)
}

/// Component-wise zero-floored gain between two counter snapshots.
pub fn counter_gains(today: &EngagementCounters, prior: &EngagementCounters) -> EngagementCounters {
    EngagementCounters {
        views: gain(today.views, prior.views),
        likes: gain(today.likes, prior.likes),
        comments: gain(today.comments, prior.comments),
        duration_seconds: gain(today.duration_seconds, prior.duration_seconds),
    }
}

/// Period-over-period view gains derived from daily snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodGains {
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,
    /// True when any window had no dated snapshot to diff against and the
    /// lifetime total was used instead. Degraded accuracy, not a true
    /// period delta; status surfaces must present it as approximate.
    pub approximate: bool,
}

/// Computes view gains for the 1/7/30-day windows ending at `today`.
///
/// `history` is this podcast's snapshots, any order. For each window the
/// baseline is the most recent snapshot at or before the window start; when
/// none exists the gain falls back to the current lifetime total and the
/// result is flagged approximate.
pub fn period_gains(
    current_views: i64,
    today: NaiveDate,
    history: &[DailySnapshot],
) -> PeriodGains {
    let mut approximate = false;

    let mut window = |days: i64| -> i64 {
        let cutoff = today - chrono::Duration::days(days);
        let baseline = history
            .iter()
            .filter(|s| s.snapshot_date <= cutoff)
            .max_by_key(|s| s.snapshot_date);

        match baseline {
            Some(s) => gain(current_views, s.counters.views),
            None => {
                approximate = true;
                current_views.max(0)
            }
        }
    };

    let daily = window(1);
    let weekly = window(7);
    let monthly = window(30);

    PeriodGains {
        daily,
        weekly,
        monthly,
        approximate,
    }
}
