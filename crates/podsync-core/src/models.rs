//! Domain models for the podcast catalog and its sync bookkeeping.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cumulative engagement counters as reported by the external source.
///
/// Counters are snapshots, never decremented by sync; the API occasionally
/// reports decreases (content removal) and those surface as zero-floored
/// gains, not negative values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounters {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    /// Total content length in seconds, parsed from the API's ISO-8601
    /// duration field.
    pub duration_seconds: i64,
}

impl EngagementCounters {
    /// Component-wise sum, used to roll episode counters up to the podcast.
    pub fn add(&self, other: &EngagementCounters) -> EngagementCounters {
        EngagementCounters {
            views: self.views + other.views,
            likes: self.likes + other.likes,
            comments: self.comments + other.comments,
            duration_seconds: self.duration_seconds + other.duration_seconds,
        }
    }
}

/// A podcast in the directory (catalog item).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Podcast {
    pub id: Uuid,
    /// External collection id (the hosted playlist backing this podcast).
    pub collection_id: String,
    pub title: String,
    /// URL-safe unique slug derived from the title.
    pub slug: String,
    pub counters: EngagementCounters,
    pub episode_count: i32,
    pub created_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// An episode belonging to a podcast (child item).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub podcast_id: Uuid,
    /// External id of the hosted media item.
    pub external_id: String,
    pub title: String,
    pub slug: String,
    /// Assigned once at insertion by ascending publish time; never
    /// re-derived by later syncs.
    pub episode_number: i32,
    pub published_at: DateTime<Utc>,
    pub counters: EngagementCounters,
}

/// Insert payload for a newly discovered episode.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEpisode {
    pub podcast_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub slug: String,
    pub episode_number: i32,
    pub published_at: DateTime<Utc>,
    pub counters: EngagementCounters,
}

/// Counter-only update for an episode that already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeCounterUpdate {
    pub external_id: String,
    pub counters: EngagementCounters,
}

/// One counters-at-a-date row per podcast per day. Later syncs on the same
/// day upsert the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub podcast_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub counters: EngagementCounters,
    pub episode_count: i32,
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Test,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Test => "test",
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggerType::Manual),
            "scheduled" => Ok(TriggerType::Scheduled),
            "test" => Ok(TriggerType::Test),
            _ => Err(format!("invalid trigger type: {s}")),
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a sync log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Append-only audit trail entry, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub session_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Derives a URL-safe slug from a title.
///
/// Lowercases, maps runs of non-alphanumerics to single hyphens, and trims
/// leading/trailing hyphens. Uniqueness is the caller's problem (suffix
/// probe against the store).
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        // Titles made entirely of punctuation/emoji still need a slug.
        slug.push_str("untitled");
    }

    slug
}
