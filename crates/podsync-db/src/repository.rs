//! Catalog repository: podcasts, episodes, daily snapshots.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use podsync_core::error::AppError;
use podsync_core::models::{
    DailySnapshot, EngagementCounters, EpisodeCounterUpdate, NewEpisode, Podcast,
};
use podsync_core::traits::CatalogStore;

/// PostgreSQL-backed implementation of [`CatalogStore`].
#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Single-slug existence probe for podcasts, backing the same
    /// suffix-disambiguation loop episodes use.
    pub async fn podcast_slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM podcasts WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Registers a podcast in the catalog (used by the CLI and by tests;
    /// the directory application owns podcast CRUD in production).
    pub async fn insert_podcast(
        &self,
        collection_id: &str,
        title: &str,
        slug: &str,
    ) -> Result<Uuid, AppError> {
        let rec: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO podcasts (collection_id, title, slug)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection_id) DO UPDATE SET title = EXCLUDED.title
            RETURNING id
            "#,
        )
        .bind(collection_id)
        .bind(title)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;

        Ok(rec.0)
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct PodcastRow {
    id: Uuid,
    collection_id: String,
    title: String,
    slug: String,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    duration_seconds: i64,
    episode_count: i32,
    created_at: DateTime<Utc>,
    last_synced_at: Option<DateTime<Utc>>,
}

impl From<PodcastRow> for Podcast {
    fn from(row: PodcastRow) -> Self {
        Podcast {
            id: row.id,
            collection_id: row.collection_id,
            title: row.title,
            slug: row.slug,
            counters: EngagementCounters {
                views: row.view_count,
                likes: row.like_count,
                comments: row.comment_count,
                duration_seconds: row.duration_seconds,
            },
            episode_count: row.episode_count,
            created_at: row.created_at,
            last_synced_at: row.last_synced_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EpisodeCountersRow {
    external_id: String,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    duration_seconds: i64,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    podcast_id: Uuid,
    snapshot_date: NaiveDate,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    duration_seconds: i64,
    episode_count: i32,
}

impl From<SnapshotRow> for DailySnapshot {
    fn from(row: SnapshotRow) -> Self {
        DailySnapshot {
            podcast_id: row.podcast_id,
            snapshot_date: row.snapshot_date,
            counters: EngagementCounters {
                views: row.view_count,
                likes: row.like_count,
                comments: row.comment_count,
                duration_seconds: row.duration_seconds,
            },
            episode_count: row.episode_count,
        }
    }
}

// =============================================================================
// CatalogStore implementation
// =============================================================================

impl CatalogStore for CatalogRepository {
    async fn count_podcasts(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM podcasts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_podcasts_page(&self, offset: i64, limit: i64) -> Result<Vec<Podcast>, AppError> {
        let rows: Vec<PodcastRow> = sqlx::query_as(
            r#"
            SELECT id, collection_id, title, slug,
                   view_count, like_count, comment_count, duration_seconds,
                   episode_count, created_at, last_synced_at
            FROM podcasts
            ORDER BY created_at, id
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn episode_counters(
        &self,
        podcast_id: Uuid,
    ) -> Result<HashMap<String, EngagementCounters>, AppError> {
        let rows: Vec<EpisodeCountersRow> = sqlx::query_as(
            r#"
            SELECT external_id, view_count, like_count, comment_count, duration_seconds
            FROM episodes
            WHERE podcast_id = $1
            "#,
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.external_id,
                    EngagementCounters {
                        views: row.view_count,
                        likes: row.like_count,
                        comments: row.comment_count,
                        duration_seconds: row.duration_seconds,
                    },
                )
            })
            .collect())
    }

    async fn max_episode_number(&self, podcast_id: Uuid) -> Result<i32, AppError> {
        let (max,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(episode_number), 0) FROM episodes WHERE podcast_id = $1",
        )
        .bind(podcast_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn episode_slug_exists(&self, slug: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM episodes WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_episode(&self, episode: &NewEpisode) -> Result<Uuid, AppError> {
        // Keyed by external_id so chunk redelivery after a crash-and-resume
        // is a no-op update, not a duplicate. Slug and ordinal are
        // insert-only: a conflicting row keeps the ones it was born with.
        let rec: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO episodes (
                podcast_id, external_id, title, slug, episode_number, published_at,
                view_count, like_count, comment_count, duration_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_id)
            DO UPDATE SET
                title = EXCLUDED.title,
                view_count = EXCLUDED.view_count,
                like_count = EXCLUDED.like_count,
                comment_count = EXCLUDED.comment_count,
                duration_seconds = EXCLUDED.duration_seconds,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(episode.podcast_id)
        .bind(&episode.external_id)
        .bind(&episode.title)
        .bind(&episode.slug)
        .bind(episode.episode_number)
        .bind(episode.published_at)
        .bind(episode.counters.views)
        .bind(episode.counters.likes)
        .bind(episode.counters.comments)
        .bind(episode.counters.duration_seconds)
        .fetch_one(&self.pool)
        .await?;

        Ok(rec.0)
    }

    async fn update_episode_counters(
        &self,
        update: &EpisodeCounterUpdate,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE episodes
            SET view_count = $2,
                like_count = $3,
                comment_count = $4,
                duration_seconds = $5,
                updated_at = NOW()
            WHERE external_id = $1
            "#,
        )
        .bind(&update.external_id)
        .bind(update.counters.views)
        .bind(update.counters.likes)
        .bind(update.counters.comments)
        .bind(update.counters.duration_seconds)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_podcast_after_sync(
        &self,
        podcast_id: Uuid,
        counters: &EngagementCounters,
        episode_count: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE podcasts
            SET view_count = $2,
                like_count = $3,
                comment_count = $4,
                duration_seconds = $5,
                episode_count = $6,
                last_synced_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(podcast_id)
        .bind(counters.views)
        .bind(counters.likes)
        .bind(counters.comments)
        .bind(counters.duration_seconds)
        .bind(episode_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_daily_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO daily_snapshots (
                podcast_id, snapshot_date,
                view_count, like_count, comment_count, duration_seconds, episode_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (podcast_id, snapshot_date)
            DO UPDATE SET
                view_count = EXCLUDED.view_count,
                like_count = EXCLUDED.like_count,
                comment_count = EXCLUDED.comment_count,
                duration_seconds = EXCLUDED.duration_seconds,
                episode_count = EXCLUDED.episode_count
            "#,
        )
        .bind(snapshot.podcast_id)
        .bind(snapshot.snapshot_date)
        .bind(snapshot.counters.views)
        .bind(snapshot.counters.likes)
        .bind(snapshot.counters.comments)
        .bind(snapshot.counters.duration_seconds)
        .bind(snapshot.episode_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn snapshots_for_podcast(
        &self,
        podcast_id: Uuid,
    ) -> Result<Vec<DailySnapshot>, AppError> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT podcast_id, snapshot_date,
                   view_count, like_count, comment_count, duration_seconds, episode_count
            FROM daily_snapshots
            WHERE podcast_id = $1
            ORDER BY snapshot_date
            "#,
        )
        .bind(podcast_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
