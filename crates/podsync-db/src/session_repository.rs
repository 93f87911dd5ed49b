//! Session and sync-log repository.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use podsync_core::error::AppError;
use podsync_core::job::{JobState, SyncSession};
use podsync_core::models::{LogLevel, SyncLogEntry, TriggerType};
use podsync_core::sync::SyncStats;
use podsync_core::traits::SessionStore;

/// PostgreSQL-backed implementation of [`SessionStore`].
#[derive(Clone)]
pub struct SessionRepository {
    pool: Pool<Postgres>,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    trigger_type: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    heartbeat_at: DateTime<Utc>,
    checkpoint: i64,
    sync_stats: Option<sqlx::types::Json<SyncStats>>,
    error_message: Option<String>,
}

impl From<SessionRow> for SyncSession {
    fn from(row: SessionRow) -> Self {
        SyncSession {
            id: row.id,
            trigger: row.trigger_type.parse().unwrap_or(TriggerType::Manual),
            status: row.status.parse().unwrap_or(JobState::Failed),
            started_at: row.started_at,
            completed_at: row.completed_at,
            heartbeat_at: row.heartbeat_at,
            checkpoint: row.checkpoint,
            stats: row.sync_stats.map(|j| j.0).unwrap_or_default(),
            error_message: row.error_message,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    session_id: Option<Uuid>,
    level: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<LogRow> for SyncLogEntry {
    fn from(row: LogRow) -> Self {
        SyncLogEntry {
            id: row.id,
            session_id: row.session_id,
            level: match row.level.as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                _ => LogLevel::Info,
            },
            message: row.message,
            created_at: row.created_at,
        }
    }
}

impl SessionStore for SessionRepository {
    async fn create_session(&self, trigger: TriggerType) -> Result<SyncSession, AppError> {
        let row: SessionRow = sqlx::query_as(
            r#"
            INSERT INTO sync_sessions (trigger_type, status)
            VALUES ($1, 'running')
            RETURNING *
            "#,
        )
        .bind(trigger.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<SyncSession>, AppError> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sync_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn latest_session(&self) -> Result<Option<SyncSession>, AppError> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM sync_sessions ORDER BY started_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SyncSession>, AppError> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM sync_sessions ORDER BY started_at DESC LIMIT $1")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobState,
        error_message: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_sessions
            SET status = $2,
                error_message = COALESCE($3, error_message),
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END,
                heartbeat_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(status.is_terminal())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_progress(
        &self,
        id: Uuid,
        checkpoint: i64,
        stats: &SyncStats,
    ) -> Result<(), AppError> {
        let stats_json = serde_json::to_value(stats).map_err(AppError::SerializationError)?;

        sqlx::query(
            r#"
            UPDATE sync_sessions
            SET checkpoint = $2,
                sync_stats = $3,
                heartbeat_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(checkpoint)
        .bind(stats_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail_stale_running(&self, stale_after: Duration) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_sessions
            SET status = 'failed',
                error_message = 'stale heartbeat - coordinator shut down uncleanly',
                completed_at = NOW()
            WHERE status IN ('running', 'paused', 'stopping')
              AND heartbeat_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(stale_after.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_log(
        &self,
        session_id: Option<Uuid>,
        level: LogLevel,
        message: &str,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sync_logs (session_id, level, message) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(level.as_str())
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>, AppError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, level, message, created_at
            FROM sync_logs
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
