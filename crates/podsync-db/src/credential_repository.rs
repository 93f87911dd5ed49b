//! Persisted mirror of credential usage.
//!
//! `credentials.toml` stays the source of truth for keys and quotas; this
//! table only carries what must survive a restart mid-window: consumed
//! units and the active flag.

use std::collections::HashMap;

use sqlx::{PgPool, Pool, Postgres};

use podsync_core::config::CredentialEntry;
use podsync_core::error::AppError;
use podsync_core::traits::CredentialStore;

/// PostgreSQL-backed implementation of [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialRepository {
    pool: Pool<Postgres>,
}

impl CredentialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mirrors the configured entries into the table, preserving usage
    /// counters for ids that already exist.
    pub async fn mirror_entries(&self, entries: &[CredentialEntry]) -> Result<(), AppError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO credentials (id, quota_limit, active)
                VALUES ($1, $2, $3)
                ON CONFLICT (id)
                DO UPDATE SET quota_limit = EXCLUDED.quota_limit, updated_at = NOW()
                "#,
            )
            .bind(&entry.id)
            .bind(entry.daily_quota)
            .bind(entry.enabled)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Zeroes all usage counters. The quota reset itself happens on the
    /// provider's schedule; operators call this when it has landed.
    pub async fn reset_usage(&self) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE credentials SET quota_used = 0, active = TRUE, updated_at = NOW()")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

impl CredentialStore for CredentialRepository {
    async fn record_usage(&self, credential_id: &str, units: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE credentials
            SET quota_used = quota_used + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(credential_id)
        .bind(units)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_active(&self, credential_id: &str, active: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE credentials SET active = $2, updated_at = NOW() WHERE id = $1")
            .bind(credential_id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_usage(&self) -> Result<HashMap<String, i64>, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT id, quota_used FROM credentials")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }
}
