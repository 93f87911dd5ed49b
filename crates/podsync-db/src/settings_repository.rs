//! Auto-sync settings repository (singleton row).

use sqlx::{PgPool, Pool, Postgres};

use podsync_core::config::AutoSyncSettings;
use podsync_core::error::AppError;
use podsync_core::models::TriggerType;
use podsync_core::traits::SettingsStore;

/// PostgreSQL-backed implementation of [`SettingsStore`].
#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Postgres>,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    enabled: bool,
    interval_minutes: i32,
    chunk_size: i32,
    max_concurrent_items: i32,
    mode: String,
}

impl From<SettingsRow> for AutoSyncSettings {
    fn from(row: SettingsRow) -> Self {
        AutoSyncSettings {
            enabled: row.enabled,
            interval_minutes: row.interval_minutes.max(1) as u32,
            chunk_size: row.chunk_size.max(1) as u32,
            max_concurrent_items: row.max_concurrent_items.max(1) as u32,
            mode: row.mode.parse().unwrap_or(TriggerType::Scheduled),
        }
    }
}

impl SettingsStore for SettingsRepository {
    async fn get_settings(&self) -> Result<AutoSyncSettings, AppError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            r#"
            SELECT enabled, interval_minutes, chunk_size, max_concurrent_items, mode
            FROM auto_sync_settings
            WHERE id = TRUE
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into).unwrap_or_default())
    }

    async fn save_settings(&self, settings: &AutoSyncSettings) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO auto_sync_settings
                (id, enabled, interval_minutes, chunk_size, max_concurrent_items, mode, updated_at)
            VALUES (TRUE, $1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                enabled = EXCLUDED.enabled,
                interval_minutes = EXCLUDED.interval_minutes,
                chunk_size = EXCLUDED.chunk_size,
                max_concurrent_items = EXCLUDED.max_concurrent_items,
                mode = EXCLUDED.mode,
                updated_at = NOW()
            "#,
        )
        .bind(settings.enabled)
        .bind(settings.interval_minutes as i32)
        .bind(settings.chunk_size as i32)
        .bind(settings.max_concurrent_items as i32)
        .bind(settings.mode.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
