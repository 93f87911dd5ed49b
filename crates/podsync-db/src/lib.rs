//! podsync db - PostgreSQL implementations of the core store traits.

pub mod credential_repository;
pub mod repository;
pub mod session_repository;
pub mod settings_repository;

pub use credential_repository::CredentialRepository;
pub use repository::CatalogRepository;
pub use session_repository::SessionRepository;
pub use settings_repository::SettingsRepository;

/// Runs the bundled migrations against the given pool.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), podsync_core::AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| podsync_core::AppError::ConfigError(format!("migration failed: {e}")))
}
