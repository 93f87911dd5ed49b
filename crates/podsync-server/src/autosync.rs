//! Auto-sync loop: starts scheduled jobs on the configured cadence.
//!
//! A single background task polls the persisted settings once a minute.
//! When auto-sync is enabled, no job is active, and the configured
//! interval has elapsed since the last session started, it starts one.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use podsync_core::{JobOptions, SessionStore, SettingsStore, TracingReporter};

use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Runs until the shutdown token fires.
pub async fn run_auto_sync_loop(state: AppState, shutdown: CancellationToken) {
    tracing::info!("Auto-sync loop started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }

        if let Err(e) = tick(&state).await {
            tracing::warn!(error = %e, "Auto-sync tick failed");
        }
    }

    tracing::info!("Auto-sync loop stopped");
}

async fn tick(state: &AppState) -> Result<(), podsync_core::AppError> {
    let settings = state.settings.get_settings().await?;
    if !settings.enabled {
        return Ok(());
    }

    if state.controller.state().is_active() {
        tracing::debug!("Auto-sync due but a job is already active, skipping");
        return Ok(());
    }

    let due = match state.sessions.latest_session().await? {
        Some(last) => {
            let elapsed = Utc::now() - last.started_at;
            elapsed.num_minutes() >= settings.interval_minutes as i64
        }
        None => true,
    };
    if !due {
        return Ok(());
    }

    let options = JobOptions::new(settings.to_sync_config(), settings.mode);
    match state.controller.start(options, TracingReporter).await {
        Ok(session_id) => {
            tracing::info!(%session_id, "Auto-sync started scheduled job");
        }
        Err(e) => {
            // Lost a race with a manual start; the skip is the right move.
            tracing::info!(error = %e, "Auto-sync start skipped");
        }
    }

    Ok(())
}
