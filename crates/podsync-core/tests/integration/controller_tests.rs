//! Job controller tests: state machine transitions, concurrent starts,
//! stale-session recovery.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use podsync_core::controller::JobController;
use podsync_core::error::AppError;
use podsync_core::job::{JobOptions, JobState, SyncSession};
use podsync_core::models::TriggerType;
use podsync_core::sync::SyncStats;
use podsync_core::traits::SessionStore;
use podsync_core::SyncConfig;

use crate::integration::common::{MockCatalog, MockClient, MockSessions, RecordingReporter};

type TestController = JobController<MockCatalog, MockClient, MockSessions>;

fn controller(catalog: &MockCatalog, client: &MockClient, sessions: &MockSessions) -> TestController {
    JobController::new(catalog.clone(), client.clone(), sessions.clone())
}

fn quick_options() -> JobOptions {
    JobOptions::new(
        SyncConfig::default().with_max_concurrent_items(1),
        TriggerType::Manual,
    )
}

/// Polls until the controller reaches a terminal state.
async fn wait_terminal(controller: &TestController) -> JobState {
    for _ in 0..200 {
        let state = controller.state();
        if state.is_terminal() || state == JobState::Idle {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("controller never reached a terminal state");
}

#[tokio::test]
async fn test_start_runs_to_completion() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let sessions = MockSessions::new();
    catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 25);

    let controller = controller(&catalog, &client, &sessions);
    let session_id = controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();

    assert_eq!(wait_terminal(&controller).await, JobState::Completed);
    assert_eq!(catalog.episode_count(), 25);

    let row = sessions.session(session_id).unwrap();
    assert_eq!(row.status, JobState::Completed);
    assert_eq!(row.stats.episodes_created, 25);
}

#[tokio::test]
async fn test_second_start_rejected_while_active() {
    let catalog = MockCatalog::new();
    // Slow listing keeps the first job in flight.
    let client = MockClient::new().with_list_delay(Duration::from_millis(100));
    let sessions = MockSessions::new();
    catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 5);

    let controller = controller(&catalog, &client, &sessions);
    controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();

    let err = controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRunning(JobState::Running)));

    assert_eq!(wait_terminal(&controller).await, JobState::Completed);

    // From a terminal state a fresh start is legal again.
    controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();
    wait_terminal(&controller).await;
}

#[tokio::test]
async fn test_invalid_transitions_from_idle_are_rejected() {
    let controller = controller(&MockCatalog::new(), &MockClient::new(), &MockSessions::new());

    assert!(matches!(
        controller.pause(),
        Err(AppError::InvalidTransition {
            requested: "pause",
            current: JobState::Idle,
        })
    ));
    assert!(matches!(
        controller.resume(),
        Err(AppError::InvalidTransition {
            requested: "resume",
            ..
        })
    ));
    assert!(matches!(
        controller.stop(),
        Err(AppError::InvalidTransition {
            requested: "stop",
            ..
        })
    ));
}

#[tokio::test]
async fn test_pause_resume_stop_round_trip() {
    let catalog = MockCatalog::new();
    let client = MockClient::new().with_list_delay(Duration::from_millis(50));
    let sessions = MockSessions::new();
    for i in 0..5 {
        let collection = format!("coll-{i}");
        catalog.add_podcast(&collection, &format!("Show {i}"));
        client.seed_collection(&collection, 5);
    }

    let controller = controller(&catalog, &client, &sessions);
    controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();

    assert_eq!(controller.pause().unwrap(), JobState::Paused);
    // Pausing again is an idempotent no-op echoing the state.
    assert_eq!(controller.pause().unwrap(), JobState::Paused);

    assert_eq!(controller.resume().unwrap(), JobState::Running);
    assert_eq!(controller.stop().unwrap(), JobState::Stopping);

    assert_eq!(wait_terminal(&controller).await, JobState::Stopped);

    // Partial counts are frozen on the session row.
    let row = sessions.list_sessions(1).await.unwrap().remove(0);
    assert_eq!(row.status, JobState::Stopped);
}

#[tokio::test]
async fn test_new_start_resumes_from_stopped_checkpoint() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let sessions = MockSessions::new();
    for i in 0..2 {
        let collection = format!("coll-{i}");
        catalog.add_podcast(&collection, &format!("Show {i}"));
        client.seed_collection(&collection, 5);
    }

    // A previous run stopped after the first podcast.
    let stopped = SyncSession {
        id: Uuid::new_v4(),
        trigger: TriggerType::Manual,
        status: JobState::Stopped,
        started_at: Utc::now(),
        completed_at: Some(Utc::now()),
        heartbeat_at: Utc::now(),
        checkpoint: 1,
        stats: SyncStats::default(),
        error_message: None,
    };
    sessions.inject_session(stopped);

    let controller = controller(&catalog, &client, &sessions);
    let session_id = controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();
    wait_terminal(&controller).await;

    let row = sessions.session(session_id).unwrap();
    assert_eq!(row.status, JobState::Completed);
    // Only the second podcast was processed in the resumed run.
    assert_eq!(row.stats.podcasts_processed, 1);
    assert_eq!(row.checkpoint, 2);
}

#[tokio::test]
async fn test_recover_fences_stale_running_sessions() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let sessions = MockSessions::new();

    let stale = SyncSession {
        id: Uuid::new_v4(),
        trigger: TriggerType::Scheduled,
        status: JobState::Running,
        started_at: Utc::now() - chrono::Duration::hours(2),
        completed_at: None,
        heartbeat_at: Utc::now() - chrono::Duration::hours(1),
        checkpoint: 7,
        stats: SyncStats::default(),
        error_message: None,
    };
    let stale_id = stale.id;
    sessions.inject_session(stale);

    let controller = controller(&catalog, &client, &sessions);
    let fenced = controller.recover(Duration::from_secs(120)).await.unwrap();
    assert_eq!(fenced, 1);

    let row = sessions.session(stale_id).unwrap();
    assert_eq!(row.status, JobState::Failed);
    assert!(row.error_message.unwrap().contains("stale heartbeat"));
}

#[tokio::test]
async fn test_recover_leaves_fresh_sessions_alone() {
    let sessions = MockSessions::new();
    let fresh = SyncSession {
        id: Uuid::new_v4(),
        trigger: TriggerType::Manual,
        status: JobState::Running,
        started_at: Utc::now(),
        completed_at: None,
        heartbeat_at: Utc::now(),
        checkpoint: 0,
        stats: SyncStats::default(),
        error_message: None,
    };
    let fresh_id = fresh.id;
    sessions.inject_session(fresh);

    let controller = controller(&MockCatalog::new(), &MockClient::new(), &sessions);
    let fenced = controller.recover(Duration::from_secs(120)).await.unwrap();
    assert_eq!(fenced, 0);
    assert_eq!(sessions.session(fresh_id).unwrap().status, JobState::Running);
}

#[tokio::test]
async fn test_status_exposes_progress_and_estimate() {
    let catalog = MockCatalog::new();
    let client = MockClient::new().with_list_delay(Duration::from_millis(40));
    let sessions = MockSessions::new();
    for i in 0..4 {
        let collection = format!("coll-{i}");
        catalog.add_podcast(&collection, &format!("Show {i}"));
        client.seed_collection(&collection, 3);
    }

    let controller = controller(&catalog, &client, &sessions);
    controller
        .start(quick_options(), RecordingReporter::new())
        .await
        .unwrap();

    // Wait until at least one podcast completed, then look at the status.
    let mut seen_progress = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = controller.status();
        if status.state.is_active() && status.progress.podcasts_done > 0 {
            assert_eq!(status.progress.total_podcasts, 4);
            assert!(status.session_id.is_some());
            assert!(status.elapsed_seconds.is_some());
            seen_progress = true;
            break;
        }
        if status.state.is_terminal() {
            break;
        }
    }

    let final_state = wait_terminal(&controller).await;
    assert_eq!(final_state, JobState::Completed);
    // Either we observed mid-run progress or the job finished too fast;
    // both are acceptable, but the final stats must be there.
    let status = controller.status();
    assert_eq!(status.progress.stats.episodes_created, 12);
    let _ = seen_progress;
}
