//! Scheduler tests: chunking, checkpoints, pause/resume/stop, failure
//! isolation, and fatal credential exhaustion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use podsync_core::job::{JobControls, JobOptions, JobState, SyncSession};
use podsync_core::models::TriggerType;
use podsync_core::progress::{ProgressEvent, ProgressReporter};
use podsync_core::scheduler::SyncScheduler;
use podsync_core::SyncConfig;
use podsync_core::traits::{CatalogStore, SessionStore};

use crate::integration::common::{MockCatalog, MockClient, MockSessions, RecordingReporter};

type TestScheduler = SyncScheduler<MockCatalog, MockClient, MockSessions>;

struct Harness {
    catalog: MockCatalog,
    client: MockClient,
    sessions: MockSessions,
    scheduler: TestScheduler,
}

fn harness() -> Harness {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let sessions = MockSessions::new();
    let scheduler = SyncScheduler::new(catalog.clone(), client.clone(), sessions.clone());
    Harness {
        catalog,
        client,
        sessions,
        scheduler,
    }
}

fn options(chunk_size: usize, workers: usize) -> JobOptions {
    JobOptions::new(
        SyncConfig::default()
            .with_chunk_size(chunk_size)
            .with_max_concurrent_items(workers),
        TriggerType::Manual,
    )
}

async fn new_session(sessions: &MockSessions) -> SyncSession {
    sessions.create_session(TriggerType::Manual).await.unwrap()
}

/// 3 podcasts x 250 episodes at chunk size 100: 3 chunks per podcast
/// (100/100/50), checkpoint lands at 3, 750 episodes in the final stats.
#[tokio::test]
async fn test_three_podcasts_chunked_at_100() {
    let h = harness();
    for i in 0..3 {
        let collection = format!("coll-{i}");
        h.catalog.add_podcast(&collection, &format!("Show {i}"));
        h.client.seed_collection(&collection, 250);
    }

    let session = new_session(&h.sessions).await;
    let reporter = RecordingReporter::new();
    let controls = JobControls::new();

    let outcome = h
        .scheduler
        .run(&session, &options(100, 2), &controls, &reporter)
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.podcasts_processed, 3);
    assert_eq!(outcome.stats.podcasts_failed, 0);
    assert_eq!(outcome.stats.episodes_created, 750);
    assert_eq!(outcome.stats.episodes_total(), 750);
    assert_eq!(outcome.checkpoint, 3);

    // Every podcast produced exactly chunks of 100/100/50.
    for i in 0..3 {
        let title = format!("Show {i}");
        let mut sizes: Vec<usize> = reporter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::ChunkCompleted {
                    podcast,
                    episodes_in_chunk,
                    chunk_count,
                    ..
                } if podcast == title => {
                    assert_eq!(chunk_count, 3);
                    Some(episodes_in_chunk)
                }
                _ => None,
            })
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 100, 100]);
    }

    let row = h.sessions.session(session.id).unwrap();
    assert_eq!(row.status, JobState::Completed);
    assert_eq!(row.checkpoint, 3);
    assert_eq!(row.stats.episodes_created, 750);
    assert_eq!(h.catalog.episode_count(), 750);
    assert_eq!(h.catalog.snapshot_count(), 3);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 120);

    let first = new_session(&h.sessions).await;
    h.scheduler
        .run(&first, &options(50, 1), &JobControls::new(), &RecordingReporter::new())
        .await;
    let inserts_after_first = h.catalog.insert_calls();

    let second = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&second, &options(50, 1), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.episodes_created, 0);
    assert_eq!(outcome.stats.episodes_updated, 0);
    assert_eq!(outcome.stats.episodes_unchanged, 120);
    // No write traffic at all on the second pass.
    assert_eq!(h.catalog.insert_calls(), inserts_after_first);
    assert_eq!(h.catalog.update_calls(), 0);
}

#[tokio::test]
async fn test_same_day_snapshots_upsert_not_duplicate() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 10);

    for _ in 0..2 {
        let session = new_session(&h.sessions).await;
        h.scheduler
            .run(&session, &options(100, 1), &JobControls::new(), &RecordingReporter::new())
            .await;
    }

    // Two runs on the same day keep a single (podcast, date) row.
    assert_eq!(h.catalog.snapshot_count(), 1);
}

/// Reporter that requests a cooperative stop after N completed podcasts.
#[derive(Clone)]
struct StopAfterReporter {
    controls: JobControls,
    after: usize,
    seen: Arc<AtomicUsize>,
    inner: RecordingReporter,
}

impl ProgressReporter for StopAfterReporter {
    fn report(&self, event: ProgressEvent) {
        if matches!(event, ProgressEvent::PodcastCompleted { .. })
            && self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after
        {
            self.controls.request_stop();
        }
        self.inner.report(event);
    }
}

#[tokio::test]
async fn test_stop_freezes_partial_counts_and_resume_continues() {
    let h = harness();
    for i in 0..3 {
        let collection = format!("coll-{i}");
        h.catalog.add_podcast(&collection, &format!("Show {i}"));
        h.client.seed_collection(&collection, 40);
    }

    // Sequential processing so "stop after the first podcast" is exact.
    let controls = JobControls::new();
    let reporter = StopAfterReporter {
        controls: controls.clone(),
        after: 1,
        seen: Arc::new(AtomicUsize::new(0)),
        inner: RecordingReporter::new(),
    };

    let session = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&session, &options(100, 1), &controls, &reporter)
        .await;

    assert_eq!(outcome.final_state, JobState::Stopped);
    assert_eq!(outcome.stats.podcasts_processed, 1);
    assert_eq!(outcome.stats.episodes_created, 40);
    assert_eq!(outcome.checkpoint, 1);

    let row = h.sessions.session(session.id).unwrap();
    assert_eq!(row.status, JobState::Stopped);
    assert_eq!(row.checkpoint, 1);

    // Resume from the checkpoint: the committed podcast is not repeated,
    // the remaining two are not skipped.
    let mut resumed = new_session(&h.sessions).await;
    resumed.checkpoint = row.checkpoint;
    let outcome = h
        .scheduler
        .run(&resumed, &options(100, 1), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.podcasts_processed, 2);
    assert_eq!(outcome.checkpoint, 3);
    assert_eq!(h.catalog.episode_count(), 120);

    // Each podcast rolled up exactly once across both runs.
    for index in 0..3i64 {
        let p = h
            .catalog
            .list_podcasts_page(index, 1)
            .await
            .unwrap()
            .remove(0);
        assert_eq!(h.catalog.rollup_calls(p.id), 1, "podcast {index}");
    }
}

#[tokio::test]
async fn test_pause_parks_and_resume_continues() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 20);

    let controls = JobControls::new();
    controls.pause();

    let session = new_session(&h.sessions).await;
    let session_id = session.id;
    let reporter = RecordingReporter::new();

    let run = {
        let scheduler =
            SyncScheduler::new(h.catalog.clone(), h.client.clone(), h.sessions.clone());
        let controls = controls.clone();
        let reporter = reporter.clone();
        let opts = options(100, 1);
        tokio::spawn(async move { scheduler.run(&session, &opts, &controls, &reporter).await })
    };

    // The scheduler parks at its first gate and persists the paused state.
    let mut parked = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if h.sessions.session(session_id).unwrap().status == JobState::Paused {
            parked = true;
            break;
        }
    }
    assert!(parked, "scheduler never acknowledged the pause");
    assert_eq!(h.catalog.episode_count(), 0, "no writes while paused");

    controls.resume();
    let outcome = run.await.unwrap();

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(h.catalog.episode_count(), 20);

    let events = reporter.events();
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::JobPaused)));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::JobResumed)));
}

#[tokio::test]
async fn test_credential_exhaustion_is_fatal() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 10);
    h.client.exhaust_credentials();

    let session = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&session, &options(100, 1), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Failed);
    let error = outcome.error.expect("fatal run must carry an error");
    assert!(error.contains("Credential pool exhausted"), "{error}");

    let row = h.sessions.session(session.id).unwrap();
    assert_eq!(row.status, JobState::Failed);
    assert!(row.error_message.is_some());
}

#[tokio::test]
async fn test_listing_failure_does_not_abort_siblings() {
    let h = harness();
    for i in 0..3 {
        let collection = format!("coll-{i}");
        h.catalog.add_podcast(&collection, &format!("Show {i}"));
        h.client.seed_collection(&collection, 10);
    }
    h.client.fail_collection("coll-1");

    let session = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&session, &options(100, 2), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.podcasts_processed, 3);
    assert_eq!(outcome.stats.podcasts_failed, 1);
    assert_eq!(outcome.stats.episodes_created, 20);
    assert_eq!(outcome.checkpoint, 3);

    // The failure landed in the audit log.
    let logs = h.sessions.logs();
    assert!(
        logs.iter().any(|l| l.message.contains("Show 1")),
        "expected a log entry for the failed podcast"
    );
}

#[tokio::test]
async fn test_single_write_failure_is_item_scoped() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 30);
    h.catalog.fail_insert_for("coll-a-ep0007");

    let session = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&session, &options(10, 1), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.episodes_created, 29);
    assert_eq!(outcome.stats.episodes_failed, 1);
    assert_eq!(outcome.stats.podcasts_failed, 0);
    assert_eq!(h.catalog.episode_count(), 29);
}

#[tokio::test]
async fn test_missing_stats_counted_as_failed_episode() {
    let h = harness();
    h.catalog.add_podcast("coll-a", "Morning Show");
    h.client.seed_collection("coll-a", 10);
    h.client.remove_stats("coll-a-ep0004");

    let session = new_session(&h.sessions).await;
    let outcome = h
        .scheduler
        .run(&session, &options(100, 1), &JobControls::new(), &RecordingReporter::new())
        .await;

    assert_eq!(outcome.final_state, JobState::Completed);
    assert_eq!(outcome.stats.episodes_created, 9);
    assert_eq!(outcome.stats.episodes_failed, 1);

    let logs = h.sessions.logs();
    assert!(logs.iter().any(|l| l.message.contains("coll-a-ep0004")));
}
