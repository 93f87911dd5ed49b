//! Reconciliation engine tests: diffing, ordinals, slugs, error isolation.

use chrono::NaiveDate;

use podsync_core::models::EngagementCounters;
use podsync_core::reconcile::ReconcileEngine;
use podsync_core::traits::{CatalogStore, RemoteEpisode};

use crate::integration::common::{MockCatalog, MockClient, counters, publish_time, remote_episode};

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

#[tokio::test]
async fn test_new_episodes_sorted_and_numbered_by_publish_time() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");

    // Seed the listing out of publish order; ordinals must follow publish
    // time, not listing order.
    client.seed_items(
        "coll-a",
        vec![
            (remote_episode("coll-a", 2), counters(300)),
            (remote_episode("coll-a", 0), counters(100)),
            (remote_episode("coll-a", 1), counters(200)),
        ],
    );

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert_eq!(plan.inserts.len(), 3);
    assert!(plan.updates.is_empty());
    assert_eq!(plan.unchanged, 0);

    let numbers: Vec<_> = plan.inserts.iter().map(|e| e.episode_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let ids: Vec<_> = plan.inserts.iter().map(|e| e.external_id.as_str()).collect();
    assert_eq!(ids, vec!["coll-a-ep0000", "coll-a-ep0001", "coll-a-ep0002"]);
}

#[tokio::test]
async fn test_ordinals_continue_from_stored_maximum() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");

    client.seed_collection("coll-a", 2);
    let engine = ReconcileEngine::new(catalog.clone(), client.clone());
    let plan = engine.plan(&podcast, today()).await.unwrap();
    for insert in &plan.inserts {
        catalog.insert_episode(insert).await.unwrap();
    }

    // Two more episodes appear upstream.
    client.seed_collection("coll-a", 4);
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert_eq!(plan.inserts.len(), 2);
    let numbers: Vec<_> = plan.inserts.iter().map(|e| e.episode_number).collect();
    assert_eq!(numbers, vec![3, 4]);
    // Existing ordinals are never re-derived.
    assert_eq!(plan.unchanged, 2);
}

#[tokio::test]
async fn test_second_plan_is_idempotent() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 10);

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let plan = engine.plan(&podcast, today()).await.unwrap();
    for insert in &plan.inserts {
        catalog.insert_episode(insert).await.unwrap();
    }

    let second = engine.plan(&podcast, today()).await.unwrap();
    assert!(second.inserts.is_empty());
    assert!(second.updates.is_empty());
    assert_eq!(second.unchanged, 10);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn test_counter_change_produces_update_only() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 3);

    let engine = ReconcileEngine::new(catalog.clone(), client.clone());
    let plan = engine.plan(&podcast, today()).await.unwrap();
    for insert in &plan.inserts {
        catalog.insert_episode(insert).await.unwrap();
    }

    // One episode gained views upstream.
    client.set_stats("coll-a-ep0001", counters(9999));
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert!(plan.inserts.is_empty());
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].external_id, "coll-a-ep0001");
    assert_eq!(plan.updates[0].counters.views, 9999);
    assert_eq!(plan.unchanged, 2);
}

#[tokio::test]
async fn test_shared_title_gets_suffixed_slug() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");

    client.seed_items(
        "coll-a",
        vec![
            (
                RemoteEpisode {
                    external_id: "vid-1".into(),
                    title: "The Interview".into(),
                    published_at: publish_time(0),
                },
                counters(10),
            ),
            (
                RemoteEpisode {
                    external_id: "vid-2".into(),
                    title: "The Interview".into(),
                    published_at: publish_time(1),
                },
                counters(20),
            ),
        ],
    );

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let plan = engine.plan(&podcast, today()).await.unwrap();

    let slugs: Vec<_> = plan.inserts.iter().map(|e| e.slug.as_str()).collect();
    assert_eq!(slugs, vec!["the-interview", "the-interview-1"]);
}

#[tokio::test]
async fn test_slug_probe_skips_stored_slugs() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let first = catalog.add_podcast("coll-a", "Show A");
    let second = catalog.add_podcast("coll-b", "Show B");

    client.seed_items(
        "coll-a",
        vec![(
            RemoteEpisode {
                external_id: "a-1".into(),
                title: "The Interview".into(),
                published_at: publish_time(0),
            },
            counters(10),
        )],
    );
    client.seed_items(
        "coll-b",
        vec![(
            RemoteEpisode {
                external_id: "b-1".into(),
                title: "The Interview".into(),
                published_at: publish_time(0),
            },
            counters(10),
        )],
    );

    let engine = ReconcileEngine::new(catalog.clone(), client);

    let plan = engine.plan(&first, today()).await.unwrap();
    for insert in &plan.inserts {
        catalog.insert_episode(insert).await.unwrap();
    }

    // Episode slugs are unique across podcasts; the second show's episode
    // probes past the stored slug.
    let plan = engine.plan(&second, today()).await.unwrap();
    assert_eq!(plan.inserts[0].slug, "the-interview-1");
}

#[tokio::test]
async fn test_missing_stats_recorded_not_fatal() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 5);
    client.remove_stats("coll-a-ep0002");

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert_eq!(plan.inserts.len(), 4);
    assert_eq!(plan.errors.len(), 1);
    assert_eq!(plan.errors[0].external_id.as_deref(), Some("coll-a-ep0002"));
    assert!(
        !plan
            .inserts
            .iter()
            .any(|e| e.external_id == "coll-a-ep0002")
    );
}

#[tokio::test]
async fn test_pagination_is_followed_to_exhaustion() {
    let catalog = MockCatalog::new();
    let client = MockClient::new().with_page_size(10);
    let podcast = catalog.add_podcast("coll-a", "Morning Show");
    client.seed_collection("coll-a", 35);

    let engine = ReconcileEngine::new(catalog.clone(), client.clone());
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert_eq!(plan.inserts.len(), 35);
    assert_eq!(client.list_calls(), 4); // 10 + 10 + 10 + 5
}

#[tokio::test]
async fn test_snapshot_carries_rolled_up_counters() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let podcast = catalog.add_podcast("coll-a", "Morning Show");
    client.seed_items(
        "coll-a",
        vec![
            (remote_episode("coll-a", 0), counters(100)),
            (remote_episode("coll-a", 1), counters(200)),
        ],
    );

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let plan = engine.plan(&podcast, today()).await.unwrap();

    assert_eq!(plan.snapshot.snapshot_date, today());
    assert_eq!(plan.snapshot.counters.views, 300);
    assert_eq!(plan.snapshot.episode_count, 2);
    assert_eq!(plan.podcast_counters.views, 300);
    assert_eq!(plan.episode_count, 2);
}

#[tokio::test]
async fn test_gains_flagged_approximate_without_history() {
    let catalog = MockCatalog::new();
    let client = MockClient::new();
    let mut podcast = catalog.add_podcast("coll-a", "Morning Show");
    podcast.counters = EngagementCounters {
        views: 5000,
        ..Default::default()
    };

    let engine = ReconcileEngine::new(catalog.clone(), client);
    let gains = engine.gains(&podcast, today()).await.unwrap();

    // No snapshots at all: every window falls back to the lifetime total.
    assert!(gains.approximate);
    assert_eq!(gains.monthly, 5000);
}
