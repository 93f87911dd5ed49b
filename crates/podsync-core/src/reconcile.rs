//! Reconciliation: diff external source-of-truth state against the store
//! and produce the write set for one podcast.
//!
//! The engine is read-only against the catalog: [`ReconcileEngine::plan`]
//! fetches and diffs, the worker pool applies the resulting writes in
//! chunks. A single episode's failure is captured as an [`ItemError`] and
//! never aborts its siblings; running the same plan twice against unchanged
//! external data produces zero inserts and no-op updates.

use std::collections::HashSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    DailySnapshot, EngagementCounters, EpisodeCounterUpdate, NewEpisode, Podcast, slugify,
};
use crate::sync::{PeriodGains, period_gains};
use crate::traits::{CatalogStore, MediaClient, RemoteEpisode};

/// Bounded attempts for the slug suffix probe.
const SLUG_PROBE_LIMIT: u32 = 50;

/// Hard cap on listing pages per collection, against pathological or
/// looping continuation tokens.
const MAX_LIST_PAGES: usize = 400;

/// A failure scoped to one episode, recorded instead of propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    /// External id of the episode, when known.
    pub external_id: Option<String>,
    pub message: String,
}

impl ItemError {
    pub fn new(external_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            external_id,
            message: message.into(),
        }
    }
}

/// One persisted write produced by a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeWrite {
    Insert(NewEpisode),
    Update(EpisodeCounterUpdate),
}

/// The full reconciliation result for one podcast: the write set, the
/// rolled-up podcast counters, today's snapshot, and per-item errors.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub podcast_id: Uuid,
    pub inserts: Vec<NewEpisode>,
    pub updates: Vec<EpisodeCounterUpdate>,
    /// Episodes whose stored counters already match the remote snapshot.
    pub unchanged: usize,
    pub podcast_counters: EngagementCounters,
    pub episode_count: i32,
    pub snapshot: DailySnapshot,
    pub errors: Vec<ItemError>,
}

impl ReconcilePlan {
    /// Interleaves inserts (first, in ordinal order) and updates into one
    /// write sequence for chunking.
    pub fn into_writes(self) -> (Vec<EpisodeWrite>, Vec<ItemError>) {
        let mut writes = Vec::with_capacity(self.inserts.len() + self.updates.len());
        writes.extend(self.inserts.into_iter().map(EpisodeWrite::Insert));
        writes.extend(self.updates.into_iter().map(EpisodeWrite::Update));
        (writes, self.errors)
    }
}

/// Splits a write sequence into bounded chunks.
pub fn chunk_writes(writes: Vec<EpisodeWrite>, chunk_size: usize) -> Vec<Vec<EpisodeWrite>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(writes.len().div_ceil(chunk_size));
    let mut iter = writes.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Produces reconciliation plans for podcasts.
///
/// Generic over the catalog store and the external API client so tests can
/// run fully in memory.
#[derive(Clone)]
pub struct ReconcileEngine<S, C>
where
    S: CatalogStore,
    C: MediaClient,
{
    store: S,
    client: C,
}

impl<S, C> ReconcileEngine<S, C>
where
    S: CatalogStore,
    C: MediaClient,
{
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Builds the reconciliation plan for one podcast.
    ///
    /// Steps: fetch all remote episodes (paged), fetch their current
    /// counters (batched), diff against the stored episode set, assign
    /// ordinals and unique slugs to the insert candidates, roll the
    /// counters up, and key today's snapshot.
    pub async fn plan(&self, podcast: &Podcast, today: NaiveDate) -> Result<ReconcilePlan, AppError> {
        let mut errors = Vec::new();

        let remote = self.fetch_all_remote(&podcast.collection_id).await?;
        let remote_ids: Vec<String> = remote.iter().map(|r| r.external_id.clone()).collect();

        let stats = self.client.fetch_stats(&remote_ids).await?;
        let known = self.store.episode_counters(podcast.id).await?;

        // Split remote items into insert candidates and existing episodes.
        let mut candidates: Vec<&RemoteEpisode> = Vec::new();
        let mut updates = Vec::new();
        let mut unchanged = 0usize;
        let mut podcast_counters = EngagementCounters::default();

        for item in &remote {
            let counters = match stats.get(&item.external_id) {
                Some(c) => *c,
                None => {
                    errors.push(ItemError::new(
                        Some(item.external_id.clone()),
                        "no statistics returned for item",
                    ));
                    continue;
                }
            };

            podcast_counters = podcast_counters.add(&counters);

            match known.get(&item.external_id) {
                None => candidates.push(item),
                Some(stored) if *stored == counters => unchanged += 1,
                Some(_) => updates.push(EpisodeCounterUpdate {
                    external_id: item.external_id.clone(),
                    counters,
                }),
            }
        }

        // Ordinals follow publish order within the candidate set computed
        // at diff time; existing episodes keep theirs forever.
        candidates.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        let mut next_number = self.store.max_episode_number(podcast.id).await? + 1;
        let mut inserts = Vec::with_capacity(candidates.len());
        let mut slugs_in_plan: HashSet<String> = HashSet::new();

        for item in candidates {
            let slug = match self.unique_slug(&item.title, &mut slugs_in_plan).await {
                Ok(slug) => slug,
                Err(e) if e.is_item_scoped() => {
                    errors.push(ItemError::new(Some(item.external_id.clone()), e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Candidates were filtered to ids present in `stats`.
            let counters = stats[&item.external_id];

            inserts.push(NewEpisode {
                podcast_id: podcast.id,
                external_id: item.external_id.clone(),
                title: item.title.clone(),
                slug,
                episode_number: next_number,
                published_at: item.published_at,
                counters,
            });
            next_number += 1;
        }

        let episode_count = (known.len() + inserts.len()) as i32;

        Ok(ReconcilePlan {
            podcast_id: podcast.id,
            snapshot: DailySnapshot {
                podcast_id: podcast.id,
                snapshot_date: today,
                counters: podcast_counters,
                episode_count,
            },
            inserts,
            updates,
            unchanged,
            podcast_counters,
            episode_count,
            errors,
        })
    }

    /// Period-over-period view gains for a podcast, derived from its daily
    /// snapshots. The `approximate` flag survives to the status surface.
    pub async fn gains(&self, podcast: &Podcast, today: NaiveDate) -> Result<PeriodGains, AppError> {
        let history = self.store.snapshots_for_podcast(podcast.id).await?;
        Ok(period_gains(podcast.counters.views, today, &history))
    }

    /// Follows continuation tokens until the listing is exhausted or the
    /// page cap is reached, deduplicating by external id.
    ///
    /// An empty page that still carries a continuation token is treated as
    /// transient: retried once, then accepted as the end of the listing.
    async fn fetch_all_remote(&self, collection_id: &str) -> Result<Vec<RemoteEpisode>, AppError> {
        let mut items = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut retried_empty = false;

        for _ in 0..MAX_LIST_PAGES {
            let page = self
                .client
                .list_collection_page(collection_id, page_token.as_deref())
                .await?;

            if page.items.is_empty() && page.next_page_token.is_some() {
                if retried_empty {
                    tracing::warn!(
                        collection = collection_id,
                        "Empty page with continuation token twice, treating listing as complete"
                    );
                    break;
                }
                retried_empty = true;
                continue; // same token, one retry
            }
            retried_empty = false;

            for item in page.items {
                if seen.insert(item.external_id.clone()) {
                    items.push(item);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(items),
            }
        }

        tracing::warn!(
            collection = collection_id,
            pages = MAX_LIST_PAGES,
            "Listing page cap reached, truncating"
        );
        Ok(items)
    }

    /// Probes `slug`, `slug-1`, `slug-2`, … until an unused value is found.
    /// Each probe is a single existence check; the bound turns a
    /// pathological collision cluster into an item-scoped error.
    async fn unique_slug(
        &self,
        title: &str,
        taken_in_plan: &mut HashSet<String>,
    ) -> Result<String, AppError> {
        let base = slugify(title);

        for attempt in 0..SLUG_PROBE_LIMIT {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };

            if taken_in_plan.contains(&candidate) {
                continue;
            }
            if !self.store.episode_slug_exists(&candidate).await? {
                taken_in_plan.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        Err(AppError::SlugExhausted(base))
    }
}
