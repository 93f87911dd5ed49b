//! Data API client: playlist listing and batched video statistics.
//!
//! Every outbound call acquires a credential from the pool, attaches it as
//! the `key` query parameter, and reserves the call's unit cost. A quota or
//! auth rejection escalates to the pool (mark exhausted/invalid) and the
//! call retries exactly once on a different credential before failing.
//! Transient network/5xx failures retry in place with exponential backoff.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use url::Url;

use podsync_core::error::{ApiErrorDetails, ApiErrorKind, AppError};
use podsync_core::models::EngagementCounters;
use podsync_core::traits::{CollectionPage, MediaClient, RemoteEpisode};
use podsync_core::{CredentialPool, HttpConfig};

/// Hard API limit on ids per statistics call and rows per listing page.
const MAX_BATCH_IDS: usize = 50;

/// Unit cost of a single list or stats call against the daily quota.
const CALL_UNITS: i64 = 1;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

// =============================================================================
// Wire DTOs
//
// The API is loosely typed: counters arrive as decimal strings, most fields
// are optional. Everything is validated here at the boundary; rows that
// cannot be made sense of are dropped and counted, never passed inward.
// =============================================================================

#[derive(Deserialize, Debug)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PlaylistItem {
    snippet: Option<PlaylistItemSnippet>,
    #[serde(rename = "contentDetails")]
    content_details: Option<PlaylistItemContentDetails>,
}

#[derive(Deserialize, Debug)]
struct PlaylistItemSnippet {
    title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PlaylistItemContentDetails {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
    #[serde(rename = "videoPublishedAt")]
    video_published_at: Option<String>,
}

#[derive(Deserialize, Debug)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize, Debug)]
struct VideoItem {
    id: String,
    statistics: Option<VideoStatistics>,
    #[serde(rename = "contentDetails")]
    content_details: Option<VideoContentDetails>,
}

#[derive(Deserialize, Debug, Default)]
struct VideoStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
    #[serde(rename = "commentCount")]
    comment_count: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct VideoContentDetails {
    duration: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorItem {
    reason: Option<String>,
}

// =============================================================================
// Boundary parsing helpers
// =============================================================================

/// Counters arrive as decimal strings; anything unparseable counts as 0.
fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.parse::<i64>().ok()).map_or(0, |n| n.max(0))
}

/// Parses an ISO-8601 duration of the `PT#H#M#S` family into seconds.
/// Returns 0 for shapes the API never produces for playable media.
fn parse_iso8601_duration(raw: &str) -> i64 {
    let Some(rest) = raw.strip_prefix("PT").or_else(|| raw.strip_prefix("P")) else {
        return 0;
    };

    let mut seconds = 0i64;
    let mut number = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: i64 = number.parse().unwrap_or(0);
        number.clear();
        match c {
            'D' => seconds += value * 86_400,
            'H' => seconds += value * 3_600,
            'M' => seconds += value * 60,
            'S' => seconds += value,
            'T' => {}
            _ => return 0,
        }
    }
    seconds
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Maps an HTTP failure status plus its error body onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ApiErrorKind {
    let reason = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.errors.into_iter().find_map(|i| i.reason))
        .unwrap_or_default();

    match (status.as_u16(), reason.as_str()) {
        (_, "quotaExceeded" | "dailyLimitExceeded" | "rateLimitExceeded" | "userRateLimitExceeded") => {
            ApiErrorKind::QuotaExceeded
        }
        (429, _) => ApiErrorKind::QuotaExceeded,
        (_, "keyInvalid" | "keyExpired" | "accessNotConfigured") => ApiErrorKind::InvalidCredential,
        (400 | 401, _) => ApiErrorKind::InvalidCredential,
        (403, _) => ApiErrorKind::InvalidCredential,
        (s, _) if s >= 500 => ApiErrorKind::ServerError,
        _ => ApiErrorKind::Unknown,
    }
}

/// Splits an id set into API-sized batches, preserving order.
fn batch_ids(ids: &[String]) -> Vec<&[String]> {
    ids.chunks(MAX_BATCH_IDS).collect()
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the platform Data API.
#[derive(Clone)]
pub struct TubeClient {
    http: Client,
    base_url: Url,
    pool: CredentialPool,
    max_retries: u32,
    retry_base_delay: Duration,
    timeout_secs: u64,
}

impl TubeClient {
    /// Creates a client against the public API endpoint.
    pub fn new(pool: CredentialPool) -> Result<Self, AppError> {
        Self::with_base_url(pool, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint (tests, proxies).
    pub fn with_base_url(pool: CredentialPool, base_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("invalid API base url: {e}")))?;

        let http_config = HttpConfig::default();
        let http = Client::builder()
            .user_agent(concat!("podsync/", env!("CARGO_PKG_VERSION")))
            .timeout(http_config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            pool,
            max_retries: http_config.max_retries,
            retry_base_delay: http_config.retry_base_delay,
            timeout_secs: http_config.timeout.as_secs(),
        })
    }

    /// Performs one authenticated GET with transient retries and a single
    /// credential failover.
    ///
    /// Units are reserved at acquire time and committed only after a
    /// successful response; a call that never reached the API releases its
    /// reservation.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, AppError> {
        let mut rotations = 0u32;

        loop {
            let lease = self.pool.acquire(CALL_UNITS)?;

            let mut url = self
                .base_url
                .join(path)
                .map_err(|e| AppError::Generic(e.to_string()))?;
            {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in params {
                    pairs.append_pair(name, value);
                }
                pairs.append_pair("key", &lease.api_key);
            }

            let mut last_error = AppError::Generic("no attempts made".to_string());
            for attempt in 1..=self.max_retries {
                match self.http.get(url.clone()).send().await {
                    Ok(resp) => {
                        let status = resp.status();

                        if status.is_success() {
                            let parsed = resp.json::<T>().await.map_err(|e| {
                                AppError::MalformedResponse(format!(
                                    "undecodable {path} response: {e}"
                                ))
                            });
                            match parsed {
                                Ok(value) => {
                                    self.pool.commit(&lease);
                                    return Ok(value);
                                }
                                Err(e) => {
                                    // The API answered; quota was spent on
                                    // a response we cannot use.
                                    self.pool.commit(&lease);
                                    return Err(e);
                                }
                            }
                        }

                        let body = resp.text().await.unwrap_or_default();
                        let kind = classify_failure(status, &body);

                        match kind {
                            ApiErrorKind::QuotaExceeded | ApiErrorKind::InvalidCredential => {
                                self.pool.release(&lease);
                                if kind == ApiErrorKind::QuotaExceeded {
                                    self.pool.mark_exhausted(&lease.credential_id);
                                } else {
                                    self.pool.mark_invalid(&lease.credential_id);
                                }

                                if rotations == 0 {
                                    tracing::warn!(
                                        credential = %lease.credential_id,
                                        status = status.as_u16(),
                                        "Credential rejected, retrying on another key"
                                    );
                                    rotations += 1;
                                    break; // out of the attempt loop, re-acquire
                                }
                                return Err(AppError::ApiError(ApiErrorDetails::new(
                                    kind,
                                    body,
                                    status.as_u16(),
                                )));
                            }
                            ApiErrorKind::ServerError => {
                                last_error = AppError::ApiError(ApiErrorDetails::new(
                                    kind,
                                    format!("HTTP {}", status.as_u16()),
                                    status.as_u16(),
                                ));
                                if attempt < self.max_retries {
                                    sleep(self.backoff(attempt)).await;
                                    continue;
                                }
                            }
                            ApiErrorKind::NetworkError | ApiErrorKind::Unknown => {
                                self.pool.release(&lease);
                                return Err(AppError::ApiError(ApiErrorDetails::new(
                                    kind,
                                    body,
                                    status.as_u16(),
                                )));
                            }
                        }
                    }
                    Err(e) => {
                        last_error = if e.is_timeout() {
                            AppError::Timeout(self.timeout_secs)
                        } else if e.is_connect() {
                            AppError::NetworkError(format!("connection failed: {e}"))
                        } else {
                            AppError::ClientError(e.to_string())
                        };

                        if attempt < self.max_retries {
                            sleep(self.backoff(attempt)).await;
                            continue;
                        }
                    }
                }

                // Retries exhausted on this credential for a transient
                // failure; nothing was consumed.
                self.pool.release(&lease);
                return Err(last_error);
            }

            // Only the rotate-once path breaks here; the outer loop then
            // re-acquires against a different credential. A second
            // rejection returns directly above, so this runs at most once.
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
        exp.min(Duration::from_secs(30))
    }
}

impl MediaClient for TubeClient {
    async fn list_collection_page(
        &self,
        collection_id: &str,
        page_token: Option<&str>,
    ) -> Result<CollectionPage, AppError> {
        let mut params = vec![
            ("part", "snippet,contentDetails".to_string()),
            ("playlistId", collection_id.to_string()),
            ("maxResults", MAX_BATCH_IDS.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp: PlaylistItemsResponse = self.get_json("playlistItems", &params).await?;

        let mut items = Vec::with_capacity(resp.items.len());
        let mut dropped = 0usize;
        for row in resp.items {
            match validate_playlist_row(row) {
                Some(item) => items.push(item),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::debug!(
                collection = collection_id,
                dropped,
                "Dropped listing rows without id or publish time"
            );
        }

        Ok(CollectionPage {
            items,
            next_page_token: resp.next_page_token,
        })
    }

    async fn fetch_stats(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, EngagementCounters>, AppError> {
        let mut stats = HashMap::with_capacity(ids.len());

        for batch in batch_ids(ids) {
            let params = vec![
                ("part", "statistics,contentDetails".to_string()),
                ("id", batch.join(",")),
            ];
            let resp: VideoListResponse = self.get_json("videos", &params).await?;

            for item in resp.items {
                let s = item.statistics.unwrap_or_default();
                let d = item.content_details.unwrap_or_default();
                stats.insert(
                    item.id,
                    EngagementCounters {
                        views: parse_count(s.view_count.as_deref()),
                        likes: parse_count(s.like_count.as_deref()),
                        comments: parse_count(s.comment_count.as_deref()),
                        duration_seconds: d
                            .duration
                            .as_deref()
                            .map(parse_iso8601_duration)
                            .unwrap_or(0),
                    },
                );
            }
        }

        Ok(stats)
    }
}

/// Validates one listing row into a [`RemoteEpisode`]. Rows without a
/// video id or a publish time are unusable (deleted/private media) and are
/// dropped at this boundary.
fn validate_playlist_row(row: PlaylistItem) -> Option<RemoteEpisode> {
    let details = row.content_details?;
    let external_id = details.video_id?;

    let snippet = row.snippet;
    let published_raw = details
        .video_published_at
        .or_else(|| snippet.as_ref().and_then(|s| s.published_at.clone()))?;
    let published_at = parse_timestamp(&published_raw)?;

    let title = snippet
        .and_then(|s| s.title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "(untitled)".to_string());

    Some(RemoteEpisode {
        external_id,
        title,
        published_at,
    })
}
