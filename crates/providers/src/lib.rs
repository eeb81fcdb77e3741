//! Upstream collaborators: the media manager that owns the library and the
//! watch-history tracker. Wire formats stay inside the concrete clients; the
//! rest of the workspace only sees the neutral records defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod radarr;
pub mod tautulli;

/// Every upstream call carries this timeout unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::RequestFailed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaManagerPing {
    pub success: bool,
    pub has_recycle_bin: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchHistoryPing {
    pub success: bool,
}

/// A library entry as reported by the media manager, with ratings already on
/// the 0-100 integer scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMovie {
    pub id: i64,
    pub title: String,
    pub alternative_titles: Vec<String>,
    pub tmdb_id: i64,
    pub poster: Option<String>,
    /// Set only when the movie has a downloaded file.
    pub downloaded_at: Option<DateTime<Utc>>,
    pub imdb_rating: Option<i64>,
    pub tmdb_rating: Option<i64>,
    pub metacritic_rating: Option<i64>,
    pub rotten_tomatoes_rating: Option<i64>,
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportListMovie {
    pub tmdb_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamTag {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaManagementConfig {
    pub recycle_bin_enabled: bool,
}

/// Watch status of one title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchStatus {
    pub watched: bool,
    pub last_watched_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait MediaManager: Send + Sync {
    /// Never fails: an unreachable service reports `success: false`.
    async fn ping(&self) -> MediaManagerPing;
    async fn list_movies(&self) -> Result<Vec<UpstreamMovie>, ProviderError>;
    async fn list_import_list_movies(&self) -> Result<Vec<ImportListMovie>, ProviderError>;
    async fn list_tags(&self) -> Result<Vec<UpstreamTag>, ProviderError>;
    /// Removes the entry and its file and excludes it from future list imports.
    /// Deleting an id the media manager no longer knows succeeds.
    async fn delete_movie(&self, id: i64) -> Result<(), ProviderError>;
    async fn media_management_config(&self) -> Result<MediaManagementConfig, ProviderError>;
}

#[async_trait::async_trait]
pub trait WatchHistory: Send + Sync {
    /// Never fails: an unreachable service reports `success: false`.
    async fn ping(&self) -> WatchHistoryPing;
    /// `None` when no library entry carries exactly this title.
    async fn search_by_title(&self, title: &str) -> Result<Option<WatchStatus>, ProviderError>;
}

/// Shared client construction: every request is bounded by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::RequestFailed(e.to_string()))
}

pub(crate) async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status { status, body })
}
