use crate::{
    error_for_status, http_client, ImportListMovie, MediaManagementConfig, MediaManager,
    MediaManagerPing, ProviderError, UpstreamMovie, UpstreamTag,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RadarrConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Radarr v3 API client.
#[derive(Clone)]
pub struct RadarrClient {
    client: Client,
    cfg: Arc<RadarrConfig>,
}

impl RadarrClient {
    pub fn new(cfg: RadarrConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(cfg.timeout)?,
            cfg: Arc::new(cfg),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let resp = self
            .client
            .get(self.url(path))
            .header("X-Api-Key", &self.cfg.api_key)
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl MediaManager for RadarrClient {
    async fn ping(&self) -> MediaManagerPing {
        let status = self
            .client
            .get(self.url("system/status"))
            .header("X-Api-Key", &self.cfg.api_key)
            .send()
            .await;
        match status {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let has_recycle_bin = match self.media_management_config().await {
                    Ok(cfg) => Some(cfg.recycle_bin_enabled),
                    Err(e) => {
                        debug!(error = %e, "could not read radarr media management config");
                        None
                    }
                };
                MediaManagerPing {
                    success: true,
                    has_recycle_bin,
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "radarr ping returned unexpected status");
                MediaManagerPing::default()
            }
            Err(e) => {
                warn!(error = %e, "failed to ping radarr");
                MediaManagerPing::default()
            }
        }
    }

    async fn list_movies(&self) -> Result<Vec<UpstreamMovie>, ProviderError> {
        let movies: Option<Vec<RadarrMovie>> = self.get("movie").await?;
        Ok(movies
            .unwrap_or_default()
            .into_iter()
            .map(UpstreamMovie::from)
            .collect())
    }

    async fn list_import_list_movies(&self) -> Result<Vec<ImportListMovie>, ProviderError> {
        let movies: Option<Vec<RadarrImportListMovie>> = self.get("importlist/movie").await?;
        Ok(movies
            .unwrap_or_default()
            .into_iter()
            .map(|m| ImportListMovie { tmdb_id: m.tmdb_id })
            .collect())
    }

    async fn list_tags(&self) -> Result<Vec<UpstreamTag>, ProviderError> {
        let tags: Option<Vec<RadarrTag>> = self.get("tag").await?;
        Ok(tags
            .unwrap_or_default()
            .into_iter()
            .map(|t| UpstreamTag {
                id: t.id,
                label: t.label,
            })
            .collect())
    }

    async fn delete_movie(&self, id: i64) -> Result<(), ProviderError> {
        let resp = self
            .client
            .delete(self.url(&format!("movie/{id}")))
            .header("X-Api-Key", &self.cfg.api_key)
            .query(&[("deleteFiles", "true"), ("addImportExclusion", "true")])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(movie_id = id, "movie already gone from radarr");
            return Ok(());
        }
        error_for_status(resp).await?;
        Ok(())
    }

    async fn media_management_config(&self) -> Result<MediaManagementConfig, ProviderError> {
        let cfg: RadarrMediaManagement = self.get("config/mediamanagement").await?;
        Ok(cfg.into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RadarrMovie {
    id: i64,
    title: String,
    #[serde(default)]
    alternate_titles: Vec<RadarrAlternateTitle>,
    #[serde(default)]
    tmdb_id: i64,
    #[serde(default)]
    has_file: bool,
    #[serde(default)]
    movie_file: Option<RadarrMovieFile>,
    #[serde(default)]
    images: Vec<RadarrImage>,
    /// Keyed by source (`imdb`, `tmdb`, `metacritic`, `rottenTomatoes`).
    /// Older servers send a flat `{votes, value}` object, which yields no ratings.
    #[serde(default)]
    ratings: HashMap<String, serde_json::Value>,
    #[serde(default)]
    tags: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct RadarrAlternateTitle {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovieFile {
    #[serde(default)]
    date_added: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrImage {
    cover_type: String,
    #[serde(default)]
    remote_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrImportListMovie {
    tmdb_id: i64,
}

#[derive(Debug, Deserialize)]
struct RadarrTag {
    id: i64,
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMediaManagement {
    #[serde(default)]
    recycle_bin: Option<String>,
}

impl From<RadarrMediaManagement> for MediaManagementConfig {
    fn from(m: RadarrMediaManagement) -> Self {
        MediaManagementConfig {
            recycle_bin_enabled: m.recycle_bin.map_or(false, |p| !p.trim().is_empty()),
        }
    }
}

/// Upstream rating scales, normalized to 0-100 integers.
#[derive(Debug, Clone, Copy)]
enum RatingScale {
    OutOfTen,
    OutOfHundred,
}

impl RatingScale {
    /// Zero and missing values mean "not rated".
    fn normalize(self, value: f64) -> Option<i64> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let scaled = match self {
            RatingScale::OutOfTen => value * 10.0,
            RatingScale::OutOfHundred => value,
        };
        Some((scaled.floor() as i64).clamp(0, 100))
    }
}

impl RadarrMovie {
    fn rating(&self, source: &str, scale: RatingScale) -> Option<i64> {
        let value = self.ratings.get(source)?.get("value")?.as_f64()?;
        scale.normalize(value)
    }

    fn poster(&self) -> Option<String> {
        self.images
            .iter()
            .find(|i| i.cover_type == "poster")
            .and_then(|i| i.remote_url.as_deref())
            .map(|url| url.replacen("original", "w500", 1))
    }
}

impl From<RadarrMovie> for UpstreamMovie {
    fn from(m: RadarrMovie) -> Self {
        let downloaded_at = if m.has_file {
            m.movie_file.as_ref().and_then(|f| f.date_added)
        } else {
            None
        };
        UpstreamMovie {
            imdb_rating: m.rating("imdb", RatingScale::OutOfTen),
            tmdb_rating: m.rating("tmdb", RatingScale::OutOfTen),
            metacritic_rating: m.rating("metacritic", RatingScale::OutOfHundred),
            rotten_tomatoes_rating: m.rating("rottenTomatoes", RatingScale::OutOfHundred),
            poster: m.poster(),
            downloaded_at,
            id: m.id,
            title: m.title,
            alternative_titles: m.alternate_titles.into_iter().map(|t| t.title).collect(),
            tmdb_id: m.tmdb_id,
            tag_ids: m.tags,
        }
    }
}
