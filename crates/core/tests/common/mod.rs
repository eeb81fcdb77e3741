#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use providers::{
    ImportListMovie, MediaManagementConfig, MediaManager, MediaManagerPing, ProviderError,
    UpstreamMovie, UpstreamTag, WatchHistory, WatchHistoryPing, WatchStatus,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use storage::models::{Movie, Rule, Tag};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn tag(id: i64, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
    }
}

pub fn movie(id: i64, downloaded_days_ago: i64) -> Movie {
    Movie {
        id,
        title: format!("Movie {id}"),
        alternative_titles: vec![],
        tmdb_id: 1000 + id,
        poster: None,
        watched: false,
        last_watched_at: None,
        ignored: false,
        deleted: false,
        deleted_at: None,
        downloaded_at: days_ago(downloaded_days_ago),
        imdb_rating: None,
        tmdb_rating: None,
        metacritic_rating: None,
        rotten_tomatoes_rating: None,
        appears_in_list: false,
        tags: vec![],
    }
}

pub fn rule(id: i64) -> Rule {
    Rule {
        id,
        name: format!("rule {id}"),
        enabled: true,
        downloaded_days_ago: None,
        watched: None,
        watched_days_ago: None,
        appears_in_list: None,
        minimum_imdb_rating: None,
        minimum_tmdb_rating: None,
        minimum_metacritic_rating: None,
        minimum_rotten_tomatoes_rating: None,
        tags: vec![],
        created_at: days_ago(100) + Duration::seconds(id),
    }
}

pub fn upstream(id: i64, title: &str, downloaded_days_ago: Option<i64>) -> UpstreamMovie {
    UpstreamMovie {
        id,
        title: title.to_string(),
        alternative_titles: vec![],
        tmdb_id: 1000 + id,
        poster: None,
        downloaded_at: downloaded_days_ago.map(days_ago),
        imdb_rating: None,
        tmdb_rating: None,
        metacritic_rating: None,
        rotten_tomatoes_rating: None,
        tag_ids: vec![],
    }
}

#[derive(Default)]
pub struct MediaState {
    pub unreachable: bool,
    pub recycle_bin: bool,
    pub movies: Vec<UpstreamMovie>,
    pub import_list: Vec<i64>,
    pub tags: Vec<UpstreamTag>,
    pub deleted: Vec<i64>,
    pub fail_delete: Option<i64>,
}

/// In-process media manager. Deleting a movie removes it from the listing.
#[derive(Default, Clone)]
pub struct FakeMediaManager {
    pub state: Arc<Mutex<MediaState>>,
}

impl FakeMediaManager {
    pub fn with(f: impl FnOnce(&mut MediaState)) -> Self {
        let fake = Self::default();
        fake.update(f);
        fake
    }

    pub fn update(&self, f: impl FnOnce(&mut MediaState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait::async_trait]
impl MediaManager for FakeMediaManager {
    async fn ping(&self) -> MediaManagerPing {
        let state = self.state.lock().unwrap();
        MediaManagerPing {
            success: !state.unreachable,
            has_recycle_bin: Some(state.recycle_bin),
        }
    }

    async fn list_movies(&self) -> Result<Vec<UpstreamMovie>, ProviderError> {
        Ok(self.state.lock().unwrap().movies.clone())
    }

    async fn list_import_list_movies(&self) -> Result<Vec<ImportListMovie>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .import_list
            .iter()
            .map(|&tmdb_id| ImportListMovie { tmdb_id })
            .collect())
    }

    async fn list_tags(&self) -> Result<Vec<UpstreamTag>, ProviderError> {
        Ok(self.state.lock().unwrap().tags.clone())
    }

    async fn delete_movie(&self, id: i64) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete == Some(id) {
            return Err(ProviderError::Status {
                status: 500,
                body: "disk on fire".into(),
            });
        }
        state.movies.retain(|m| m.id != id);
        state.deleted.push(id);
        Ok(())
    }

    async fn media_management_config(&self) -> Result<MediaManagementConfig, ProviderError> {
        Ok(MediaManagementConfig {
            recycle_bin_enabled: self.state.lock().unwrap().recycle_bin,
        })
    }
}

/// In-process watch history keyed by exact title.
#[derive(Default, Clone)]
pub struct FakeWatchHistory {
    pub unreachable: bool,
    pub titles: Arc<Mutex<HashMap<String, WatchStatus>>>,
    pub searches: Arc<Mutex<Vec<String>>>,
}

impl FakeWatchHistory {
    pub fn watched(self, title: &str, at: DateTime<Utc>) -> Self {
        self.titles.lock().unwrap().insert(
            title.to_string(),
            WatchStatus {
                watched: true,
                last_watched_at: Some(at),
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl WatchHistory for FakeWatchHistory {
    async fn ping(&self) -> WatchHistoryPing {
        WatchHistoryPing {
            success: !self.unreachable,
        }
    }

    async fn search_by_title(&self, title: &str) -> Result<Option<WatchStatus>, ProviderError> {
        self.searches.lock().unwrap().push(title.to_string());
        Ok(self.titles.lock().unwrap().get(title).copied())
    }
}
