use crate::{error_for_status, http_client, ProviderError, WatchHistory, WatchHistoryPing, WatchStatus};
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Page size for library searches.
const SEARCH_PAGE: usize = 100;

#[derive(Debug, Clone)]
pub struct TautulliConfig {
    pub base_url: String,
    pub api_key: String,
    /// Movie library sections to search. Empty means every movie library.
    pub library_ids: Vec<i64>,
    pub timeout: Duration,
}

/// Tautulli v2 API client.
#[derive(Clone)]
pub struct TautulliClient {
    client: Client,
    cfg: Arc<TautulliConfig>,
    libraries: Arc<OnceCell<Vec<i64>>>,
}

impl TautulliClient {
    pub fn new(cfg: TautulliConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(cfg.timeout)?,
            cfg: Arc::new(cfg),
            libraries: Arc::new(OnceCell::new()),
        })
    }

    fn request(&self, cmd: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/api/v2", self.cfg.base_url.trim_end_matches('/')))
            .query(&[("apikey", self.cfg.api_key.as_str()), ("cmd", cmd)])
    }

    async fn call<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ProviderError> {
        let resp = error_for_status(req.send().await?).await?;
        let envelope: Envelope<T> = resp.json().await?;
        let inner = envelope.response;
        if inner.result != "success" {
            return Err(ProviderError::RequestFailed(
                inner.message.unwrap_or_else(|| format!("tautulli returned {}", inner.result)),
            ));
        }
        inner
            .data
            .ok_or_else(|| ProviderError::Decode("tautulli response carried no data".into()))
    }

    async fn movie_libraries(&self) -> Result<&Vec<i64>, ProviderError> {
        self.libraries
            .get_or_try_init(|| async {
                if !self.cfg.library_ids.is_empty() {
                    return Ok(self.cfg.library_ids.clone());
                }
                let libraries: Vec<Library> = self.call(self.request("get_library_names")).await?;
                let ids: Vec<i64> = libraries
                    .into_iter()
                    .filter(|l| l.section_type == "movie")
                    .map(|l| l.section_id)
                    .collect();
                debug!(libraries = ?ids, "resolved tautulli movie libraries");
                Ok::<_, ProviderError>(ids)
            })
            .await
    }
}

#[async_trait::async_trait]
impl WatchHistory for TautulliClient {
    async fn ping(&self) -> WatchHistoryPing {
        match self.request("get_tautulli_info").send().await {
            Ok(resp) if resp.status() == StatusCode::OK => WatchHistoryPing { success: true },
            Ok(resp) => {
                warn!(status = %resp.status(), "tautulli ping returned unexpected status");
                WatchHistoryPing::default()
            }
            Err(e) => {
                warn!(error = %e, "failed to ping tautulli");
                WatchHistoryPing::default()
            }
        }
    }

    async fn search_by_title(&self, title: &str) -> Result<Option<WatchStatus>, ProviderError> {
        let wanted = title.to_lowercase();
        let mut best: Option<MediaInfo> = None;
        for section_id in self.movie_libraries().await? {
            let section = section_id.to_string();
            let found = exact_matches(&wanted, |start| {
                let start = start.to_string();
                let length = SEARCH_PAGE.to_string();
                let req = self.request("get_library_media_info").query(&[
                    ("section_id", section.as_str()),
                    ("search", title),
                    ("start", start.as_str()),
                    ("length", length.as_str()),
                ]);
                self.call::<MediaInfoPage>(req)
            })
            .await?;
            best = found
                .into_iter()
                .chain(best)
                .max_by_key(|m| m.last_played.unwrap_or(0));
        }
        Ok(best.map(MediaInfo::into_status))
    }
}

/// Pages through a search from offset 0 until `recordsFiltered` rows have
/// been read, keeping the rows whose lowercased title equals `wanted`.
async fn exact_matches<F, Fut>(wanted: &str, mut fetch: F) -> Result<Vec<MediaInfo>, ProviderError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<MediaInfoPage, ProviderError>>,
{
    let mut read = 0;
    let mut found = Vec::new();
    loop {
        let page = fetch(read).await?;
        if page.data.is_empty() {
            break;
        }
        read += page.data.len();
        found.extend(page.data.into_iter().filter(|m| m.title.to_lowercase() == wanted));
        let total = page.records_filtered.unwrap_or(0);
        if read as i64 >= total {
            break;
        }
    }
    Ok(found)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: EnvelopeBody<T>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody<T> {
    result: String,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Library {
    #[serde(deserialize_with = "lenient_i64")]
    section_id: i64,
    #[serde(default)]
    section_type: String,
}

#[derive(Debug, Deserialize)]
struct MediaInfoPage {
    #[serde(rename = "recordsFiltered", default, deserialize_with = "lenient_opt_i64")]
    records_filtered: Option<i64>,
    #[serde(default)]
    data: Vec<MediaInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    title: String,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    last_played: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    play_count: Option<i64>,
}

impl MediaInfo {
    fn into_status(self) -> WatchStatus {
        WatchStatus {
            watched: self.play_count.unwrap_or(0) > 0,
            last_watched_at: self.last_played.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

/// Tautulli sends numbers as integers, numeric strings, empty strings or null.
fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    lenient_opt_i64(d)?.ok_or_else(|| serde::de::Error::custom("expected an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn media_info_maps_to_watch_status() {
        let page: Envelope<MediaInfoPage> = serde_json::from_value(serde_json::json!({
            "response": {
                "result": "success",
                "message": null,
                "data": {
                    "recordsFiltered": 2,
                    "recordsTotal": 40,
                    "data": [
                        {"title": "Heat", "last_played": 1704164645, "play_count": 2},
                        {"title": "Heat 2", "last_played": "", "play_count": null}
                    ]
                }
            }
        }))
        .unwrap();
        let mut items = page.response.data.unwrap().data.into_iter();

        let heat = items.next().unwrap().into_status();
        assert!(heat.watched);
        assert_eq!(
            heat.last_watched_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );

        let sequel = items.next().unwrap().into_status();
        assert!(!sequel.watched);
        assert_eq!(sequel.last_watched_at, None);
    }

    #[test]
    fn library_section_ids_accept_strings() {
        let libs: Vec<Library> = serde_json::from_value(serde_json::json!([
            {"section_id": "1", "section_name": "Movies", "section_type": "movie"},
            {"section_id": 2, "section_name": "Shows", "section_type": "show"}
        ]))
        .unwrap();
        assert_eq!(libs[0].section_id, 1);
        assert_eq!(libs[1].section_type, "show");
    }

    fn page(total: i64, titles: &[&str], played: i64) -> MediaInfoPage {
        MediaInfoPage {
            records_filtered: Some(total),
            data: titles
                .iter()
                .map(|t| MediaInfo {
                    title: t.to_string(),
                    last_played: Some(played),
                    play_count: Some(1),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn exact_title_is_found_past_the_first_page() {
        let first: Vec<String> = (0..SEARCH_PAGE).map(|i| format!("It Follows {i}")).collect();
        let first: Vec<&str> = first.iter().map(String::as_str).collect();
        let mut pages = vec![page(102, &first, 10), page(102, &["Split", "IT"], 20)].into_iter();
        let mut offsets = Vec::new();

        let found = exact_matches("it", |start| {
            offsets.push(start);
            let next = pages.next().ok_or_else(|| ProviderError::Decode("no more pages".into()));
            async move { next }
        })
        .await
        .unwrap();

        assert_eq!(offsets, vec![0, SEARCH_PAGE]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "IT");
    }

    #[tokio::test]
    async fn paging_stops_on_an_empty_page() {
        let mut calls = 0;
        let found = exact_matches("up", |_| {
            calls += 1;
            async { Ok(page(500, &[], 0)) }
        })
        .await
        .unwrap();
        assert!(found.is_empty());
        assert_eq!(calls, 1);
    }
}
