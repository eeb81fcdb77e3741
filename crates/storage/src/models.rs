use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream label mirrored locally. Ids are assigned by the media manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// One item of the managed library. `id` is the media manager's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub alternative_titles: Vec<String>,
    pub tmdb_id: i64,
    pub poster: Option<String>,
    pub watched: bool,
    pub last_watched_at: Option<DateTime<Utc>>,
    pub ignored: bool,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub downloaded_at: DateTime<Utc>,
    pub imdb_rating: Option<i64>,
    pub tmdb_rating: Option<i64>,
    pub metacritic_rating: Option<i64>,
    pub rotten_tomatoes_rating: Option<i64>,
    pub appears_in_list: bool,
    pub tags: Vec<Tag>,
}

impl Movie {
    /// Primary title followed by the alternative titles, in lookup priority order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.alternative_titles.iter().map(String::as_str))
    }

    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}

/// A user-authored retention policy. Every `None` predicate passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub downloaded_days_ago: Option<i64>,
    pub watched: Option<bool>,
    pub watched_days_ago: Option<i64>,
    pub appears_in_list: Option<bool>,
    pub minimum_imdb_rating: Option<i64>,
    pub minimum_tmdb_rating: Option<i64>,
    pub minimum_metacritic_rating: Option<i64>,
    pub minimum_rotten_tomatoes_rating: Option<i64>,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating or editing a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleInput {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub downloaded_days_ago: Option<i64>,
    #[serde(default)]
    pub watched: Option<bool>,
    #[serde(default)]
    pub watched_days_ago: Option<i64>,
    #[serde(default)]
    pub appears_in_list: Option<bool>,
    #[serde(default)]
    pub minimum_imdb_rating: Option<i64>,
    #[serde(default)]
    pub minimum_tmdb_rating: Option<i64>,
    #[serde(default)]
    pub minimum_metacritic_rating: Option<i64>,
    #[serde(default)]
    pub minimum_rotten_tomatoes_rating: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

fn default_enabled() -> bool {
    true
}

impl RuleInput {
    /// `watched_days_ago` only means something when the rule requires a watched movie.
    pub fn normalized(mut self) -> Self {
        if self.watched != Some(true) {
            self.watched_days_ago = None;
        }
        self.tag_ids.sort_unstable();
        self.tag_ids.dedup();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncKind {
    Full,
    Partial,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Full => "FULL",
            SyncKind::Partial => "PARTIAL",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(SyncKind::Full),
            "PARTIAL" => Ok(SyncKind::Partial),
            other => Err(anyhow::anyhow!("unknown sync kind: {other}")),
        }
    }
}

/// Bookkeeping for one reconciliation run. `finished_at == None` means running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub kind: SyncKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn is_running(&self) -> bool {
        self.finished_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub enabled: bool,
    pub sync_days: i64,
    pub sync_hour: u32,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_days: 7,
            sync_hour: 3,
        }
    }
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
