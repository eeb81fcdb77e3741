use clap::Args;
use reclaim_core::rules::RuleFile;
use storage::models::{RuleInput, Tag};

/// Rule fields shared by `rules add` and `rules update`. Omitted predicates
/// are unset and always pass.
#[derive(Debug, Clone, Args)]
pub struct RuleArgs {
    /// Rule name
    #[arg(long)]
    pub name: String,
    /// Create the rule disabled
    #[arg(long, default_value_t = false)]
    pub disabled: bool,
    /// Match once the file is at least this many days old
    #[arg(long)]
    pub downloaded_days: Option<i64>,
    /// Require the movie to be watched (true) or unwatched (false)
    #[arg(long)]
    pub watched: Option<bool>,
    /// Match once the last play is at least this many days old (needs --watched true)
    #[arg(long)]
    pub watched_days: Option<i64>,
    /// Require presence on (true) or absence from (false) an import list
    #[arg(long)]
    pub in_list: Option<bool>,
    /// Match only while the IMDb rating (0-100) is below this
    #[arg(long)]
    pub imdb_below: Option<i64>,
    /// Match only while the TMDb rating (0-100) is below this
    #[arg(long)]
    pub tmdb_below: Option<i64>,
    /// Match only while the Metacritic rating is below this
    #[arg(long)]
    pub metacritic_below: Option<i64>,
    /// Match only while the Rotten Tomatoes rating is below this
    #[arg(long)]
    pub rotten_tomatoes_below: Option<i64>,
    /// Tag names, at least one of which the movie must carry (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
    pub tags: Vec<String>,
}

impl RuleArgs {
    pub fn into_input(self, tags: &[Tag]) -> anyhow::Result<RuleInput> {
        RuleFile {
            name: self.name,
            enabled: !self.disabled,
            downloaded_days_ago: self.downloaded_days,
            watched: self.watched,
            watched_days_ago: self.watched_days,
            appears_in_list: self.in_list,
            minimum_imdb_rating: self.imdb_below,
            minimum_tmdb_rating: self.tmdb_below,
            minimum_metacritic_rating: self.metacritic_below,
            minimum_rotten_tomatoes_rating: self.rotten_tomatoes_below,
            tags: self.tags,
        }
        .resolve(tags)
    }
}
