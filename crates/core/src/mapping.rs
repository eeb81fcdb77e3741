use providers::{ImportListMovie, UpstreamMovie};
use std::collections::{HashMap, HashSet};
use storage::models::{Movie, Tag};

/// Lookups shared by every movie of one sync pass.
pub struct MovieMapper {
    listed_tmdb_ids: HashSet<i64>,
    tags: HashMap<i64, Tag>,
}

impl MovieMapper {
    pub fn new(import_list: &[ImportListMovie], known_tags: Vec<Tag>) -> Self {
        Self {
            listed_tmdb_ids: import_list.iter().map(|m| m.tmdb_id).collect(),
            tags: known_tags.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Local shape of an upstream movie, or `None` while it has no file.
    /// Tag ids the local mirror does not know are dropped. Watch status and
    /// the user's ignore flag start cleared; the store keeps existing values.
    pub fn to_movie(&self, upstream: UpstreamMovie) -> Option<Movie> {
        let downloaded_at = upstream.downloaded_at?;
        let mut tags: Vec<Tag> = upstream
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id).cloned())
            .collect();
        tags.sort_by_key(|t| t.id);
        tags.dedup_by_key(|t| t.id);
        Some(Movie {
            id: upstream.id,
            appears_in_list: self.listed_tmdb_ids.contains(&upstream.tmdb_id),
            title: upstream.title,
            alternative_titles: upstream.alternative_titles,
            tmdb_id: upstream.tmdb_id,
            poster: upstream.poster,
            watched: false,
            last_watched_at: None,
            ignored: false,
            deleted: false,
            deleted_at: None,
            downloaded_at,
            imdb_rating: upstream.imdb_rating,
            tmdb_rating: upstream.tmdb_rating,
            metacritic_rating: upstream.metacritic_rating,
            rotten_tomatoes_rating: upstream.rotten_tomatoes_rating,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn upstream(id: i64, tmdb_id: i64, downloaded: bool) -> UpstreamMovie {
        UpstreamMovie {
            id,
            title: format!("Movie {id}"),
            alternative_titles: vec![],
            tmdb_id,
            poster: None,
            downloaded_at: downloaded.then(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            imdb_rating: Some(70),
            tmdb_rating: None,
            metacritic_rating: None,
            rotten_tomatoes_rating: None,
            tag_ids: vec![3, 1, 99],
        }
    }

    #[test]
    fn maps_list_membership_and_known_tags() {
        let mapper = MovieMapper::new(
            &[ImportListMovie { tmdb_id: 500 }],
            vec![
                Tag { id: 1, name: "kids".into() },
                Tag { id: 3, name: "4k".into() },
            ],
        );
        let listed = mapper.to_movie(upstream(1, 500, true)).unwrap();
        assert!(listed.appears_in_list);
        assert_eq!(listed.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);

        let unlisted = mapper.to_movie(upstream(2, 501, true)).unwrap();
        assert!(!unlisted.appears_in_list);
    }

    #[test]
    fn skips_movies_without_a_file() {
        let mapper = MovieMapper::new(&[], vec![]);
        assert!(mapper.to_movie(upstream(1, 500, false)).is_none());
    }
}
