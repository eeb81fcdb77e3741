//! Plain-text rows for the listing commands. `--json` output bypasses these.

use chrono::{DateTime, Utc};
use reclaim_core::matcher::MonitoredMovie;
use storage::models::{GeneralSettings, Movie, Rule, SyncRun, Tag};

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn movie(m: &Movie) -> String {
    let mut flags = Vec::new();
    if m.watched {
        flags.push("watched");
    }
    if m.ignored {
        flags.push("ignored");
    }
    if m.appears_in_list {
        flags.push("listed");
    }
    if m.deleted {
        flags.push("deleted");
    }
    let mut line = format!("{:>6}  {}  downloaded {}", m.id, m.title, date(m.downloaded_at));
    if let Some(at) = m.deleted_at {
        line.push_str(&format!("  deleted {}", date(at)));
    }
    if !flags.is_empty() {
        line.push_str(&format!("  [{}]", flags.join(", ")));
    }
    line
}

pub fn monitored(m: &MonitoredMovie) -> String {
    let when = match m.days_until_deletion {
        0 => "due now".to_string(),
        1 => "in 1 day".to_string(),
        n => format!("in {n} days"),
    };
    format!(
        "{:>6}  {}  {}  (rule {} \"{}\")",
        m.movie.id, m.movie.title, when, m.rule_id, m.rule_name
    )
}

fn tag_names(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| {
            if t.name.is_empty() {
                format!("#{}", t.id)
            } else {
                t.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub fn rule(r: &Rule) -> String {
    let mut parts = vec![format!(
        "{:>4}  {}{}",
        r.id,
        r.name,
        if r.enabled { "" } else { " (disabled)" }
    )];
    if let Some(d) = r.downloaded_days_ago {
        parts.push(format!("downloaded>={d}d"));
    }
    if let Some(w) = r.watched {
        parts.push(format!("watched={w}"));
    }
    if let Some(d) = r.watched_days_ago {
        parts.push(format!("watched>={d}d"));
    }
    if let Some(l) = r.appears_in_list {
        parts.push(format!("in_list={l}"));
    }
    for (label, ceiling) in [
        ("imdb", r.minimum_imdb_rating),
        ("tmdb", r.minimum_tmdb_rating),
        ("metacritic", r.minimum_metacritic_rating),
        ("rt", r.minimum_rotten_tomatoes_rating),
    ] {
        if let Some(c) = ceiling {
            parts.push(format!("{label}<{c}"));
        }
    }
    if !r.tags.is_empty() {
        parts.push(format!("tags={}", tag_names(&r.tags)));
    }
    parts.join("  ")
}

pub fn sync_run(s: &SyncRun) -> String {
    let finished = match s.finished_at {
        Some(at) => format!("finished {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => "running".to_string(),
    };
    format!(
        "{:>6}  {:<7}  started {}  {}",
        s.id,
        s.kind.as_str(),
        s.started_at.format("%Y-%m-%d %H:%M:%S"),
        finished
    )
}

pub fn settings(s: &GeneralSettings) -> String {
    format!(
        "enabled: {}\nsync days: {}\nsync hour: {:02}:00",
        s.enabled, s.sync_days, s.sync_hour
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_rule() -> Rule {
        Rule {
            id: 3,
            name: "old kids".into(),
            enabled: false,
            downloaded_days_ago: Some(30),
            watched: Some(true),
            watched_days_ago: Some(14),
            appears_in_list: None,
            minimum_imdb_rating: Some(60),
            minimum_tmdb_rating: None,
            minimum_metacritic_rating: None,
            minimum_rotten_tomatoes_rating: None,
            tags: vec![
                Tag {
                    id: 1,
                    name: "kids".into(),
                },
                Tag {
                    id: 9,
                    name: String::new(),
                },
            ],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn rule_lists_only_configured_predicates() {
        assert_eq!(
            rule(&sample_rule()),
            "   3  old kids (disabled)  downloaded>=30d  watched=true  watched>=14d  imdb<60  tags=kids,#9"
        );
    }

    #[test]
    fn running_sync_has_no_finish_time() {
        let run = SyncRun {
            id: 12,
            kind: storage::models::SyncKind::Full,
            started_at: Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap(),
            finished_at: None,
        };
        assert_eq!(sync_run(&run), "    12  FULL     started 2024-05-01 03:00:00  running");
    }
}
