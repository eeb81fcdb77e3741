//! Rule matching over a whole library: which rule each movie answers to,
//! how long until it becomes eligible, and the derived movie sets.

use crate::clock::days_since;
use crate::rules::evaluate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use storage::models::{Movie, Rule};

/// A movie together with the rule that will delete it soonest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredMovie {
    #[serde(flatten)]
    pub movie: Movie,
    pub rule_id: i64,
    pub rule_name: String,
    pub days_until_deletion: i64,
}

/// Deleted and explicitly ignored movies never reach rule evaluation.
pub fn eligible(movie: &Movie) -> bool {
    !movie.deleted && !movie.ignored
}

/// Days left before `movie` fully matches `rule`, or `None` when it does
/// not soft-match or never can. Unconfigured age terms are left out; with
/// no term left the movie is due now. A watched movie without a watch date
/// cannot satisfy `watched_days_ago`, so such a rule never counts down.
pub fn days_until_deletion(movie: &Movie, rule: &Rule, now: DateTime<Utc>) -> Option<i64> {
    if !evaluate(rule, movie, now).soft {
        return None;
    }
    let downloaded = rule
        .downloaded_days_ago
        .map(|days| days - days_since(movie.downloaded_at, now));
    let watched = match (rule.watched, rule.watched_days_ago) {
        (Some(true), Some(days)) => Some(days - days_since(movie.last_watched_at?, now)),
        _ => None,
    };
    let countdown = downloaded.into_iter().chain(watched).min().unwrap_or(0);
    Some(countdown.max(0))
}

/// Every eligible movie that soft-matches at least one enabled rule, paired
/// with its smallest countdown. Rules are consulted in the given order and
/// the first rule reaching a countdown keeps it on ties. Sorted soonest
/// first, then by movie id.
pub fn monitored(movies: &[Movie], rules: &[Rule], now: DateTime<Utc>) -> Vec<MonitoredMovie> {
    let candidates: Vec<&Movie> = movies.iter().filter(|m| eligible(m)).collect();
    let best = rules
        .iter()
        .filter(|r| r.enabled)
        .fold(HashMap::<i64, (&Movie, &Rule, i64)>::new(), |mut acc, rule| {
            for movie in &candidates {
                let Some(days) = days_until_deletion(movie, rule, now) else {
                    continue;
                };
                let better = acc
                    .get(&movie.id)
                    .map_or(true, |(_, _, current)| days < *current);
                if better {
                    acc.insert(movie.id, (*movie, rule, days));
                }
            }
            acc
        });

    let mut out: Vec<MonitoredMovie> = best
        .into_values()
        .map(|(movie, rule, days)| MonitoredMovie {
            movie: movie.clone(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            days_until_deletion: days,
        })
        .collect();
    out.sort_by_key(|m| (m.days_until_deletion, m.movie.id));
    out
}

fn monitored_ids(movies: &[Movie], rules: &[Rule], now: DateTime<Utc>) -> HashSet<i64> {
    monitored(movies, rules, now)
        .into_iter()
        .map(|m| m.movie.id)
        .collect()
}

/// Live movies outside the monitored set, whether flagged by the user or
/// simply matched by no enabled rule.
pub fn ignored<'a>(movies: &'a [Movie], rules: &[Rule], now: DateTime<Utc>) -> Vec<&'a Movie> {
    let ids = monitored_ids(movies, rules, now);
    movies
        .iter()
        .filter(|m| !m.deleted && !ids.contains(&m.id))
        .collect()
}

/// Live movies the user has not ignored that no enabled rule soft-matches.
pub fn unmonitored<'a>(movies: &'a [Movie], rules: &[Rule], now: DateTime<Utc>) -> Vec<&'a Movie> {
    let ids = monitored_ids(movies, rules, now);
    movies
        .iter()
        .filter(|m| eligible(m) && !ids.contains(&m.id))
        .collect()
}

/// Movies matched by a single rule. Without soft matches this is exactly
/// the rule's deletion candidate set.
pub fn for_rule<'a>(
    movies: &'a [Movie],
    rule: &Rule,
    include_soft_match: bool,
    now: DateTime<Utc>,
) -> Vec<&'a Movie> {
    movies
        .iter()
        .filter(|m| eligible(m))
        .filter(|m| {
            let eval = evaluate(rule, m, now);
            if include_soft_match {
                eval.soft
            } else {
                eval.full
            }
        })
        .collect()
}
