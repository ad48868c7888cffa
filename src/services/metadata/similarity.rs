//! Title similarity and alias scoring used by all providers.

use crate::core::glossary::{normalize_title_key, normalize_title_text};

/// Normalized-Levenshtein similarity over normalized titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title_text(a);
    let b = normalize_title_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Flat bonus when any alias matches any title exactly (after
/// normalization).
pub fn alias_bonus(aliases: &[String], titles: &[&str]) -> f64 {
    if aliases.is_empty() {
        return 0.0;
    }
    let alias_set: std::collections::HashSet<String> = aliases
        .iter()
        .map(|a| normalize_title_text(a))
        .filter(|a| !a.is_empty())
        .collect();
    for title in titles {
        if title.is_empty() {
            continue;
        }
        if alias_set.contains(&normalize_title_text(title)) {
            return 0.2;
        }
    }
    0.0
}

const ALLOWED_SUFFIXES: &[&str] = &[
    "movie", "film", "ova", "special", "season", "part", "剧场版", "剧场", "电影", "篇", "篇章",
    "章",
];

/// Graded alias match: 1.0 for an exact key match, 0.8 when the remainder
/// after the alias is empty, a roman/arabic numeral or a known suffix, 0.0
/// otherwise. Providers use a zero score as a hard gate when aliases exist.
pub fn alias_match_score(aliases: &[String], title: &str) -> f64 {
    if aliases.is_empty() || title.is_empty() {
        return 0.0;
    }
    let title_key = normalize_title_key(title);
    for alias in aliases {
        let alias_key = normalize_title_key(alias);
        if alias_key.is_empty() {
            continue;
        }
        if title_key == alias_key {
            return 1.0;
        }
        let remainder = if let Some(rest) = title_key.strip_prefix(&alias_key) {
            rest.to_string()
        } else if title_key.contains(&alias_key) {
            title_key.replace(&alias_key, "")
        } else {
            continue;
        };
        let remainder = remainder.trim().to_string();
        if remainder.is_empty() {
            return 0.8;
        }
        if remainder
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, 'i' | 'v' | 'x'))
        {
            return 0.8;
        }
        if ALLOWED_SUFFIXES
            .iter()
            .any(|suffix| normalize_title_key(suffix) == remainder)
        {
            return 0.8;
        }
    }
    0.0
}

static YEAR: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"(19|20)\d{2}").unwrap());

/// Extract a plausible release year from a date-ish value.
pub fn extract_year(value: &str) -> Option<i32> {
    YEAR.find(value).and_then(|m| m.as_str().parse().ok())
}

/// Penalty for impossible pairings of a high episode number with a very
/// early release year.
pub fn episode_year_penalty(episode: Option<i64>, year: Option<i32>) -> f64 {
    match (episode, year) {
        (Some(episode), Some(year)) if episode >= 50 && year < 1990 => -0.3,
        _ => 0.0,
    }
}
