//! Glossary and title-alias files.
//!
//! The global glossary YAML carries a `global` term map plus per-work
//! sections applied only when the work inference is confident. Per-work
//! glossaries live in a directory keyed by slugified title. The alias map
//! resolves a title to the other names the same work is published under.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::workinfo::WorkInfo;

/// Ordered term map: source term -> required translation.
pub type Glossary = BTreeMap<String, String>;

static NORMALIZE_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^\)]*\)").unwrap());
static NORMALIZE_EPISODES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(s\d{1,2}e\d{1,4}|ep\s*\d+|episode\s*\d+)\b").unwrap());
static NORMALIZE_CJK_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"第\s*\d+\s*[话集]").unwrap());
static NORMALIZE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\-.]+").unwrap());
static NORMALIZE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a title for comparisons: strip brackets, episode markers and
/// separator noise, collapse whitespace, lowercase.
pub fn normalize_title_text(text: &str) -> String {
    let cleaned = NORMALIZE_BRACKETS.replace_all(text, " ");
    let cleaned = NORMALIZE_EPISODES.replace_all(&cleaned, " ");
    let cleaned = NORMALIZE_CJK_EPISODE.replace_all(&cleaned, " ");
    let cleaned = NORMALIZE_SEPARATORS.replace_all(&cleaned, " ");
    let cleaned = NORMALIZE_SPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_lowercase()
}

/// Normalized title with all whitespace removed, for exact-key matching.
pub fn normalize_title_key(text: &str) -> String {
    normalize_title_text(text).replace(char::is_whitespace, "")
}

/// Slug used for per-work glossary file names.
pub fn slugify_title(text: &str) -> String {
    let normalized = normalize_title_text(text);
    let slug: String = normalized
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    let slug = slug
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    slug
}

/// Load the raw glossary YAML; missing or malformed files yield an empty map.
pub fn load_glossary_yaml(path: &str) -> serde_yaml::Value {
    if path.is_empty() {
        return serde_yaml::Value::Null;
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return serde_yaml::Value::Null;
    };
    serde_yaml::from_str(&content).unwrap_or(serde_yaml::Value::Null)
}

fn yaml_string_map(value: &serde_yaml::Value) -> Glossary {
    let mut out = Glossary::new();
    if let serde_yaml::Value::Mapping(map) = value {
        for (k, v) in map {
            if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                out.insert(k.to_string(), v.to_string());
            }
        }
    }
    out
}

/// Build the glossary effective for one job: global terms plus the matching
/// per-work section when the work inference clears the confidence threshold.
pub fn build_effective_glossary(
    raw: &serde_yaml::Value,
    work_info: Option<&WorkInfo>,
    confidence_threshold: f64,
) -> Glossary {
    if !matches!(raw, serde_yaml::Value::Mapping(_)) {
        return Glossary::new();
    }
    let mut glossary = Glossary::new();
    if let Some(global) = raw.get("global") {
        glossary.extend(yaml_string_map(global));
    }

    if let Some(info) = work_info {
        if let Some(title) = info.title.as_deref() {
            if info.confidence >= confidence_threshold {
                if let Some(serde_yaml::Value::Mapping(works)) = raw.get("works") {
                    let title_key = normalize_title_key(title);
                    for (key, mapping) in works {
                        let Some(key) = key.as_str() else { continue };
                        if !matches!(mapping, serde_yaml::Value::Mapping(_)) {
                            continue;
                        }
                        if title_key.contains(&normalize_title_key(key)) {
                            glossary.extend(yaml_string_map(mapping));
                            break;
                        }
                    }
                }
            }
        }
    }
    glossary
}

/// Load a per-work glossary file by any of the given titles.
///
/// Files are named `<slug>.yaml`/`<slug>.yml` and contain either a `terms:`
/// map, a `glossary:` map or a flat string map.
pub fn load_work_glossary_by_titles(dir: &str, titles: &[String]) -> Glossary {
    if dir.is_empty() || titles.is_empty() {
        return Glossary::new();
    }
    let mut seen = std::collections::HashSet::new();
    for title in titles {
        let slug = slugify_title(title);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }
        for ext in ["yaml", "yml"] {
            let path = Path::new(dir).join(format!("{}.{}", slug, ext));
            if !path.exists() {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                return Glossary::new();
            };
            let Ok(data) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
                return Glossary::new();
            };
            if let serde_yaml::Value::Mapping(map) = &data {
                for section in ["terms", "glossary"] {
                    if let Some(inner @ serde_yaml::Value::Mapping(_)) = data.get(section) {
                        return yaml_string_map(inner);
                    }
                }
                let flat = yaml_string_map(&data);
                if flat.len() == map.len() {
                    return flat;
                }
            }
        }
    }
    Glossary::new()
}

/// Format the glossary block inserted into translation prompts.
pub fn format_glossary(glossary: &Glossary) -> String {
    if glossary.is_empty() {
        return "当前没有可用术语表。遇到专有名词时：\
                优先音译或保留原文，不要随意意译，\
                在不确定作品的情况下不要假设属于某个具体作品。"
            .to_string();
    }
    let items: Vec<String> = glossary
        .iter()
        .map(|(k, v)| format!("{} => {}", k, v))
        .collect();
    format!(
        "固定术语表（如出现这些原文，请务必翻成右侧词语）：\n{}",
        items.join("\n")
    )
}

/// Title alias map: canonical title -> other published names.
pub type AliasMap = BTreeMap<String, Vec<String>>;

/// Load the alias YAML; missing or malformed files yield an empty map.
pub fn load_title_aliases(path: &str) -> AliasMap {
    if path.is_empty() {
        return AliasMap::new();
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return AliasMap::new();
    };
    let Ok(data) = serde_yaml::from_str::<serde_yaml::Value>(&content) else {
        return AliasMap::new();
    };
    let serde_yaml::Value::Mapping(map) = data else {
        return AliasMap::new();
    };
    let mut aliases = AliasMap::new();
    for (key, items) in map {
        let (Some(key), serde_yaml::Value::Sequence(items)) = (key.as_str(), items) else {
            continue;
        };
        let values: Vec<String> = items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        aliases.insert(key.to_string(), values);
    }
    aliases
}

/// Resolve the aliases of `title`: the entry whose key or any value matches
/// the normalized title contributes its key and all values, minus the title
/// itself. The result is sorted.
pub fn resolve_title_aliases(title: &str, alias_map: &AliasMap) -> Vec<String> {
    if title.is_empty() || alias_map.is_empty() {
        return Vec::new();
    }
    let normalized = normalize_title_text(title);
    let mut candidates: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for (key, values) in alias_map {
        let mut matched = normalize_title_text(key) == normalized;
        if !matched {
            matched = values
                .iter()
                .any(|value| normalize_title_text(value) == normalized);
        }
        if matched {
            candidates.extend(values.iter().cloned());
            candidates.insert(key.clone());
            break;
        }
    }
    candidates.remove(title);
    candidates.into_iter().filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_text() {
        assert_eq!(normalize_title_text("[Sub] My.Show_S01E02"), "my show");
        assert_eq!(normalize_title_text("作品 第3话"), "作品");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("My Great Show!"), "my_great_show");
        assert_eq!(slugify_title(""), "");
    }

    #[test]
    fn test_effective_glossary_global_only_when_unconfident() {
        let raw: serde_yaml::Value = serde_yaml::from_str(
            "global:\n  Tokyo: 东京\nworks:\n  my show:\n    Alice: 爱丽丝\n",
        )
        .unwrap();
        let info = WorkInfo {
            title: Some("My Show".into()),
            season: None,
            episode: None,
            confidence: 0.3,
            source: "path_only".into(),
        };
        let glossary = build_effective_glossary(&raw, Some(&info), 0.75);
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary.get("Tokyo").map(String::as_str), Some("东京"));
    }

    #[test]
    fn test_effective_glossary_adds_work_section_when_confident() {
        let raw: serde_yaml::Value = serde_yaml::from_str(
            "global:\n  Tokyo: 东京\nworks:\n  my show:\n    Alice: 爱丽丝\n",
        )
        .unwrap();
        let info = WorkInfo {
            title: Some("My Show S01".into()),
            season: None,
            episode: None,
            confidence: 0.9,
            source: "llm".into(),
        };
        let glossary = build_effective_glossary(&raw, Some(&info), 0.75);
        assert_eq!(glossary.get("Alice").map(String::as_str), Some("爱丽丝"));
    }

    #[test]
    fn test_format_glossary_fallback_text() {
        let empty = Glossary::new();
        assert!(format_glossary(&empty).contains("没有可用术语表"));
        let mut glossary = Glossary::new();
        glossary.insert("Alice".into(), "爱丽丝".into());
        let formatted = format_glossary(&glossary);
        assert!(formatted.contains("Alice => 爱丽丝"));
    }

    #[test]
    fn test_resolve_title_aliases_by_key_and_value() {
        let mut map = AliasMap::new();
        map.insert(
            "ONE PIECE".to_string(),
            vec!["ワンピース".to_string(), "海贼王".to_string()],
        );
        let by_key = resolve_title_aliases("one piece", &map);
        assert!(by_key.contains(&"ワンピース".to_string()));
        assert!(by_key.contains(&"海贼王".to_string()));

        let by_value = resolve_title_aliases("海贼王", &map);
        assert!(by_value.contains(&"ONE PIECE".to_string()));
        assert!(!by_value.contains(&"海贼王".to_string()));
    }

    #[test]
    fn test_load_work_glossary_by_titles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("my_show.yaml"),
            "terms:\n  Alice: 爱丽丝\n",
        )
        .unwrap();
        let glossary = load_work_glossary_by_titles(
            dir.path().to_str().unwrap(),
            &["My Show".to_string()],
        );
        assert_eq!(glossary.get("Alice").map(String::as_str), Some("爱丽丝"));

        let missing =
            load_work_glossary_by_titles(dir.path().to_str().unwrap(), &["Other".to_string()]);
        assert!(missing.is_empty());
    }
}
