//! Work query assembly, LLM alias refinement and manual overrides.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::workinfo::WorkInfo;
use crate::services::chat::ChatModel;
use crate::services::metadata::nfo::NfoInfo;
use crate::services::metadata::{Character, WorkMetadata};

/// The tuple a metadata lookup is driven by.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkQuery {
    /// Video file name.
    pub raw_file_name: String,
    /// Path components of the containing directory.
    pub directory_names: Vec<String>,
    /// Best-guess title.
    pub guessed_title: Option<String>,
    /// Known aliases of the title.
    pub title_aliases: Vec<String>,
    /// Guessed season number.
    pub guessed_season: Option<i64>,
    /// Guessed episode number.
    pub guessed_episode: Option<i64>,
    /// Guessed release year.
    pub guessed_year: Option<i32>,
    /// `tv` or `movie`.
    pub guessed_type: Option<String>,
    /// Subtitle line samples keyed by language.
    pub subtitle_snippets: BTreeMap<String, Vec<String>>,
    /// Language priority for localized lookups.
    pub language_priority: Vec<String>,
    /// NFO path, when one was found.
    pub nfo_path: Option<String>,
    /// NFO title.
    pub nfo_title: Option<String>,
    /// NFO original title.
    pub nfo_original_title: Option<String>,
    /// NFO episode title.
    pub nfo_episode_title: Option<String>,
    /// External ids carried in from the NFO.
    pub external_ids: BTreeMap<String, String>,
}

impl WorkQuery {
    /// Search candidates: guessed title, aliases, then the raw file name.
    pub fn candidate_titles(&self) -> Vec<String> {
        let mut titles = Vec::new();
        if let Some(title) = &self.guessed_title {
            titles.push(title.clone());
        }
        titles.extend(self.title_aliases.iter().cloned());
        titles.push(self.raw_file_name.clone());
        titles.retain(|t| !t.is_empty());
        titles
    }
}

static SXXEYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[sS]\d{1,2}\s*[eE]\d{1,4}").unwrap());
static EPISODE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(ep|episode)\s*\d{1,4}\b").unwrap());

/// Guess `tv` vs `movie` from the file name.
pub fn guess_type_from_name(name: &str) -> &'static str {
    if SXXEYY.is_match(name) || EPISODE_WORD.is_match(name) {
        "tv"
    } else {
        "movie"
    }
}

/// Assemble a [`WorkQuery`] from the path, work inference, subtitle samples
/// and an optional NFO. NFO fields override path guesses.
#[allow(clippy::too_many_arguments)]
pub fn build_work_query(
    video_path: &Path,
    work_info: Option<&WorkInfo>,
    subtitle_snippets: BTreeMap<String, Vec<String>>,
    language_priority: Vec<String>,
    title_aliases: Vec<String>,
    nfo: Option<(&NfoInfo, &Path)>,
) -> WorkQuery {
    let raw_file_name = video_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let directory_names: Vec<String> = video_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(name) => {
                        Some(name.to_string_lossy().to_string())
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut guessed_title = work_info.and_then(|info| info.title.clone());
    let mut guessed_season: Option<i64> = work_info
        .and_then(|info| info.season.as_deref())
        .and_then(|s| s.parse().ok());
    let mut guessed_episode: Option<i64> = work_info
        .and_then(|info| info.episode.as_deref())
        .and_then(|s| s.parse().ok());
    let mut guessed_year = super::similarity::extract_year(&raw_file_name);
    let mut guessed_type = guess_type_from_name(&raw_file_name).to_string();
    if guessed_season.is_some() || guessed_episode.is_some() {
        guessed_type = "tv".to_string();
    }

    let mut external_ids = BTreeMap::new();
    let mut nfo_path = None;
    let mut nfo_title = None;
    let mut nfo_original_title = None;
    let mut nfo_episode_title = None;
    if let Some((info, path)) = nfo {
        nfo_path = Some(path.to_string_lossy().to_string());
        nfo_title = info.title.clone();
        nfo_original_title = info.original_title.clone();
        nfo_episode_title = info.episode_title.clone();
        if let Some(title) = &info.title {
            guessed_title = Some(title.clone());
        }
        if info.season.is_some() {
            guessed_season = info.season;
        }
        if info.episode.is_some() {
            guessed_episode = info.episode;
        }
        if info.year.is_some() {
            guessed_year = info.year;
        }
        if let Some(kind) = &info.kind {
            guessed_type = kind.clone();
        }
        external_ids = info.external_ids.clone();
    }

    WorkQuery {
        raw_file_name,
        directory_names,
        guessed_title,
        title_aliases,
        guessed_season,
        guessed_episode,
        guessed_year,
        guessed_type: Some(guessed_type),
        subtitle_snippets,
        language_priority,
        nfo_path,
        nfo_title,
        nfo_original_title,
        nfo_episode_title,
        external_ids,
    }
}

#[derive(Debug, Deserialize)]
struct AliasResponse {
    aliases: Option<Vec<String>>,
}

/// Ask the LLM for additional title aliases. Failures yield an empty list.
pub async fn refine_aliases_via_llm(
    path_info: &WorkInfo,
    sample_lines: &[String],
    chat: &dyn ChatModel,
    path: &str,
) -> Vec<String> {
    let lines: Vec<&str> = sample_lines
        .iter()
        .map(String::as_str)
        .filter(|l| !l.trim().is_empty())
        .take(30)
        .collect();
    let system = "你是一个负责识别影视作品别名的助手。\
        请根据文件路径与字幕片段，给出该作品可能的中/日/英标题别名。\
        返回严格 JSON，不要解释。";
    let user = format!(
        "文件路径：\n{}\n\n初步推断：\ntitle = {}\nseason = {}\nepisode = {}\n\n字幕片段：\n{}\n\n请输出 JSON，例如：\n{{ \"aliases\": [\"ワンピース\", \"ONE PIECE\", \"海贼王\"] }}",
        path,
        serde_json::to_string(&path_info.title).unwrap_or_else(|_| "null".into()),
        serde_json::to_string(&path_info.season).unwrap_or_else(|_| "null".into()),
        serde_json::to_string(&path_info.episode).unwrap_or_else(|_| "null".into()),
        lines.join("\n"),
    );
    let Ok(raw) = chat.complete(system, &user).await else {
        return Vec::new();
    };
    let Ok(parsed) = serde_json::from_str::<AliasResponse>(raw.trim()) else {
        return Vec::new();
    };
    parsed
        .aliases
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load a manual metadata override (`<name>.manual.json` in the manual
/// directory). A present file bypasses all providers with confidence 1.0.
pub fn load_manual_metadata(video_path: &Path, manual_dir: &Path) -> Option<WorkMetadata> {
    let name = video_path.file_stem()?.to_string_lossy().to_string();
    let path = manual_dir.join(format!("{}.manual.json", name));
    let content = std::fs::read_to_string(path).ok()?;
    let data: serde_json::Value = serde_json::from_str(&content).ok()?;
    if !data.is_object() {
        return None;
    }

    let string_map = |value: Option<&serde_json::Value>| -> BTreeMap<String, String> {
        value
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    };

    let characters: Vec<Character> = data
        .get("characters")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let external_ids: BTreeMap<String, serde_json::Value> = data
        .get("external_ids")
        .and_then(serde_json::Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    Some(WorkMetadata {
        title_original: data
            .get("title_original")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        title_localized: string_map(data.get("title_localized")),
        kind: data
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        year: data
            .get("year")
            .and_then(serde_json::Value::as_i64)
            .map(|y| y as i32),
        season: data.get("season").and_then(serde_json::Value::as_i64),
        episode: data.get("episode").and_then(serde_json::Value::as_i64),
        episode_title: string_map(data.get("episode_title")),
        characters,
        external_ids,
        confidence: 1.0,
        sources: vec!["manual".to_string()],
        raw: BTreeMap::from([("manual".to_string(), data)]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_type_from_name() {
        assert_eq!(guess_type_from_name("Show.S01E02.mkv"), "tv");
        assert_eq!(guess_type_from_name("Show episode 3.mkv"), "tv");
        assert_eq!(guess_type_from_name("Some Movie 2019.mkv"), "movie");
    }

    #[test]
    fn test_build_query_from_path_and_work_info() {
        let info = WorkInfo {
            title: Some("My Show".into()),
            season: Some("1".into()),
            episode: Some("2".into()),
            confidence: 0.4,
            source: "path_only".into(),
        };
        let query = build_work_query(
            Path::new("/media/anime/My Show/ep.2019.mkv"),
            Some(&info),
            BTreeMap::new(),
            vec!["zh-CN".into()],
            vec!["alias".into()],
            None,
        );
        assert_eq!(query.raw_file_name, "ep.2019.mkv");
        assert!(query.directory_names.contains(&"anime".to_string()));
        assert_eq!(query.guessed_title.as_deref(), Some("My Show"));
        assert_eq!(query.guessed_season, Some(1));
        assert_eq!(query.guessed_episode, Some(2));
        assert_eq!(query.guessed_year, Some(2019));
        assert_eq!(query.guessed_type.as_deref(), Some("tv"));
        assert_eq!(
            query.candidate_titles(),
            vec!["My Show", "alias", "ep.2019.mkv"]
        );
    }

    #[test]
    fn test_nfo_overrides_guesses() {
        let nfo = NfoInfo {
            kind: Some("tv".into()),
            title: Some("Canonical Title".into()),
            year: Some(2001),
            season: Some(3),
            episode: Some(12),
            external_ids: BTreeMap::from([("tmdb".to_string(), "99".to_string())]),
            ..NfoInfo::default()
        };
        let query = build_work_query(
            Path::new("/media/show.mkv"),
            None,
            BTreeMap::new(),
            vec![],
            vec![],
            Some((&nfo, Path::new("/media/show.nfo"))),
        );
        assert_eq!(query.guessed_title.as_deref(), Some("Canonical Title"));
        assert_eq!(query.guessed_season, Some(3));
        assert_eq!(query.guessed_year, Some(2001));
        assert_eq!(query.external_ids.get("tmdb").map(String::as_str), Some("99"));
    }

    #[test]
    fn test_manual_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manual = serde_json::json!({
            "title_original": "オリジナル",
            "title_localized": {"zh-CN": "中文名"},
            "type": "tv",
            "year": 2020,
            "season": 1,
            "episode": 5,
            "characters": [{"nameOriginal": "アリス", "aliases": {"zh-CN": "爱丽丝"}}],
            "external_ids": {"tmdb": 42}
        });
        std::fs::write(
            dir.path().join("video.manual.json"),
            serde_json::to_string(&manual).unwrap(),
        )
        .unwrap();

        let metadata =
            load_manual_metadata(Path::new("/watch/video.mkv"), dir.path()).unwrap();
        assert_eq!(metadata.title_original.as_deref(), Some("オリジナル"));
        assert_eq!(metadata.confidence, 1.0);
        assert_eq!(metadata.sources, vec!["manual"]);
        assert_eq!(metadata.characters[0].alias_for("zh"), Some("爱丽丝"));
        assert_eq!(metadata.title_localized["zh-CN"], "中文名");
    }

    #[test]
    fn test_manual_metadata_missing_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manual_metadata(Path::new("/watch/video.mkv"), dir.path()).is_none());
        std::fs::write(dir.path().join("video.manual.json"), "not json").unwrap();
        assert!(load_manual_metadata(Path::new("/watch/video.mkv"), dir.path()).is_none());
    }
}
