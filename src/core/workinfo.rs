//! Work (title/season/episode) inference from paths and the LLM.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

use crate::services::chat::ChatModel;

/// Inferred context for metadata lookup and translation hints.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkInfo {
    /// Work title.
    pub title: Option<String>,
    /// Season or arc.
    pub season: Option<String>,
    /// Episode number.
    pub episode: Option<String>,
    /// Inference confidence in `[0, 1]`.
    pub confidence: f64,
    /// Where the inference came from: `none`, `path_only`, `llm`,
    /// `path+llm`, optionally suffixed with `+nfo`.
    pub source: String,
}

impl WorkInfo {
    /// The empty inference.
    pub fn none() -> Self {
        Self {
            title: None,
            season: None,
            episode: None,
            confidence: 0.0,
            source: "none".to_string(),
        }
    }
}

static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^\)]*\)").unwrap());
static RELEASE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(1080p|720p|2160p|4k|x264|x265|hevc|h264|h265|web[- ]?dl|webrip|bdrip|hdrip|bluray|aac|flac|dts)\b").unwrap()
});
static SEASON_EPISODE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(s\d{1,2}e\d{1,4})\b").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\.]+").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SXXEYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[sS](\d{1,2})\s*[eE](\d{1,4})").unwrap());
static EPISODE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[\s._-])(?:ep|episode)\s*(\d{1,4})(?:$|[\s._-])").unwrap());

/// Strip release tags, brackets and separator noise from a file name.
pub fn clean_title(text: &str) -> String {
    let cleaned = BRACKETS.replace_all(text, " ");
    let cleaned = RELEASE_TAGS.replace_all(&cleaned, " ");
    let cleaned = SEASON_EPISODE_TAG.replace_all(&cleaned, " ");
    let cleaned = SEPARATORS.replace_all(&cleaned, " ");
    let cleaned = MULTI_SPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Infer work info from the file path alone. Confidence is capped at 0.5.
pub fn guess_from_path(path: &Path) -> WorkInfo {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut season = None;
    let mut episode = None;
    let mut confidence: f64 = 0.1;

    if let Some(caps) = SXXEYY.captures(&name) {
        season = Some(caps[1].trim_start_matches('0').to_string())
            .filter(|s| !s.is_empty())
            .or(Some("0".to_string()));
        episode = Some(caps[2].trim_start_matches('0').to_string())
            .filter(|s| !s.is_empty())
            .or(Some("0".to_string()));
        confidence = confidence.max(0.35);
    } else if let Some(caps) = EPISODE_ONLY.captures(&name) {
        episode = Some(caps[1].trim_start_matches('0').to_string())
            .filter(|s| !s.is_empty())
            .or(Some("0".to_string()));
        confidence = confidence.max(0.25);
    }

    let title_candidate = clean_title(&name);
    let title = if title_candidate.is_empty() {
        None
    } else {
        confidence = confidence.max(0.2);
        Some(title_candidate)
    };

    if title.is_some() || season.is_some() || episode.is_some() {
        WorkInfo {
            title,
            season,
            episode,
            confidence: confidence.min(0.5),
            source: "path_only".to_string(),
        }
    } else {
        WorkInfo::none()
    }
}

#[derive(Debug, Deserialize)]
struct LlmWorkInfo {
    title: Option<String>,
    season: Option<serde_json::Value>,
    episode: Option<serde_json::Value>,
    confidence: Option<f64>,
}

fn value_to_string(value: Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Refine path-derived work info with the LLM.
///
/// The model answers strict JSON; a parse failure degrades to the path info
/// with confidence capped at 0.4.
pub async fn refine_via_llm(
    path_info: &WorkInfo,
    sample_lines: &[String],
    chat: &dyn ChatModel,
    path: &str,
) -> WorkInfo {
    let lines: Vec<&str> = sample_lines
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .take(30)
        .collect();
    let system_prompt = "你是一个负责识别影视作品信息的助手。\
        你会得到：字幕文件路径与若干台词示例。\
        请尽量推断作品标题、季/篇章、集数；不确定则降低置信度。\
        回答必须是严格 JSON，不要解释。";
    let user_prompt = format!(
        "现有基于路径的初步推断（可能不可靠）：\n\
         title = {}\n\
         season = {}\n\
         episode = {}\n\
         confidence = {}\n\n\
         字幕文件路径：\n{}\n\n\
         以下是字幕中的部分台词示例（可能是日文、英文等）：\n{}\n\n\
         请你综合路径信息和字幕内容，输出一个 JSON，字段如下：\n\
         {{\n  \"title\": string 或 null,\n  \"season\": string 或 null,\n  \"episode\": string 或 null,\n  \"confidence\": 0.0~1.0 的数字\n}}\n\n\
         注意：\n\
         1. 如果你无法确定作品，请将 title 设为 null，confidence 设为 0.0~0.3。\n\
         2. 如果你只是“有一点点猜测”，confidence 不要超过 0.6。\n\
         3. 只有在你非常有把握时，才可以把 confidence 调到 0.7~0.9。\n\
         4. 不要输出注释或额外文本，只要 JSON。",
        serde_json::to_string(&path_info.title).unwrap_or_else(|_| "null".into()),
        serde_json::to_string(&path_info.season).unwrap_or_else(|_| "null".into()),
        serde_json::to_string(&path_info.episode).unwrap_or_else(|_| "null".into()),
        path_info.confidence,
        path,
        lines.join("\n"),
    );

    let degraded = WorkInfo {
        title: path_info.title.clone(),
        season: path_info.season.clone(),
        episode: path_info.episode.clone(),
        confidence: path_info.confidence.min(0.4),
        source: "path_only".to_string(),
    };

    let raw = match chat.complete(system_prompt, &user_prompt).await {
        Ok(raw) => raw,
        Err(_) => return degraded,
    };
    let Ok(parsed) = serde_json::from_str::<LlmWorkInfo>(raw.trim()) else {
        return degraded;
    };

    let confidence = parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    let source = if path_info.source != "none" {
        "path+llm"
    } else {
        "llm"
    };
    WorkInfo {
        title: parsed.title.filter(|t| !t.trim().is_empty()),
        season: value_to_string(parsed.season),
        episode: value_to_string(parsed.episode),
        confidence,
        source: source.to_string(),
    }
}

/// Detect work info from the path, refined by the LLM when one is available.
pub async fn detect(
    path: &Path,
    sample_lines: &[String],
    chat: Option<&dyn ChatModel>,
) -> WorkInfo {
    let path_info = guess_from_path(path);
    match chat {
        Some(chat) => {
            refine_via_llm(&path_info, sample_lines, chat, &path.to_string_lossy()).await
        }
        None => path_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clean_title_strips_release_noise() {
        let cleaned = clean_title("[Group] Show.Name.S01E02.1080p.WEB-DL.x264");
        assert!(!cleaned.contains("1080p"));
        assert!(!cleaned.to_lowercase().contains("s01e02"));
        assert!(cleaned.contains("Show Name"));
    }

    #[test]
    fn test_guess_from_path_sxxeyy() {
        let info = guess_from_path(&PathBuf::from("/watch/Show.Name.S01E02.mkv"));
        assert_eq!(info.season.as_deref(), Some("1"));
        assert_eq!(info.episode.as_deref(), Some("2"));
        assert_eq!(info.source, "path_only");
        assert!(info.confidence >= 0.35);
        assert!(info.confidence <= 0.5);
    }

    #[test]
    fn test_guess_from_path_episode_only() {
        let info = guess_from_path(&PathBuf::from("/watch/Show ep 07 final.mkv"));
        assert_eq!(info.episode.as_deref(), Some("7"));
        assert!(info.season.is_none());
    }

    #[test]
    fn test_guess_from_path_title_only() {
        let info = guess_from_path(&PathBuf::from("/watch/Some Movie.mkv"));
        assert_eq!(info.title.as_deref(), Some("Some Movie"));
        assert!(info.confidence >= 0.2);
    }

    #[test]
    fn test_confidence_capped_at_half() {
        let info = guess_from_path(&PathBuf::from("/watch/Great.Show.S02E11.mkv"));
        assert!(info.confidence <= 0.5);
    }
}
