//! Subtitle reuse gate: script-variant detection and language-confidence
//! estimation for existing subtitles.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SUBTITLE_EXTS;
use crate::core::lang::{is_han, is_kana, normalize_lang_tag};

/// Script variant of a Chinese subtitle candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Simplified Chinese.
    Simplified,
    /// Traditional Chinese.
    Traditional,
    /// Chinese, script undetermined from the label alone.
    Chinese,
    /// Not classifiable.
    Unknown,
}

const SIMPLIFIED_TOKENS: &[&str] = &[
    "zh-hans", "zh_cn", "zh-cn", "chs", "sc", "简体", "简中", "gb",
];
const TRADITIONAL_TOKENS: &[&str] = &[
    "zh-hant", "zh_tw", "zh-tw", "cht", "tc", "繁体", "繁中", "big5",
];
const TRADITIONAL_CHARS: &str = "體臺後裏麼為這學聲國電風嗎門車廣畫線愛買雲龍萬與產";
const SIMPLIFIED_HINT_CHARS: &str = "这哪吗么为里对发会后云国门车广画线爱买";

/// Guess the variant from a filename or track label.
///
/// `simplified_lang` is the configured simplified target code; labels like
/// `.llm.zh` and `.zh` count as simplified outputs of this pipeline.
pub fn variant_from_label(text: &str, simplified_lang: &str) -> Option<Variant> {
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    if !simplified_lang.is_empty() {
        if lower.contains(&format!(".llm.{}", simplified_lang))
            || lower.contains(&format!(".{}", simplified_lang))
        {
            return Some(Variant::Simplified);
        }
    }
    if SIMPLIFIED_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(Variant::Simplified);
    }
    if TRADITIONAL_TOKENS.iter().any(|t| lower.contains(t)) {
        return Some(Variant::Traditional);
    }
    if ["zh", "chi", "zho", "chinese"].iter().any(|t| lower.contains(t)) {
        return Some(Variant::Chinese);
    }
    None
}

/// Guess the variant from sampled subtitle content.
///
/// Kana means the text is Japanese, not Chinese. Two distinct
/// traditional-only characters decide traditional; two distinct simplified
/// hint characters decide simplified.
pub fn variant_from_text(text: &str) -> Option<Variant> {
    if text.is_empty() {
        return None;
    }
    let cjk: Vec<char> = text.chars().filter(|&ch| is_han(ch)).collect();
    if cjk.is_empty() {
        return None;
    }
    if text.chars().any(is_kana) {
        return Some(Variant::Unknown);
    }
    let trad_hits = cjk
        .iter()
        .filter(|ch| TRADITIONAL_CHARS.contains(**ch))
        .collect::<std::collections::HashSet<_>>()
        .len();
    if trad_hits >= 2 {
        return Some(Variant::Traditional);
    }
    let simp_hits = cjk
        .iter()
        .filter(|ch| SIMPLIFIED_HINT_CHARS.contains(**ch))
        .collect::<std::collections::HashSet<_>>()
        .len();
    if simp_hits >= 2 {
        return Some(Variant::Simplified);
    }
    Some(Variant::Unknown)
}

static STYLE_BLOCKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}|<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Sample the first characters of a subtitle file with markup removed.
pub fn sample_subtitle_text(path: &Path, max_chars: usize) -> String {
    let data = crate::core::srt::read_text_file(path);
    let data: String = data.chars().take(max_chars * 2).collect();
    let data = STYLE_BLOCKS.replace_all(&data, " ");
    let data = WHITESPACE.replace_all(&data, " ");
    data.chars().take(max_chars).collect()
}

/// Character-class histogram confidence that `text` is in `lang`.
///
/// `ja` scores kana plus weighted Han, `zh` scores Han, `en` scores Latin.
pub fn lang_confidence(text: &str, lang: &str) -> f64 {
    if text.is_empty() || lang.is_empty() {
        return 0.0;
    }
    let mut han = 0usize;
    let mut kana = 0usize;
    let mut latin = 0usize;
    for ch in text.chars() {
        if is_kana(ch) {
            kana += 1;
        } else if is_han(ch) {
            han += 1;
        } else if ch.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    let total = (han + kana + latin) as f64;
    if total == 0.0 {
        return 0.0;
    }
    match lang {
        "ja" => (kana as f64 + han as f64 * 0.4) / total,
        "zh" => han as f64 / total,
        "en" => latin as f64 / total,
        _ => 0.0,
    }
}

/// Best language confidence over the hint list.
///
/// Hints are normalized; with no usable hints the candidate set defaults to
/// ja/zh/en.
pub fn reuse_confidence(text: &str, lang_hints: &[&str]) -> f64 {
    let mut candidates: Vec<String> = Vec::new();
    for hint in lang_hints {
        let normalized = normalize_lang_tag(hint);
        if !normalized.is_empty() && !candidates.contains(&normalized) {
            candidates.push(normalized);
        }
    }
    if candidates.is_empty() {
        candidates = vec!["ja".to_string(), "zh".to_string(), "en".to_string()];
    }
    candidates
        .iter()
        .map(|lang| lang_confidence(text, lang))
        .fold(0.0, f64::max)
}

/// Decide an external subtitle's variant from its file name and a content
/// sample. The label is a claim the content can refute: kana inside a
/// "Chinese" file means the label is wrong; a content classification of the
/// opposite script wins over the label.
pub fn describe_external_variant(name: &str, sample: &str, simplified_lang: &str) -> Variant {
    let label_variant = variant_from_label(name, simplified_lang);
    let text_variant = variant_from_text(sample);
    match label_variant {
        Some(labeled @ (Variant::Simplified | Variant::Traditional)) => match text_variant {
            Some(Variant::Unknown) if crate::core::lang::has_kana(sample) => Variant::Unknown,
            Some(content @ (Variant::Simplified | Variant::Traditional)) => content,
            _ => labeled,
        },
        _ => text_variant.unwrap_or(Variant::Unknown),
    }
}

/// An external subtitle file discovered next to a video.
#[derive(Debug, Clone)]
pub struct ExternalSubtitle {
    /// Full path of the sidecar file.
    pub path: PathBuf,
    /// File name.
    pub name: String,
    /// Language guessed from the file name.
    pub language: Option<String>,
}

/// List sidecar subtitle files whose stem matches the video's.
pub fn list_external_subtitles(video_path: &Path) -> Vec<ExternalSubtitle> {
    let Some(folder) = video_path.parent() else {
        return Vec::new();
    };
    let base = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };
    let mut results = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if !SUBTITLE_EXTS.contains(&ext.as_str()) {
            continue;
        }
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        if stem == base || stem.starts_with(&format!("{}.", base)) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let language = crate::core::lang::guess_lang_from_label(&name).map(str::to_string);
            results.push(ExternalSubtitle { path, name, language });
        }
    }
    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}
