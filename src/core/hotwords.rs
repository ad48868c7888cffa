//! Hotword list construction for recognition vocabularies.

use serde::Serialize;

use crate::config::HotwordConfig;
use crate::core::glossary::Glossary;
use crate::core::lang::{has_kana, has_han, has_latin, is_ascii_text, normalize_lang_for_asr};
use crate::core::srt::sanitize_text;
use crate::services::metadata::WorkMetadata;

/// One weighted vocabulary entry in vendor format.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HotwordItem {
    /// The phrase to bias.
    pub text: String,
    /// Bias weight in 1..=5.
    pub weight: i32,
    /// Language code, when the list is single-language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Drop hotwords whose script does not match the recognition language.
///
/// An empty filter result falls back to the unfiltered list so a bad guess
/// never silently discards the vocabulary.
pub fn filter_by_lang(
    hotwords: Vec<String>,
    src_lang: &str,
    cfg: &HotwordConfig,
    language_hints: &[String],
) -> Vec<String> {
    if hotwords.is_empty() {
        return hotwords;
    }
    if cfg.allow_mixed && language_hints.is_empty() {
        return hotwords;
    }
    if cfg.langs.is_empty() {
        return hotwords;
    }
    let lang = normalize_lang_for_asr(src_lang);
    let allowed: std::collections::HashSet<String> = cfg
        .langs
        .iter()
        .map(|l| normalize_lang_for_asr(l))
        .collect();
    if lang != "auto" && !allowed.contains(&lang) {
        return Vec::new();
    }

    let filtered: Vec<String> = hotwords
        .iter()
        .filter(|word| !word.is_empty())
        .filter(|word| match lang.as_str() {
            "ja" => has_kana(word),
            "zh" => has_han(word),
            "en" => has_latin(word),
            _ => true,
        })
        .cloned()
        .collect();
    if filtered.is_empty() { hotwords } else { filtered }
}

/// Build the hotword list for one job from title aliases, glossary keys and
/// metadata character names, cleaned, de-duplicated, filtered and capped.
pub fn build_hotwords(
    metadata: Option<&WorkMetadata>,
    glossary: &Glossary,
    title_aliases: &[String],
    src_lang: &str,
    cfg: &HotwordConfig,
    language_hints: &[String],
) -> Vec<String> {
    if !cfg.enabled {
        return Vec::new();
    }
    let mut hotwords: Vec<String> = Vec::new();

    if cfg.use_title_aliases {
        hotwords.extend(title_aliases.iter().cloned());
    }
    if cfg.use_glossary {
        hotwords.extend(glossary.keys().cloned());
    }
    if cfg.use_metadata {
        if let Some(metadata) = metadata {
            for character in &metadata.characters {
                hotwords.push(character.name_original.clone());
                if let Some(alias) = character.alias_for(src_lang) {
                    hotwords.push(alias.to_string());
                }
            }
        }
    }

    let mut cleaned = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for word in hotwords {
        let word = sanitize_text(&word).trim().to_string();
        if word.is_empty() || !seen.insert(word.clone()) {
            continue;
        }
        cleaned.push(word);
    }

    let mut cleaned = filter_by_lang(cleaned, src_lang, cfg, language_hints);
    if cfg.max > 0 {
        cleaned.truncate(cfg.max);
    }
    cleaned
}

/// Vendor-side length rules: ASCII phrases at most 7 space-separated
/// segments, everything else at most 15 characters.
pub fn valid_hotword_text(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if is_ascii_text(text) {
        text.split(' ').filter(|s| !s.is_empty()).count() <= 7
    } else {
        text.chars().count() <= 15
    }
}

fn hotword_lang_code(src_lang: &str) -> Option<String> {
    let lang = normalize_lang_for_asr(src_lang);
    if matches!(lang.as_str(), "ja" | "en" | "zh") {
        Some(lang)
    } else {
        None
    }
}

fn language_hints_allow(lang: &str, language_hints: &[String]) -> bool {
    if language_hints.is_empty() {
        return true;
    }
    language_hints
        .iter()
        .any(|hint| normalize_lang_for_asr(hint) == lang)
}

/// Convert the hotword list into weighted vendor items.
///
/// Returns an empty list when the list language is outside the configured
/// language hints.
pub fn build_hotword_items(
    hotwords: &[String],
    src_lang: &str,
    cfg: &HotwordConfig,
    language_hints: &[String],
) -> Vec<HotwordItem> {
    let mut lang = hotword_lang_code(src_lang);
    if cfg.allow_mixed && language_hints.is_empty() {
        lang = None;
    }
    if let Some(lang) = lang.as_deref() {
        if !language_hints_allow(lang, language_hints) {
            return Vec::new();
        }
    }
    let weight = cfg.weight.clamp(1, 5);
    hotwords
        .iter()
        .filter(|word| valid_hotword_text(word))
        .map(|word| HotwordItem {
            text: word.clone(),
            weight,
            lang: lang.clone(),
        })
        .collect()
}
