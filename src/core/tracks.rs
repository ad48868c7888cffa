//! Track descriptors and audio/subtitle track selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{AudioConfig, SubtitleConfig, SubtitleMode};
use crate::core::lang::normalize_lang;

/// An audio stream inside a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Container stream index.
    pub index: i64,
    /// Language tag from the container.
    pub language: Option<String>,
    /// Track title.
    pub title: Option<String>,
    /// Codec name.
    pub codec: Option<String>,
    /// Channel count.
    pub channels: Option<i64>,
    /// Container default-track disposition.
    pub is_default: bool,
    /// Forced disposition.
    pub is_forced: bool,
}

/// Where a subtitle track lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleKind {
    /// A stream inside the video container.
    Embedded,
    /// A sidecar file next to the video.
    External,
}

/// A subtitle stream or external sidecar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Container stream index; -1 for external files.
    pub index: i64,
    /// Language tag.
    pub language: Option<String>,
    /// Track title or file name.
    pub title: Option<String>,
    /// Codec name or file extension.
    pub codec: Option<String>,
    /// Container default-track disposition.
    pub is_default: bool,
    /// Forced disposition.
    pub is_forced: bool,
    /// Bitmap subtitle formats are never reused.
    pub is_image_based: bool,
    /// Embedded stream or external file.
    pub kind: SubtitleKind,
    /// Path of the external file.
    pub path: Option<PathBuf>,
}

/// Codec names of bitmap subtitle formats.
pub fn is_image_based_codec(codec: &str) -> bool {
    matches!(
        codec.to_lowercase().as_str(),
        "hdmv_pgs_subtitle" | "pgs" | "dvd_subtitle" | "vobsub" | "dvb_subtitle" | "xsub"
    )
}

fn is_excluded_title(title: Option<&str>, keywords: &[String]) -> bool {
    let Some(title) = title else { return false };
    let lower = title.to_lowercase();
    keywords.iter().any(|kw| lower.contains(&kw.to_lowercase()))
}

fn lang_rank(lang: Option<&str>, prefer_langs: &[String]) -> usize {
    let Some(lang) = lang else {
        return prefer_langs.len() + 1;
    };
    if lang.is_empty() {
        return prefer_langs.len() + 1;
    }
    let norm = normalize_lang(lang);
    for (i, pref) in prefer_langs.iter().enumerate() {
        if norm.starts_with(&normalize_lang(pref)) {
            return i;
        }
    }
    prefer_langs.len()
}

/// Pick the audio track to extract.
///
/// An explicit index short-circuits; an explicit language restricts the
/// candidates (falling back to all when nothing matches); excluded titles are
/// dropped unless that would empty the list; the rest is a lexicographic
/// sort on `(lang_rank, default_first, -channels, index)`.
pub fn select_audio(tracks: &[AudioTrack], cfg: &AudioConfig) -> Option<AudioTrack> {
    if tracks.is_empty() {
        return None;
    }
    if let Some(index) = cfg.index {
        if let Some(track) = tracks.iter().find(|t| t.index == index) {
            return Some(track.clone());
        }
    }

    let mut candidates: Vec<&AudioTrack> = tracks.iter().collect();
    if let Some(lang) = cfg.lang.as_deref() {
        let norm = normalize_lang(lang);
        let filtered: Vec<&AudioTrack> = tracks
            .iter()
            .filter(|t| {
                t.language
                    .as_deref()
                    .map(|l| normalize_lang(l).starts_with(&norm))
                    .unwrap_or(false)
            })
            .collect();
        if !filtered.is_empty() {
            candidates = filtered;
        }
    }

    let filtered: Vec<&AudioTrack> = candidates
        .iter()
        .copied()
        .filter(|t| !is_excluded_title(t.title.as_deref(), &cfg.exclude_titles))
        .collect();
    if !filtered.is_empty() {
        candidates = filtered;
    }

    candidates.sort_by_key(|t| {
        (
            lang_rank(t.language.as_deref(), &cfg.prefer_langs),
            if t.is_default { 0 } else { 1 },
            -t.channels.unwrap_or(2),
            t.index,
        )
    });
    candidates.first().map(|t| (*t).clone())
}

fn choose_by_lang<'a>(
    tracks: &[&'a SubtitleTrack],
    langs: &[String],
    exclude_titles: &[String],
) -> Option<&'a SubtitleTrack> {
    let mut filtered: Vec<&SubtitleTrack> = tracks
        .iter()
        .copied()
        .filter(|t| !is_excluded_title(t.title.as_deref(), exclude_titles))
        .collect();
    if filtered.is_empty() {
        filtered = tracks.to_vec();
    }
    filtered.sort_by_key(|t| {
        (
            lang_rank(t.language.as_deref(), langs),
            if t.is_default { 0 } else { 1 },
            t.index,
        )
    });
    filtered.first().copied()
}

/// Pick the subtitle track to inspect or reuse.
///
/// In `reuse_if_good` mode the destination-language preference list is tried
/// first, so an existing translated subtitle wins over a source-language one.
/// Image-based tracks are kept as candidates only when every candidate is
/// image-based (a `reference`-mode selection may still report them).
pub fn select_subtitle(
    tracks: &[SubtitleTrack],
    cfg: &SubtitleConfig,
    audio_lang: Option<&str>,
) -> Option<SubtitleTrack> {
    if cfg.mode == SubtitleMode::Ignore || tracks.is_empty() {
        return None;
    }

    if let Some(index) = cfg.index {
        if let Some(track) = tracks.iter().find(|t| t.index == index) {
            return Some(track.clone());
        }
    }

    let mut candidates: Vec<&SubtitleTrack> = tracks.iter().collect();
    if let Some(lang) = cfg.lang.as_deref() {
        let norm = normalize_lang(lang);
        let filtered: Vec<&SubtitleTrack> = candidates
            .iter()
            .copied()
            .filter(|t| {
                t.language
                    .as_deref()
                    .map(|l| normalize_lang(l).starts_with(&norm))
                    .unwrap_or(false)
            })
            .collect();
        if !filtered.is_empty() {
            candidates = filtered;
        }
    }

    let text_tracks: Vec<&SubtitleTrack> = candidates
        .iter()
        .copied()
        .filter(|t| !t.is_image_based)
        .collect();
    if !text_tracks.is_empty() {
        candidates = text_tracks;
    }

    if cfg.mode == SubtitleMode::ReuseIfGood {
        if let Some(best) = choose_by_lang(&candidates, &cfg.prefer_langs_dst, &cfg.exclude_titles)
        {
            return Some(best.clone());
        }
    }

    let src_langs: Vec<String> = if cfg.prefer_langs_src.is_empty() {
        audio_lang.map(|l| vec![l.to_string()]).unwrap_or_default()
    } else {
        cfg.prefer_langs_src.clone()
    };
    choose_by_lang(&candidates, &src_langs, &cfg.exclude_titles).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(index: i64, lang: Option<&str>, channels: i64, is_default: bool) -> AudioTrack {
        AudioTrack {
            index,
            language: lang.map(str::to_string),
            title: None,
            codec: Some("aac".into()),
            channels: Some(channels),
            is_default,
            is_forced: false,
        }
    }

    fn sub(index: i64, lang: Option<&str>, image: bool) -> SubtitleTrack {
        SubtitleTrack {
            index,
            language: lang.map(str::to_string),
            title: None,
            codec: Some(if image { "hdmv_pgs_subtitle" } else { "subrip" }.into()),
            is_default: false,
            is_forced: false,
            is_image_based: image,
            kind: SubtitleKind::Embedded,
            path: None,
        }
    }

    fn audio_cfg(prefer: &[&str]) -> AudioConfig {
        AudioConfig {
            prefer_langs: prefer.iter().map(|s| s.to_string()).collect(),
            ..AudioConfig::default()
        }
    }

    #[test]
    fn test_audio_prefers_language_then_default_then_channels() {
        let tracks = vec![
            audio(0, Some("eng"), 2, false),
            audio(1, Some("jpn"), 2, false),
            audio(2, Some("jpn"), 6, false),
        ];
        let cfg = audio_cfg(&["ja", "en"]);
        let selected = select_audio(&tracks, &cfg).unwrap();
        assert_eq!(selected.index, 2);
    }

    #[test]
    fn test_audio_default_breaks_lang_tie() {
        let tracks = vec![
            audio(0, Some("jpn"), 2, false),
            audio(1, Some("jpn"), 2, true),
        ];
        let cfg = audio_cfg(&["ja"]);
        assert_eq!(select_audio(&tracks, &cfg).unwrap().index, 1);
    }

    #[test]
    fn test_audio_explicit_index_short_circuits() {
        let tracks = vec![audio(0, Some("jpn"), 6, true), audio(3, Some("eng"), 2, false)];
        let cfg = AudioConfig {
            index: Some(3),
            ..audio_cfg(&["ja"])
        };
        assert_eq!(select_audio(&tracks, &cfg).unwrap().index, 3);
    }

    #[test]
    fn test_audio_excluded_title_kept_when_only_option() {
        let mut track = audio(0, Some("jpn"), 2, false);
        track.title = Some("Commentary".into());
        let cfg = AudioConfig {
            exclude_titles: vec!["commentary".into()],
            ..audio_cfg(&["ja"])
        };
        assert_eq!(select_audio(&[track], &cfg).unwrap().index, 0);
    }

    #[test]
    fn test_audio_excluded_title_deprioritised() {
        let mut commentary = audio(0, Some("jpn"), 6, true);
        commentary.title = Some("Director Commentary".into());
        let main = audio(1, Some("jpn"), 2, false);
        let cfg = AudioConfig {
            exclude_titles: vec!["commentary".into()],
            ..audio_cfg(&["ja"])
        };
        assert_eq!(select_audio(&[commentary, main], &cfg).unwrap().index, 1);
    }

    #[test]
    fn test_subtitle_reuse_prefers_dst_language() {
        let tracks = vec![sub(0, Some("jpn"), false), sub(1, Some("chi"), false)];
        let cfg = SubtitleConfig {
            prefer_langs_src: vec!["ja".into()],
            prefer_langs_dst: vec!["zh".into(), "chi".into()],
            ..SubtitleConfig::default()
        };
        let selected = select_subtitle(&tracks, &cfg, Some("jpn")).unwrap();
        assert_eq!(selected.index, 1);
    }

    #[test]
    fn test_subtitle_image_based_rejected_when_text_exists() {
        let tracks = vec![sub(0, Some("chi"), true), sub(1, Some("jpn"), false)];
        let cfg = SubtitleConfig::default();
        let selected = select_subtitle(&tracks, &cfg, Some("jpn")).unwrap();
        assert!(!selected.is_image_based);
    }

    #[test]
    fn test_subtitle_ignore_mode_returns_none() {
        let tracks = vec![sub(0, Some("chi"), false)];
        let cfg = SubtitleConfig {
            mode: SubtitleMode::Ignore,
            ..SubtitleConfig::default()
        };
        assert!(select_subtitle(&tracks, &cfg, None).is_none());
    }

    #[test]
    fn test_image_based_codec_detection() {
        assert!(is_image_based_codec("hdmv_pgs_subtitle"));
        assert!(is_image_based_codec("DVD_SUBTITLE"));
        assert!(!is_image_based_codec("subrip"));
        assert!(!is_image_based_codec("ass"));
    }
}
