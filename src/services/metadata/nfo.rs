//! NFO sidecar parsing (Kodi-style XML next to the video).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::srt::read_text_file;
use crate::services::metadata::similarity::extract_year;

/// Fields pulled from an NFO file.
#[derive(Debug, Clone, Default)]
pub struct NfoInfo {
    /// `tv` or `movie`.
    pub kind: Option<String>,
    /// Show or movie title.
    pub title: Option<String>,
    /// Original-language title.
    pub original_title: Option<String>,
    /// Episode title (episodedetails files).
    pub episode_title: Option<String>,
    /// Release year.
    pub year: Option<i32>,
    /// Season number.
    pub season: Option<i64>,
    /// Episode number.
    pub episode: Option<i64>,
    /// External ids from `uniqueid` elements.
    pub external_ids: BTreeMap<String, String>,
}

/// Locate the NFO for a video: a same-name `.nfo`, or (when allowed) a
/// `tvshow.nfo`/`movie.nfo` in the same directory.
pub fn find_nfo_file(video_path: &Path, same_name_only: bool) -> Option<PathBuf> {
    let same = video_path.with_extension("nfo");
    if same.exists() {
        return Some(same);
    }
    if same_name_only {
        return None;
    }
    let folder = video_path.parent()?;
    for name in ["tvshow.nfo", "movie.nfo"] {
        let path = folder.join(name);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn text_of(doc: &roxmltree::Document<'_>, tag: &str) -> Option<String> {
    doc.descendants()
        .find(|node| node.has_tag_name(tag))
        .and_then(|node| node.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Parse an NFO document. Malformed XML yields `None`; individual missing
/// fields are simply absent.
pub fn parse_nfo(content: &str) -> Option<NfoInfo> {
    let doc = roxmltree::Document::parse(content.trim_start_matches('\u{feff}')).ok()?;
    let root_tag = doc.root_element().tag_name().name().to_lowercase();

    let mut info = NfoInfo::default();
    let title = text_of(&doc, "title");
    let show_title = text_of(&doc, "showtitle");
    info.original_title = text_of(&doc, "originaltitle");

    match root_tag.as_str() {
        "tvshow" => info.kind = Some("tv".to_string()),
        "movie" => info.kind = Some("movie".to_string()),
        "episodedetails" => {
            info.kind = Some("tv".to_string());
            info.episode_title = title.clone();
        }
        _ => {}
    }

    info.title = if root_tag == "episodedetails" && show_title.is_some() {
        show_title
    } else {
        title.or(show_title)
    };

    let year_text = text_of(&doc, "year")
        .or_else(|| text_of(&doc, "premiered"))
        .or_else(|| text_of(&doc, "firstaired"));
    info.year = year_text.as_deref().and_then(extract_year);
    info.season = text_of(&doc, "season").and_then(|s| s.parse().ok());
    info.episode = text_of(&doc, "episode").and_then(|s| s.parse().ok());

    for node in doc.descendants().filter(|n| n.has_tag_name("uniqueid")) {
        let key = node.attribute("type").unwrap_or("").to_lowercase();
        let value = node.text().unwrap_or("").trim();
        if !key.is_empty() && !value.is_empty() {
            info.external_ids.insert(key, value.to_string());
        }
    }
    if let Some(imdb) = text_of(&doc, "imdbid") {
        info.external_ids.entry("imdb".to_string()).or_insert(imdb);
    }
    if let Some(tmdb) = text_of(&doc, "tmdbid") {
        info.external_ids.entry("tmdb".to_string()).or_insert(tmdb);
    }

    Some(info)
}

/// Load the NFO next to a video, when the feature is enabled.
pub fn load_nfo_info(
    video_path: &Path,
    enabled: bool,
    same_name_only: bool,
) -> Option<(NfoInfo, PathBuf)> {
    if !enabled {
        return None;
    }
    let nfo_path = find_nfo_file(video_path, same_name_only)?;
    let content = read_text_file(&nfo_path);
    let info = parse_nfo(&content)?;
    Some((info, nfo_path))
}
