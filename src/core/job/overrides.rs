//! Operator override file (`N.job.json`) next to the video.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::{AsrMode, SegmentMode};

/// Parsed overrides; every field is optional and falls back to the
/// configured default.
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    /// Recognition mode override.
    pub asr_mode: Option<AsrMode>,
    /// Segmentation mode override.
    pub segment_mode: Option<SegmentMode>,
    /// Process even when a simplified subtitle exists.
    pub ignore_simplified_subtitle: Option<bool>,
    /// Load an existing non-target subtitle instead of recognising.
    pub use_existing_subtitle: Option<bool>,
    /// Run once ignoring the done marker; consumed after the run.
    pub force_once: bool,
    /// Ignore existing subtitles and generated SRTs, always recognise.
    pub force_asr: bool,
    /// Translate even below the minimum duration.
    pub force_translate: bool,
}

/// Path of the override file for a video.
pub fn override_path(video_path: &Path) -> PathBuf {
    let name = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    video_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}.job.json", name))
}

/// Tolerant boolean parsing: JSON booleans, and the usual string spellings.
fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        Value::Number(n) => Some(n.as_i64() == Some(1)),
        _ => None,
    }
}

fn parse_asr_mode(value: &Value) -> Option<AsrMode> {
    match value.as_str()?.trim().to_lowercase().as_str() {
        "offline" => Some(AsrMode::Offline),
        "realtime" => Some(AsrMode::Realtime),
        "auto" => Some(AsrMode::Auto),
        _ => None,
    }
}

fn parse_segment_mode(value: &Value) -> Option<SegmentMode> {
    match value.as_str()?.trim().to_lowercase().as_str() {
        "auto" => Some(SegmentMode::Auto),
        "post" => Some(SegmentMode::Post),
        _ => None,
    }
}

/// Load overrides for a video. A missing or malformed file is the empty
/// override set, never an error.
pub fn load_overrides(video_path: &Path) -> JobOverrides {
    let path = override_path(video_path);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return JobOverrides::default();
    };
    let Ok(data) = serde_json::from_str::<Value>(&content) else {
        return JobOverrides::default();
    };
    if !data.is_object() {
        return JobOverrides::default();
    }

    JobOverrides {
        asr_mode: data.get("asr_mode").and_then(parse_asr_mode),
        segment_mode: data.get("segment_mode").and_then(parse_segment_mode),
        ignore_simplified_subtitle: data
            .get("ignore_simplified_subtitle")
            .and_then(parse_bool),
        use_existing_subtitle: data.get("use_existing_subtitle").and_then(parse_bool),
        force_once: data
            .get("force_once")
            .and_then(parse_bool)
            .unwrap_or(false),
        force_asr: data.get("force_asr").and_then(parse_bool).unwrap_or(false),
        force_translate: data
            .get("force_translate")
            .and_then(parse_bool)
            .unwrap_or(false),
    }
}

/// Remove the override file after a `force_once` run.
pub fn consume_override(video_path: &Path) {
    let path = override_path(video_path);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            log::warn!("could not remove override file {}: {}", path.display(), e);
        } else {
            log::info!("consumed force_once override: {}", path.display());
        }
    }
}
