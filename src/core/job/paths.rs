//! On-disk layout of per-video job state.
//!
//! All files for video `N.ext` live in the job's output directory and are
//! named `N[.suffix].*`; only the worker holding the lock for `N` writes
//! them.

use std::path::{Path, PathBuf};

use crate::config::WatcherConfig;

/// Resolved output paths for one video.
#[derive(Debug, Clone)]
pub struct JobPaths {
    /// Video base name without extension.
    pub name: String,
    /// Output directory.
    pub out_dir: PathBuf,
    /// Source-language SRT.
    pub srt: PathBuf,
    /// Terminal success marker.
    pub done: PathBuf,
    /// In-flight lock.
    pub lock: PathBuf,
    /// Raw vendor response dump.
    pub raw_json: PathBuf,
    /// ASR failure state.
    pub asr_failed: PathBuf,
    /// Bilingual SRT.
    pub bilingual: PathBuf,
    /// Plain simplified-target SRT (`N.<lang>.srt`).
    pub simplified_plain: PathBuf,
    /// Pipeline-produced simplified SRT (`N.llm.<lang>.srt`).
    pub simplified_llm: PathBuf,
}

impl JobPaths {
    /// Resolve the layout for `video_path` under the configured output mode.
    pub fn resolve(video_path: &Path, watcher: &WatcherConfig, simplified_lang: &str) -> Self {
        let name = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let out_dir = watcher.output_dir_for(video_path);
        let suffixed = format!("{}{}", name, watcher.output_lang_suffix);
        Self {
            srt: out_dir.join(format!("{}.srt", suffixed)),
            done: out_dir.join(format!("{}.done", suffixed)),
            lock: out_dir.join(format!("{}.lock", suffixed)),
            raw_json: out_dir.join(format!("{}.raw.json", suffixed)),
            asr_failed: out_dir.join(format!("{}.asr_failed", name)),
            bilingual: out_dir.join(format!("{}.bi.srt", name)),
            simplified_plain: out_dir.join(format!("{}.{}.srt", name, simplified_lang)),
            simplified_llm: out_dir.join(format!("{}.llm.{}.srt", name, simplified_lang)),
            name,
            out_dir,
        }
    }

    /// Translated SRT path for a destination language. The simplified target
    /// goes to the `llm` variant so a pre-existing plain file is preserved.
    pub fn translated(&self, dst_lang: &str, simplified_lang: &str) -> PathBuf {
        if dst_lang == simplified_lang {
            self.simplified_llm.clone()
        } else {
            self.out_dir.join(format!("{}.{}.srt", self.name, dst_lang))
        }
    }

    /// Translate-failed log path; per-language when several targets exist.
    pub fn translate_failed(&self, dst_lang: &str, multiple: bool) -> PathBuf {
        if multiple {
            self.out_dir
                .join(format!("{}.translate_failed.{}.log", self.name, dst_lang))
        } else {
            self.out_dir.join(format!("{}.translate_failed.log", self.name))
        }
    }

    /// Debug metadata dump path.
    pub fn metadata_debug(&self) -> PathBuf {
        self.out_dir.join(format!("{}.metadata.json", self.name))
    }
}
