//! Per-run audit trail and the rotating process log.
//!
//! Every processing attempt gets a run id, a JSON meta file updated at each
//! stage boundary, and a newline-delimited JSON event log. The process-wide
//! log file rotates at a byte threshold keeping a fixed number of backups.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LogConfig;

/// Epoch seconds now.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Run status recorded in the meta file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run is in progress.
    Running,
    /// The run completed successfully.
    Done,
    /// The run failed.
    Failed,
}

/// Per-run meta file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Run id: `<epoch>-<short hex>`.
    pub run_id: String,
    /// Video path.
    pub path: String,
    /// Current status.
    pub status: RunStatus,
    /// Stage the run is in (or failed in).
    pub stage: String,
    /// Epoch seconds the run started.
    pub started_at: u64,
    /// Epoch seconds the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Event log path for this run.
    pub log_path: String,
}

/// Handle to one run's log and meta files.
pub struct RunLog {
    /// Run id.
    pub run_id: String,
    /// Event log path.
    pub log_path: PathBuf,
    /// Meta file path.
    pub meta_path: PathBuf,
    video_path: String,
    started_at: u64,
    log_cfg: LogConfig,
    file: Mutex<Option<std::fs::File>>,
}

fn short_token(video_path: &Path) -> String {
    let digest = Sha256::digest(video_path.to_string_lossy().as_bytes());
    format!("{:x}", digest)[..8].to_string()
}

impl RunLog {
    /// Start a run: allocate the id and paths and write the initial meta.
    pub fn start(video_path: &Path, out_dir: &Path, log_cfg: &LogConfig) -> Self {
        let started_at = epoch_secs();
        let run_id = format!(
            "{}-{}",
            started_at,
            &uuid::Uuid::new_v4().simple().to_string()[..6]
        );
        let token = short_token(video_path);
        let name = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let log_dir = if log_cfg.dir.is_empty() {
            out_dir.to_path_buf()
        } else {
            PathBuf::from(&log_cfg.dir)
        };
        let log_path = log_dir.join(format!("{}.{}.run.{}.log", name, token, run_id));
        let meta_path = out_dir.join(format!("{}.{}.run.json", name, token));

        let run = Self {
            run_id,
            log_path,
            meta_path,
            video_path: video_path.to_string_lossy().to_string(),
            started_at,
            log_cfg: log_cfg.clone(),
            file: Mutex::new(None),
        };
        run.update(RunStatus::Running, "init", None);
        run
    }

    /// Update the meta file at a stage boundary.
    pub fn update(&self, status: RunStatus, stage: &str, error: Option<&str>) {
        let finished = matches!(status, RunStatus::Done | RunStatus::Failed);
        let meta = RunMeta {
            run_id: self.run_id.clone(),
            path: self.video_path.clone(),
            status,
            stage: stage.to_string(),
            started_at: self.started_at,
            finished_at: finished.then(epoch_secs),
            error: error.map(str::to_string),
            log_path: self.log_path.to_string_lossy().to_string(),
        };
        if let Some(parent) = self.meta_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(content) = serde_json::to_string_pretty(&meta) {
            let _ = std::fs::write(&self.meta_path, content);
        }
    }

    /// Append one structured event to the run log and mirror it into the
    /// rotating process log.
    pub fn event(&self, level: &str, message: &str, fields: serde_json::Value) {
        let mut record = serde_json::json!({
            "ts": epoch_secs(),
            "level": level,
            "message": message,
            "path": self.video_path,
        });
        if let (Some(record_map), Some(field_map)) =
            (record.as_object_mut(), fields.as_object())
        {
            for (key, value) in field_map {
                record_map.insert(key.clone(), value.clone());
            }
        }
        append_process_log(&self.log_cfg, &record);
        let mut guard = self.file.lock().unwrap();
        if guard.is_none() {
            if let Some(parent) = self.log_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            *guard = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
                .ok();
        }
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", record);
        }
    }
}

/// Rotate `path` when it exceeds the configured size, shifting existing
/// backups up by one and dropping the oldest.
pub fn rotate_log_if_needed(path: &Path, cfg: &LogConfig) {
    if cfg.max_backups == 0 || cfg.max_bytes == 0 {
        return;
    }
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    if meta.len() <= cfg.max_bytes {
        return;
    }
    for idx in (1..cfg.max_backups).rev() {
        let src = path.with_extension(format!("log.{}", idx));
        let dst = path.with_extension(format!("log.{}", idx + 1));
        if src.exists() {
            let _ = std::fs::rename(&src, &dst);
        }
    }
    let _ = std::fs::rename(path, path.with_extension("log.1"));
}

/// Append one line to the rotating process log.
pub fn append_process_log(cfg: &LogConfig, record: &serde_json::Value) {
    if cfg.dir.is_empty() {
        return;
    }
    let dir = Path::new(&cfg.dir);
    if std::fs::create_dir_all(dir).is_err() {
        return;
    }
    let path = dir.join(&cfg.file_name);
    rotate_log_if_needed(&path, cfg);
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "{}", record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_meta_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        let run = RunLog::start(&video, dir.path(), &LogConfig::default());

        let content = std::fs::read_to_string(&run.meta_path).unwrap();
        let meta: RunMeta = serde_json::from_str(&content).unwrap();
        assert_eq!(meta.status, RunStatus::Running);
        assert_eq!(meta.stage, "init");
        assert!(meta.finished_at.is_none());

        run.update(RunStatus::Failed, "asr_call", Some("boom"));
        let content = std::fs::read_to_string(&run.meta_path).unwrap();
        let meta: RunMeta = serde_json::from_str(&content).unwrap();
        assert_eq!(meta.status, RunStatus::Failed);
        assert_eq!(meta.stage, "asr_call");
        assert_eq!(meta.error.as_deref(), Some("boom"));
        assert!(meta.finished_at.is_some());
    }

    #[test]
    fn test_events_are_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        let run = RunLog::start(&video, dir.path(), &LogConfig::default());
        run.event("INFO", "start", serde_json::json!({"stage": "probe"}));
        run.event("ERROR", "fail", serde_json::json!({}));

        let content = std::fs::read_to_string(&run.log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], "start");
        assert_eq!(first["stage"], "probe");
    }

    #[test]
    fn test_meta_path_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        let cfg = LogConfig::default();
        let run1 = RunLog::start(&video, dir.path(), &cfg);
        let run2 = RunLog::start(&video, dir.path(), &cfg);
        assert_eq!(run1.meta_path, run2.meta_path);
        assert_ne!(run1.log_path, run2.log_path);
    }

    #[test]
    fn test_log_rotation_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogConfig {
            dir: dir.path().to_string_lossy().to_string(),
            file_name: "worker.log".to_string(),
            max_bytes: 64,
            max_backups: 2,
        };
        let path = dir.path().join("worker.log");

        // Grow past the threshold twice to force two rotations.
        for round in 0..2 {
            std::fs::write(&path, vec![b'x'; 128]).unwrap();
            append_process_log(&cfg, &serde_json::json!({"round": round}));
        }
        assert!(path.with_extension("log.1").exists());
        // The newest file holds only the fresh record.
        let newest = std::fs::read_to_string(&path).unwrap();
        assert!(newest.contains("\"round\":1"));
    }

    #[test]
    fn test_rotation_disabled_when_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LogConfig {
            dir: dir.path().to_string_lossy().to_string(),
            max_bytes: 0,
            ..LogConfig::default()
        };
        let path = dir.path().join(&cfg.file_name);
        std::fs::write(&path, vec![b'x'; 1024]).unwrap();
        rotate_log_if_needed(&path, &cfg);
        assert!(path.exists());
        assert!(!path.with_extension("log.1").exists());
    }
}
