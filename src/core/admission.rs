//! Per-file admission: skip predicates, stability probing and lock handling.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::core::job::paths::JobPaths;

/// Why a dequeued path was not admitted into the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The done marker exists.
    DoneExists,
    /// The source SRT already exists in a separate output directory.
    SrtExists,
    /// A fresh lock is held by another worker or process.
    LockExists,
    /// The failure count reached the fatal threshold.
    AsrFailedFatal,
    /// Failure state exists and no cooldown is configured.
    AsrFailed,
    /// Failure state exists and the cooldown has not elapsed.
    AsrFailedRecent,
    /// The file is still growing or below the minimum size.
    Unstable,
}

impl SkipReason {
    /// Stable string used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DoneExists => "done_exists",
            SkipReason::SrtExists => "srt_exists",
            SkipReason::LockExists => "lock_exists",
            SkipReason::AsrFailedFatal => "asr_failed_fatal",
            SkipReason::AsrFailed => "asr_failed",
            SkipReason::AsrFailedRecent => "asr_failed_recent",
            SkipReason::Unstable => "unstable",
        }
    }
}

/// Persisted ASR failure state (`N.asr_failed`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrFailState {
    /// Consecutive failure count.
    #[serde(default)]
    pub count: u32,
    /// Epoch seconds of the last failure.
    #[serde(default)]
    pub ts: u64,
    /// Stage the failure occurred in.
    #[serde(default)]
    pub stage: String,
    /// Error message.
    #[serde(default)]
    pub error: String,
    /// Retries are disabled until the operator intervenes.
    #[serde(default)]
    pub fatal: bool,
}

/// Load failure state; unreadable or malformed files count as empty.
pub fn load_fail_state(path: &Path) -> AsrFailState {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

/// Persist failure state; errors are swallowed, the state file is advisory.
pub fn save_fail_state(path: &Path, state: &AsrFailState) {
    if let Ok(content) = serde_json::to_string_pretty(state) {
        let _ = std::fs::write(path, content);
    }
}

fn mtime_age_secs(path: &Path) -> Option<u64> {
    let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now()
        .duration_since(mtime)
        .ok()
        .map(|age| age.as_secs())
}

/// True when the lock's mtime is older than the TTL.
pub fn is_lock_stale(lock_path: &Path, ttl_secs: u64) -> bool {
    mtime_age_secs(lock_path)
        .map(|age| age > ttl_secs)
        .unwrap_or(false)
}

/// Create the lock with exclusive-create semantics. The file content is the
/// acquisition epoch. Returns false when the lock already exists.
pub fn create_lock(lock_path: &Path) -> bool {
    use std::io::Write;
    let result = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path);
    match result {
        Ok(mut file) => {
            let epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let _ = write!(file, "{}", epoch);
            true
        }
        Err(_) => false,
    }
}

/// Remove the lock; a missing file is fine.
pub fn remove_lock(lock_path: &Path) {
    let _ = std::fs::remove_file(lock_path);
}

/// Size-stability probe: the file must be at least `min_bytes` and keep its
/// size across the dwell.
pub async fn is_stable_file(path: &Path, min_bytes: u64, dwell_secs: u64) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let size1 = meta.len();
    if size1 < min_bytes {
        return false;
    }
    tokio::time::sleep(Duration::from_secs(dwell_secs)).await;
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() == size1,
        Err(_) => false,
    }
}

/// Run the admission predicates for a dequeued path.
///
/// Returns the first matching skip reason, or `None` when the path may
/// proceed to lock acquisition. A stale lock and an expired failure cooldown
/// are removed as side effects.
pub fn should_skip(paths: &JobPaths, config: &Config, force_once: bool) -> Option<SkipReason> {
    if !force_once && paths.done.exists() {
        return Some(SkipReason::DoneExists);
    }
    if !force_once && paths.srt.exists() && !config.watcher.output_to_source_dir {
        return Some(SkipReason::SrtExists);
    }
    if paths.lock.exists() {
        if is_lock_stale(&paths.lock, config.queue.lock_ttl_secs) {
            log::info!("removing stale lock: {}", paths.lock.display());
            remove_lock(&paths.lock);
        } else {
            return Some(SkipReason::LockExists);
        }
    }
    if !force_once && paths.asr_failed.exists() {
        let state = load_fail_state(&paths.asr_failed);
        if state.fatal
            || (config.asr.max_failures > 0 && state.count >= config.asr.max_failures)
        {
            return Some(SkipReason::AsrFailedFatal);
        }
        if config.asr.fail_cooldown_secs == 0 {
            return Some(SkipReason::AsrFailed);
        }
        let age = mtime_age_secs(&paths.asr_failed).unwrap_or(0);
        if age < config.asr.fail_cooldown_secs {
            return Some(SkipReason::AsrFailedRecent);
        }
        let _ = std::fs::remove_file(&paths.asr_failed);
    }
    None
}
