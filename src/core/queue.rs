//! Priority work queue and the shared pending set.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::config::QueueConfig;

/// Priority classes; lower values are served sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

/// One queued work item: `(priority, seq, path)`. The monotonically
/// increasing `seq` preserves arrival order within a priority class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    priority: Priority,
    seq: u64,
    path: PathBuf,
}

/// Min-priority queue of candidate video paths.
#[derive(Debug, Default)]
pub struct WorkQueue {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    seq: AtomicU64,
    notify: Notify,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a path at the given priority.
    pub fn put(&self, path: PathBuf, priority: Priority) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().unwrap().push(Reverse(Entry {
            priority,
            seq,
            path,
        }));
        self.notify.notify_one();
    }

    /// Dequeue the next path, waiting until one is available.
    pub async fn take(&self) -> PathBuf {
        loop {
            if let Some(Reverse(entry)) = self.heap.lock().unwrap().pop() {
                return entry.path;
            }
            self.notify.notified().await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_take(&self) -> Option<PathBuf> {
        self.heap.lock().unwrap().pop().map(|Reverse(entry)| entry.path)
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Paths currently queued or in flight, shared between the watcher and the
/// workers so duplicates are not re-enqueued.
#[derive(Debug, Default)]
pub struct PendingSet {
    inner: Mutex<HashSet<PathBuf>>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path; returns false when it was already pending.
    pub fn insert(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().insert(path.to_path_buf())
    }

    /// Remove a path once its job has finished or been skipped.
    pub fn remove(&self, path: &Path) {
        self.inner.lock().unwrap().remove(path);
    }

    /// True when the path is queued or in flight.
    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().contains(path)
    }
}

/// Compute the priority class for a candidate path.
///
/// A translate-failed log boosts the file to the failed class; a missing
/// simplified-target SRT ranks next; everything else is default. With the
/// priority feature disabled everything is default.
pub fn compute_priority(
    path: &Path,
    out_dir: &Path,
    simplified_lang: &str,
    cfg: &QueueConfig,
) -> Priority {
    if !cfg.priority_enabled {
        return Priority(cfg.priority_default);
    }
    let base = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return Priority(cfg.priority_default),
    };
    if has_translate_failed(out_dir, &base) {
        return Priority(cfg.priority_failed);
    }
    if !has_simplified_target(out_dir, &base, simplified_lang) {
        return Priority(cfg.priority_missing_target);
    }
    Priority(cfg.priority_default)
}

fn has_translate_failed(out_dir: &Path, base: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(out_dir) else {
        return false;
    };
    let prefix = format!("{}.translate_failed", base);
    entries.flatten().any(|entry| {
        entry
            .file_name()
            .to_string_lossy()
            .starts_with(prefix.as_str())
    })
}

fn has_simplified_target(out_dir: &Path, base: &str, simplified_lang: &str) -> bool {
    if simplified_lang.is_empty() {
        return true;
    }
    let plain = out_dir.join(format!("{}.{}.srt", base, simplified_lang));
    let llm = out_dir.join(format!("{}.llm.{}.srt", base, simplified_lang));
    plain.exists() || llm.exists()
}
