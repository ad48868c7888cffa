//! Discovery of candidate videos: periodic scanning, filesystem events,
//! trigger sentinels and scan signals.
//!
//! All sources funnel into the shared queue through the pending set, so a
//! path never queues twice. The watcher makes no admission decisions beyond
//! the extension check; everything else happens when a worker dequeues the
//! path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::Watcher as _;
use tokio::sync::Notify;
use walkdir::WalkDir;

use crate::config::{Config, VIDEO_EXTS};
use crate::core::queue::{PendingSet, WorkQueue, compute_priority};

/// True when the path carries a watched video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Discovery half of the service: feeds the queue from scans, filesystem
/// events, trigger files and signals.
pub struct FileWatcher {
    config: Arc<Config>,
    queue: Arc<WorkQueue>,
    pending: Arc<PendingSet>,
    /// Signalled by the signal handler (and tests) to force a scan.
    pub scan_wakeup: Arc<Notify>,
}

impl FileWatcher {
    /// Create a watcher over the shared queue and pending set.
    pub fn new(config: Arc<Config>, queue: Arc<WorkQueue>, pending: Arc<PendingSet>) -> Self {
        Self {
            config,
            queue,
            pending,
            scan_wakeup: Arc::new(Notify::new()),
        }
    }

    /// Enqueue a candidate unless it is already pending.
    pub fn enqueue(&self, path: &Path) {
        if !self.pending.insert(path) {
            return;
        }
        let out_dir = self.config.watcher.output_dir_for(path);
        let priority = compute_priority(
            path,
            &out_dir,
            &self.config.subtitle.simplified_lang,
            &self.config.queue,
        );
        self.queue.put(path.to_path_buf(), priority);
    }

    /// Walk every root once, enqueuing all video files. Returns the number
    /// of candidates seen.
    pub fn scan_once(&self, reason: &str) -> usize {
        let mut found = 0usize;
        for root in &self.config.watcher.watch_dirs {
            if self.config.watcher.recursive {
                for entry in WalkDir::new(root).into_iter().flatten() {
                    let path = entry.path();
                    if entry.file_type().is_file() && is_video_file(path) {
                        self.enqueue(path);
                        found += 1;
                    }
                }
            } else {
                let Ok(entries) = std::fs::read_dir(root) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && is_video_file(&path) {
                        self.enqueue(&path);
                        found += 1;
                    }
                }
            }
        }
        if reason != "interval" && found == 0 {
            log::warn!("scan ({}) found no media in {:?}", reason, self.config.watcher.watch_dirs);
        }
        found
    }

    /// Consume a trigger sentinel when one exists in any root. Returns true
    /// when a sentinel was found (and an immediate scan is due).
    pub fn check_trigger_files(&self) -> bool {
        let trigger = &self.config.watcher.trigger_file;
        if trigger.is_empty() {
            return false;
        }
        for root in &self.config.watcher.watch_dirs {
            let path = root.join(trigger);
            if path.exists() {
                let _ = std::fs::remove_file(&path);
                log::info!("trigger file consumed: {}", path.display());
                return true;
            }
        }
        false
    }

    /// Periodic scan loop: trigger files are checked each iteration, the
    /// wakeup channel short-circuits the sleep.
    pub async fn run_scan_loop(&self) {
        loop {
            if self.check_trigger_files() {
                self.scan_once("trigger");
                continue;
            }
            self.scan_once("interval");
            let sleep = tokio::time::sleep(Duration::from_secs(
                self.config.watcher.scan_interval_secs.max(1),
            ));
            tokio::select! {
                _ = sleep => {}
                _ = self.scan_wakeup.notified() => {
                    self.scan_once("signal");
                }
            }
        }
    }

    /// Filesystem-event loop: close-write and move-into events enqueue
    /// candidates as they appear; a trigger sentinel landing in a root runs
    /// a full scan.
    pub async fn run_event_loop(&self) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = match notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| {
                let Ok(event) = result else { return };
                use notify::EventKind;
                use notify::event::{AccessKind, AccessMode, ModifyKind};
                let interesting = matches!(
                    event.kind,
                    EventKind::Create(_)
                        | EventKind::Access(AccessKind::Close(AccessMode::Write))
                        | EventKind::Modify(ModifyKind::Name(_))
                );
                if !interesting {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                log::error!("filesystem watcher unavailable: {}", e);
                return;
            }
        };

        let mode = if self.config.watcher.recursive {
            notify::RecursiveMode::Recursive
        } else {
            notify::RecursiveMode::NonRecursive
        };
        for root in &self.config.watcher.watch_dirs {
            if let Err(e) = watcher.watch(root, mode) {
                log::error!("could not watch {}: {}", root.display(), e);
            }
        }

        while let Some(path) = rx.recv().await {
            let trigger = &self.config.watcher.trigger_file;
            if !trigger.is_empty()
                && path.file_name().map(|n| n.to_string_lossy() == *trigger).unwrap_or(false)
            {
                let _ = std::fs::remove_file(&path);
                log::info!("trigger file event: {}", path.display());
                self.scan_once("trigger");
                continue;
            }
            if path.is_file() && is_video_file(&path) {
                self.enqueue(&path);
            }
        }
    }

    /// Signal loop: SIGHUP and SIGUSR1 both request an immediate scan via
    /// the wakeup channel.
    #[cfg(unix)]
    pub async fn run_signal_loop(&self) {
        use tokio::signal::unix::{SignalKind, signal};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("SIGHUP handler unavailable: {}", e);
                return;
            }
        };
        let mut user1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("SIGUSR1 handler unavailable: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = hangup.recv() => {}
                _ = user1.recv() => {}
            }
            log::info!("scan signal received");
            self.scan_wakeup.notify_one();
        }
    }
}
