//! Queue ordering: failed translations outrank missing targets outrank
//! everything else, FIFO within a class.

mod common;

use std::sync::Arc;

use common::{test_config, write_video};
use subwatch::core::queue::{PendingSet, Priority, WorkQueue, compute_priority};
use subwatch::watcher::FileWatcher;

#[test]
fn translate_failed_log_boosts_priority() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    // A default video with its simplified target already produced.
    let done_video = write_video(dir.path(), "done.S01E01.mkv");
    std::fs::write(dir.path().join("done.S01E01.llm.zh.srt"), "1\n").unwrap();
    // A video whose translation failed previously.
    let failed_video = write_video(dir.path(), "show.S01E02.mkv");
    std::fs::write(dir.path().join("show.S01E02.translate_failed.zh.log"), "x").unwrap();
    // A fresh video with no outputs at all.
    let fresh_video = write_video(dir.path(), "fresh.S01E03.mkv");

    let failed = compute_priority(&failed_video, dir.path(), "zh", &config.queue);
    let missing = compute_priority(&fresh_video, dir.path(), "zh", &config.queue);
    let default = compute_priority(&done_video, dir.path(), "zh", &config.queue);
    assert_eq!(failed, Priority(config.queue.priority_failed));
    assert_eq!(missing, Priority(config.queue.priority_missing_target));
    assert_eq!(default, Priority(config.queue.priority_default));
    assert!(failed < missing);
    assert!(missing < default);
}

#[test]
fn failed_item_dequeues_before_earlier_default_items() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let default_video = write_video(dir.path(), "default.mkv");
    std::fs::write(dir.path().join("default.llm.zh.srt"), "1\n").unwrap();
    let failed_video = write_video(dir.path(), "show.S01E02.mkv");
    std::fs::write(dir.path().join("show.S01E02.translate_failed.zh.log"), "x").unwrap();

    let queue = Arc::new(WorkQueue::new());
    let pending = Arc::new(PendingSet::new());
    let watcher = FileWatcher::new(Arc::new(config), queue.clone(), pending);

    // Enqueue the default item first; the failed one must still win.
    watcher.enqueue(&default_video);
    watcher.enqueue(&failed_video);

    assert_eq!(queue.try_take().unwrap(), failed_video);
    assert_eq!(queue.try_take().unwrap(), default_video);
}

#[test]
fn disabled_priority_degrades_to_fifo() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.queue.priority_enabled = false;

    let a = write_video(dir.path(), "a.mkv");
    let b = write_video(dir.path(), "b.mkv");
    std::fs::write(dir.path().join("b.translate_failed.log"), "x").unwrap();

    let queue = Arc::new(WorkQueue::new());
    let watcher = FileWatcher::new(
        Arc::new(config),
        queue.clone(),
        Arc::new(PendingSet::new()),
    );
    watcher.enqueue(&a);
    watcher.enqueue(&b);

    assert_eq!(queue.try_take().unwrap(), a);
    assert_eq!(queue.try_take().unwrap(), b);
}
