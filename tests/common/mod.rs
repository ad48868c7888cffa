//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use subwatch::config::{Config, WatcherConfig};
use subwatch::core::job::JobServices;
use subwatch::services::chat::ChatModel;
use subwatch::services::media::{MediaInfo, MediaToolkit};
use subwatch::services::translate::MemoryCache;

/// Configuration rooted in a temp directory: outputs next to the source,
/// no stability dwell, tiny minimum size.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config {
        watcher: WatcherConfig {
            watch_dirs: vec![root.to_path_buf()],
            out_dir: root.join("out"),
            tmp_dir: root.join("tmp"),
            min_bytes: 1,
            stability_dwell_secs: 0,
            ..WatcherConfig::default()
        },
        ..Config::default()
    };
    config.translate.enabled = false;
    std::fs::create_dir_all(&config.watcher.tmp_dir).unwrap();
    std::fs::create_dir_all(&config.watcher.out_dir).unwrap();
    config
}

/// Media toolkit that serves a canned probe result and fails everything
/// that would need a real ffmpeg.
pub struct StubMedia {
    pub info: MediaInfo,
    pub extract_wav_calls: AtomicUsize,
}

impl StubMedia {
    pub fn empty() -> Self {
        Self {
            info: MediaInfo::default(),
            extract_wav_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaToolkit for StubMedia {
    async fn probe(&self, _path: &Path) -> MediaInfo {
        MediaInfo {
            audio_tracks: self.info.audio_tracks.clone(),
            subtitle_tracks: self.info.subtitle_tracks.clone(),
        }
    }

    async fn extract_wav(
        &self,
        _video: &Path,
        wav: &Path,
        _stream_index: Option<i64>,
        _sample_rate: u32,
    ) -> subwatch::Result<()> {
        self.extract_wav_calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(wav, b"")?;
        Ok(())
    }

    async fn extract_subtitle(
        &self,
        _video: &Path,
        _stream_index: i64,
        _out: &Path,
    ) -> subwatch::Result<()> {
        Err(subwatch::error::SubWatchError::media_tool(
            "no ffmpeg in tests",
        ))
    }

    async fn convert_subtitle(&self, _input: &Path, _out: &Path) -> subwatch::Result<()> {
        Err(subwatch::error::SubWatchError::media_tool(
            "no ffmpeg in tests",
        ))
    }

    async fn duration_seconds(&self, _path: &Path) -> Option<f64> {
        None
    }
}

/// Chat model that counts calls and answers with a fixed line.
pub struct CountingChat {
    pub calls: AtomicUsize,
    pub reply: String,
}

impl CountingChat {
    pub fn new(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for CountingChat {
    async fn complete(&self, _system: &str, _user: &str) -> subwatch::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// A service graph with no recognizer, no chat and no store: anything that
/// reaches a network capability fails loudly.
pub fn offline_services(config: Config, media: Arc<StubMedia>) -> JobServices {
    JobServices {
        config: Arc::new(config),
        media,
        recognizer: None,
        vocabulary: None,
        store: None,
        chat: None,
        cache: Arc::new(MemoryCache::new()),
        metadata: None,
    }
}

/// Write a minimal valid SRT next to the test video.
pub fn write_srt(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
}

/// A video file that passes the stability probe.
pub fn write_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; 64]).unwrap();
    path
}
