//! Service construction and the long-running daemon loop.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::Result;
use crate::config::Config;
use crate::core::job::{JobServices, process_video};
use crate::core::queue::{PendingSet, WorkQueue};
use crate::services::asr::{HttpRecognizer, HttpVocabularyService, Recognizer, VocabularyService};
use crate::services::chat::{ChatClient, ChatModel};
use crate::services::media::{FfmpegTool, MediaToolkit};
use crate::services::metadata::MetadataService;
use crate::services::rate_limit::RateLimiter;
use crate::services::storage::{HttpObjectStore, ObjectStore};
use crate::services::translate::{MemoryCache, SqliteCache, TranslationCache};
use crate::watcher::{FileWatcher, is_video_file};

/// The assembled service graph. Built once at boot; workers borrow from it.
pub struct App {
    /// Effective configuration.
    pub config: Arc<Config>,
    /// Work queue shared by the watcher and workers.
    pub queue: Arc<WorkQueue>,
    /// Pending-path set shared by the watcher and workers.
    pub pending: Arc<PendingSet>,
    /// Whole-job concurrency cap.
    pub job_slots: Arc<Semaphore>,
    /// Per-job collaborators.
    pub services: Arc<JobServices>,
}

impl App {
    /// Construct the graph from validated configuration.
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(Config {
            queue: config.queue.clone().normalized(),
            ..config
        });
        ensure_dirs(&config)?;

        let limiter = Arc::new(RateLimiter::new());
        let ffmpeg_slots = Arc::new(Semaphore::new(config.queue.ffmpeg_concurrency));
        let media: Arc<dyn MediaToolkit> = Arc::new(FfmpegTool::new(ffmpeg_slots));

        let recognizer: Option<Arc<dyn Recognizer>> = if config.asr.api_key.is_empty() {
            log::error!("asr.api_key is not set; recognition will fail");
            None
        } else {
            Some(Arc::new(HttpRecognizer::from_config(
                &config.asr,
                limiter.clone(),
            )?))
        };
        let vocabulary: Option<Arc<dyn VocabularyService>> =
            if config.hotwords.enabled && !config.asr.api_key.is_empty() {
                Some(Arc::new(HttpVocabularyService::from_config(
                    &config.asr,
                    limiter.clone(),
                )?))
            } else {
                None
            };
        let store: Option<Arc<dyn ObjectStore>> = if config.storage.is_complete() {
            Some(Arc::new(HttpObjectStore::from_config(&config.storage)?))
        } else {
            None
        };
        let chat: Option<Arc<dyn ChatModel>> = if config.translate.llm.base_url.is_empty()
            || config.translate.llm.api_key.is_empty()
        {
            if config.translate.enabled {
                log::warn!("translate.llm is not configured; translation will be skipped");
            }
            None
        } else {
            Some(Arc::new(ChatClient::from_config(
                &config.translate.llm,
                limiter.clone(),
            )?))
        };

        let cache_db = config.watcher.cache_dir().join("translate_cache.db");
        let cache: Arc<dyn TranslationCache> = match SqliteCache::open(&cache_db) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                log::warn!(
                    "translation cache unavailable ({}), using in-memory cache",
                    e
                );
                Arc::new(MemoryCache::new())
            }
        };

        let metadata = config.metadata.enabled.then(|| {
            Arc::new(MetadataService::new(
                (*config).metadata.clone(),
                limiter.clone(),
            ))
        });

        let services = Arc::new(JobServices {
            config: config.clone(),
            media,
            recognizer,
            vocabulary,
            store,
            chat,
            cache,
            metadata,
        });

        Ok(Self {
            job_slots: Arc::new(Semaphore::new(config.queue.max_active_jobs)),
            queue: Arc::new(WorkQueue::new()),
            pending: Arc::new(PendingSet::new()),
            services,
            config,
        })
    }

    /// One worker: take a path, hold a job slot for the whole pipeline run,
    /// release the pending entry when done.
    async fn worker_loop(self: Arc<Self>) {
        loop {
            let path = self.queue.take().await;
            let permit = self.job_slots.clone().acquire_owned().await;
            if permit.is_ok() && path.is_file() && is_video_file(&path) {
                process_video(&self.services, &path).await;
            }
            self.pending.remove(&path);
        }
    }

    /// Run the daemon: workers, scan loop, event loop and signal loop.
    /// With `once` set, a single scan pass drains the queue and returns.
    pub async fn run(self: Arc<Self>, once: bool) -> Result<()> {
        let watcher = Arc::new(FileWatcher::new(
            self.config.clone(),
            self.queue.clone(),
            self.pending.clone(),
        ));

        log::info!(
            "watching {:?} (recursive={}, workers={}, max_active_jobs={}, ffmpeg={}, asr_mode={:?}, priority={})",
            self.config.watcher.watch_dirs,
            self.config.watcher.recursive,
            self.config.queue.worker_concurrency,
            self.config.queue.max_active_jobs,
            self.config.queue.ffmpeg_concurrency,
            self.config.asr.mode,
            self.config.queue.priority_enabled,
        );

        if once {
            watcher.scan_once("once");
            while let Some(path) = self.queue.try_take() {
                if path.is_file() && is_video_file(&path) {
                    process_video(&self.services, &path).await;
                }
                self.pending.remove(&path);
            }
            return Ok(());
        }

        let mut tasks = Vec::new();
        for _ in 0..self.config.queue.worker_concurrency {
            tasks.push(tokio::spawn(self.clone().worker_loop()));
        }
        {
            let watcher = watcher.clone();
            tasks.push(tokio::spawn(async move { watcher.run_scan_loop().await }));
        }
        {
            let watcher = watcher.clone();
            tasks.push(tokio::spawn(async move { watcher.run_event_loop().await }));
        }
        #[cfg(unix)]
        {
            let watcher = watcher.clone();
            tasks.push(tokio::spawn(async move { watcher.run_signal_loop().await }));
        }

        // The loops only end on a panic; surface the first one.
        for task in tasks {
            if let Err(e) = task.await {
                return Err(crate::error::SubWatchError::config(format!(
                    "service task ended unexpectedly: {}",
                    e
                )));
            }
        }
        Ok(())
    }
}

fn ensure_dirs(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.watcher.out_dir)?;
    std::fs::create_dir_all(&config.watcher.tmp_dir)?;
    std::fs::create_dir_all(config.watcher.cache_dir())?;
    for dir in &config.watcher.watch_dirs {
        std::fs::create_dir_all(dir)?;
    }
    if !config.logging.dir.is_empty() {
        std::fs::create_dir_all(&config.logging.dir)?;
    }
    if config.watcher.move_done {
        std::fs::create_dir_all(&config.watcher.done_dir)?;
    }
    Ok(())
}
