// src/config/mod.rs
//! Configuration management module for SubWatch.
//!
//! All settings are grouped into per-subsystem sections on [`Config`]. The
//! loader merges an optional TOML file with `SUBWATCH_*` environment
//! overrides; [`Config::validate`] enforces the items the service cannot run
//! without (watch directories, object-store settings for offline ASR).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod loader;
pub use loader::load_config;

use crate::Result;
use crate::error::SubWatchError;

/// Full application configuration for SubWatch.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Directory watching and output placement.
    pub watcher: WatcherConfig,
    /// Queue ordering and worker concurrency.
    pub queue: QueueConfig,
    /// Speech recognition settings.
    pub asr: AsrConfig,
    /// Object storage used by offline recognition.
    pub storage: StorageConfig,
    /// Audio track selection.
    pub audio: AudioConfig,
    /// Subtitle track selection and reuse gating.
    pub subtitle: SubtitleConfig,
    /// Translation pipeline settings.
    pub translate: TranslateConfig,
    /// Metadata resolution settings.
    pub metadata: MetadataConfig,
    /// Hotword vocabulary settings.
    pub hotwords: HotwordConfig,
    /// Evaluation sample collection.
    pub eval: EvalConfig,
    /// Process and per-run logging.
    pub logging: LogConfig,
}

/// Video extensions the watcher considers candidates.
pub const VIDEO_EXTS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi"];

/// Subtitle extensions recognised when scanning for external sidecar files.
pub const SUBTITLE_EXTS: &[&str] = &["srt", "ass", "ssa", "vtt"];

/// Directory watching, discovery and output placement.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    /// Watched root directories.
    pub watch_dirs: Vec<PathBuf>,
    /// Recurse into subdirectories when scanning.
    pub recursive: bool,
    /// Seconds between periodic scans.
    pub scan_interval_secs: u64,
    /// Sentinel file name that triggers an immediate full scan.
    pub trigger_file: String,
    /// Minimum file size before a candidate is considered stable.
    pub min_bytes: u64,
    /// Dwell between the two size checks of the stability probe.
    pub stability_dwell_secs: u64,
    /// Place outputs next to the source video instead of `out_dir`.
    pub output_to_source_dir: bool,
    /// Output directory when not co-locating with sources.
    pub out_dir: PathBuf,
    /// Scratch directory for extracted WAVs and probe files.
    pub tmp_dir: PathBuf,
    /// Move finished videos into `done_dir`.
    pub move_done: bool,
    /// Destination for `move_done`.
    pub done_dir: PathBuf,
    /// Delete the source video after a successful run.
    pub delete_source_after_done: bool,
    /// Optional suffix inserted before output extensions (e.g. ".ja").
    pub output_lang_suffix: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dirs: Vec::new(),
            recursive: true,
            scan_interval_secs: 300,
            trigger_file: ".scan_now".to_string(),
            min_bytes: 1024 * 1024,
            stability_dwell_secs: 5,
            output_to_source_dir: true,
            out_dir: PathBuf::from("/output"),
            tmp_dir: std::env::temp_dir(),
            move_done: false,
            done_dir: PathBuf::from("/watch/done"),
            delete_source_after_done: false,
            output_lang_suffix: String::new(),
        }
    }
}

impl WatcherConfig {
    /// Output directory for a given video path.
    pub fn output_dir_for(&self, video_path: &Path) -> PathBuf {
        if self.output_to_source_dir {
            video_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.out_dir.clone())
        } else {
            self.out_dir.clone()
        }
    }

    /// Cache directory (translation cache database lives here).
    pub fn cache_dir(&self) -> PathBuf {
        self.out_dir.join("cache")
    }
}

/// Queue ordering, locking and worker concurrency.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent job workers.
    pub worker_concurrency: usize,
    /// Cap on concurrent ffmpeg/ffprobe subprocesses.
    pub ffmpeg_concurrency: usize,
    /// Cap on jobs holding the whole-job semaphore.
    pub max_active_jobs: usize,
    /// Enable priority classes; disabled means everything is DEFAULT.
    pub priority_enabled: bool,
    /// Priority value for jobs with a translate-failed log.
    pub priority_failed: u8,
    /// Priority value for jobs missing the simplified-target SRT.
    pub priority_missing_target: u8,
    /// Priority value for everything else.
    pub priority_default: u8,
    /// Seconds before an on-disk lock is considered stale.
    pub lock_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 1,
            ffmpeg_concurrency: 1,
            max_active_jobs: 1,
            priority_enabled: true,
            priority_failed: 0,
            priority_missing_target: 1,
            priority_default: 5,
            lock_ttl_secs: 7200,
        }
    }
}

impl QueueConfig {
    /// Clamp zero values back to usable minimums and cap worker counts at
    /// twice the core count.
    pub fn normalized(mut self) -> Self {
        let core_cap = num_cpus::get().max(1) * 2;
        if self.worker_concurrency == 0 {
            self.worker_concurrency = 1;
        }
        self.worker_concurrency = self.worker_concurrency.min(core_cap);
        if self.ffmpeg_concurrency == 0 {
            self.ffmpeg_concurrency = 1;
        }
        if self.max_active_jobs == 0 {
            self.max_active_jobs = self.worker_concurrency;
        }
        self
    }
}

/// Recognition mode selection.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AsrMode {
    /// Upload to object storage, submit an async task and poll.
    Offline,
    /// Chunked streaming recognition.
    Realtime,
    /// Derive the mode from the model name.
    Auto,
}

impl Default for AsrMode {
    fn default() -> Self {
        AsrMode::Offline
    }
}

/// Cue segmentation mode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    /// One cue per sentence, word grouping where timings exist.
    Auto,
    /// `Auto` followed by the short-segment merge pass.
    Post,
}

impl Default for SegmentMode {
    fn default() -> Self {
        SegmentMode::Post
    }
}

/// Real-time chunking parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RealtimeChunkConfig {
    /// Fixed chunk length in seconds; 0 derives a length from `target`.
    pub seconds: u64,
    /// Overlap tail appended to each chunk.
    pub overlap_ms: u64,
    /// Per-chunk retry attempts on transient failure.
    pub retry: usize,
    /// Lower bound for derived chunk lengths.
    pub min_seconds: u64,
    /// Upper bound for derived chunk lengths.
    pub max_seconds: u64,
    /// Preferred chunk count when deriving the length.
    pub target: u64,
    /// Failure rate at which the adaptive cascade kicks in.
    pub failure_rate_threshold: f64,
    /// Halve the chunk length and retry when the rate is exceeded.
    pub adaptive_retry: bool,
    /// Final retry with VAD-driven sentencing options.
    pub fallback_enabled: bool,
    /// `max_sentence_silence` used by the VAD fallback.
    pub fallback_max_sentence_silence: u32,
    /// Multi-threshold mode used by the VAD fallback.
    pub fallback_multi_threshold: bool,
    /// Frame duration when feeding the streaming recogniser.
    pub stream_frame_ms: u64,
}

impl Default for RealtimeChunkConfig {
    fn default() -> Self {
        Self {
            seconds: 900,
            overlap_ms: 500,
            retry: 2,
            min_seconds: 300,
            max_seconds: 900,
            target: 12,
            failure_rate_threshold: 0.34,
            adaptive_retry: true,
            fallback_enabled: true,
            fallback_max_sentence_silence: 1200,
            fallback_multi_threshold: true,
            stream_frame_ms: 100,
        }
    }
}

/// Recognition sentencing options passed to the vendor.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AsrOptions {
    /// Semantic punctuation-driven sentencing.
    pub semantic_punctuation_enabled: bool,
    /// Max silence inside a sentence, in milliseconds.
    pub max_sentence_silence: u32,
    /// Multi-threshold VAD mode.
    pub multi_threshold_mode_enabled: bool,
    /// Punctuation prediction.
    pub punctuation_prediction_enabled: bool,
    /// Disfluency removal.
    pub disfluency_removal_enabled: bool,
}

impl Default for AsrOptions {
    fn default() -> Self {
        Self {
            semantic_punctuation_enabled: true,
            max_sentence_silence: 800,
            multi_threshold_mode_enabled: false,
            punctuation_prediction_enabled: true,
            disfluency_removal_enabled: false,
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AsrConfig {
    /// Mode selection; `Auto` derives from the model name.
    pub mode: AsrMode,
    /// Vendor API key.
    pub api_key: String,
    /// Vendor API base URL.
    pub base_url: String,
    /// Recognition model name.
    pub model: String,
    /// Extraction sample rate (Hz).
    pub sample_rate: u32,
    /// Language hints forwarded to hint-capable models.
    pub language_hints: Vec<String>,
    /// Cue segmentation mode.
    pub segment_mode: SegmentMode,
    /// Real-time chunking parameters.
    pub chunk: RealtimeChunkConfig,
    /// Vendor sentencing options.
    pub options: AsrOptions,
    /// Cooldown before a failed file is retried.
    pub fail_cooldown_secs: u64,
    /// Failure count at which a file is marked fatal.
    pub max_failures: u32,
    /// Segmenter cap: max cue duration in seconds.
    pub max_duration_seconds: f64,
    /// Segmenter cap: max cue characters.
    pub max_chars: usize,
    /// Short-merge threshold: min cue duration in seconds.
    pub min_duration_seconds: f64,
    /// Short-merge threshold: min cue characters.
    pub min_chars: usize,
    /// Max gap bridged by the short-merge pass.
    pub merge_gap_ms: i64,
    /// Persist raw vendor responses next to the outputs.
    pub save_raw_json: bool,
    /// Outbound request rate (requests per second); 0 disables limiting.
    pub rps: f64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            mode: AsrMode::default(),
            api_key: String::new(),
            base_url: "https://dashscope.aliyuncs.com/api/v1".to_string(),
            model: "paraformer-v2".to_string(),
            sample_rate: 16000,
            language_hints: vec!["ja".to_string(), "en".to_string()],
            segment_mode: SegmentMode::default(),
            chunk: RealtimeChunkConfig::default(),
            options: AsrOptions::default(),
            fail_cooldown_secs: 3600,
            max_failures: 3,
            max_duration_seconds: 3.5,
            max_chars: 25,
            min_duration_seconds: 1.0,
            min_chars: 6,
            merge_gap_ms: 400,
            save_raw_json: false,
            rps: 0.0,
        }
    }
}

/// Object-store URL visibility.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreUrlMode {
    /// Bucket is publicly readable.
    Public,
    /// Generate time-limited signed URLs.
    Presign,
}

impl Default for StoreUrlMode {
    fn default() -> Self {
        StoreUrlMode::Presign
    }
}

/// Object storage used by offline recognition.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Service endpoint (host, scheme optional).
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id.
    pub access_key_id: String,
    /// Access key secret.
    pub access_key_secret: String,
    /// Key prefix for uploaded audio.
    pub prefix: String,
    /// URL visibility mode.
    pub url_mode: StoreUrlMode,
    /// Signed URL lifetime in seconds.
    pub presign_expire_secs: u64,
    /// Delete the uploaded object when the job finishes.
    pub delete_after_job: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            prefix: "subtitle-audio/".to_string(),
            url_mode: StoreUrlMode::default(),
            presign_expire_secs: 86400,
            delete_after_job: false,
        }
    }
}

impl StorageConfig {
    /// True when every field required for uploads is present.
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty()
            && !self.bucket.is_empty()
            && !self.access_key_id.is_empty()
            && !self.access_key_secret.is_empty()
    }
}

/// Audio track selection.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AudioConfig {
    /// Preferred languages, most preferred first.
    pub prefer_langs: Vec<String>,
    /// Title keywords that deprioritise a track.
    pub exclude_titles: Vec<String>,
    /// Operator-forced stream index.
    pub index: Option<i64>,
    /// Operator-forced language.
    pub lang: Option<String>,
}

/// Subtitle track handling mode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
    /// Never look at existing subtitles.
    Ignore,
    /// Select a track for inspection but never load it.
    Reference,
    /// Reuse an existing subtitle when the gate accepts it.
    ReuseIfGood,
}

impl Default for SubtitleMode {
    fn default() -> Self {
        SubtitleMode::ReuseIfGood
    }
}

/// Subtitle track selection and reuse gating.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SubtitleConfig {
    /// Track handling mode.
    pub mode: SubtitleMode,
    /// Source-language preference list.
    pub prefer_langs_src: Vec<String>,
    /// Destination-language preference list (wins under `reuse_if_good`).
    pub prefer_langs_dst: Vec<String>,
    /// Title keywords that deprioritise a track.
    pub exclude_titles: Vec<String>,
    /// Operator-forced stream index.
    pub index: Option<i64>,
    /// Operator-forced language.
    pub lang: Option<String>,
    /// Minimum language confidence for reuse.
    pub reuse_min_confidence: f64,
    /// Characters sampled for confidence estimation.
    pub reuse_sample_chars: usize,
    /// Load a non-target subtitle instead of running recognition.
    pub use_existing: bool,
    /// The simplified destination language code.
    pub simplified_lang: String,
    /// Ignore simplified subtitles (process anyway).
    pub ignore_simplified: bool,
    /// Run the validator on emitted SRTs.
    pub validate: bool,
    /// Apply validator fixes instead of only reporting.
    pub auto_fix: bool,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            mode: SubtitleMode::default(),
            prefer_langs_src: vec!["ja".to_string(), "en".to_string()],
            prefer_langs_dst: vec!["zh".to_string()],
            exclude_titles: Vec::new(),
            index: None,
            lang: None,
            reuse_min_confidence: 0.35,
            reuse_sample_chars: 2000,
            use_existing: true,
            simplified_lang: "zh".to_string(),
            ignore_simplified: false,
            validate: true,
            auto_fix: true,
        }
    }
}

/// Chat-completion (LLM) endpoint settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Outbound request rate; 0 disables limiting.
    pub rps: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: "deepseek-v3.2".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            rps: 0.0,
        }
    }
}

/// Bilingual cue ordering.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BilingualOrder {
    /// Source line first.
    RawFirst,
    /// Translated line first.
    TransFirst,
}

impl Default for BilingualOrder {
    fn default() -> Self {
        BilingualOrder::RawFirst
    }
}

/// Translation pipeline settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TranslateConfig {
    /// Master switch for the translation stage.
    pub enabled: bool,
    /// Source language, or "auto".
    pub src_lang: String,
    /// Destination languages; the simplified language is always prepended.
    pub dst_langs: Vec<String>,
    /// LLM endpoint.
    pub llm: LlmConfig,
    /// Lines per bulk batch.
    pub batch_lines: usize,
    /// Concurrent batches in flight.
    pub max_concurrent: usize,
    /// Retries per LLM call.
    pub retry: usize,
    /// CJK wrap width; 0 disables wrapping.
    pub max_chars_per_line: usize,
    /// Emit a bilingual SRT.
    pub bilingual: bool,
    /// Bilingual line order.
    pub bilingual_order: BilingualOrder,
    /// Language paired into the bilingual file; defaults to the first target.
    pub bilingual_lang: String,
    /// Run the polish pass.
    pub use_polish: bool,
    /// Pairs per polish block.
    pub polish_batch_size: usize,
    /// Group cues into translation contexts.
    pub grouping_enabled: bool,
    /// One item per call with the full context block.
    pub context_aware: bool,
    /// Videos shorter than this skip translation (seconds).
    pub min_duration_secs: f64,
    /// Global glossary YAML path.
    pub glossary_path: String,
    /// Work-info confidence needed to apply per-work glossary sections.
    pub glossary_confidence_threshold: f64,
    /// Per-work glossary directory.
    pub work_glossary_dir: String,
    /// Enable per-work glossary lookup.
    pub work_glossary_enabled: bool,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            src_lang: "auto".to_string(),
            dst_langs: vec!["zh".to_string()],
            llm: LlmConfig::default(),
            batch_lines: 10,
            max_concurrent: 2,
            retry: 3,
            max_chars_per_line: 20,
            bilingual: false,
            bilingual_order: BilingualOrder::default(),
            bilingual_lang: String::new(),
            use_polish: false,
            polish_batch_size: 80,
            grouping_enabled: true,
            context_aware: true,
            min_duration_secs: 60.0,
            glossary_path: String::new(),
            glossary_confidence_threshold: 0.75,
            work_glossary_dir: "glossary".to_string(),
            work_glossary_enabled: true,
        }
    }
}

impl TranslateConfig {
    /// Destination languages with the simplified target prepended and
    /// duplicates removed, preserving order.
    pub fn effective_dst_langs(&self, simplified_lang: &str) -> Vec<String> {
        let mut langs: Vec<String> = Vec::new();
        if !simplified_lang.is_empty() {
            langs.push(simplified_lang.to_string());
        }
        for lang in &self.dst_langs {
            let lang = lang.trim();
            if !lang.is_empty() && !langs.iter().any(|l| l == lang) {
                langs.push(lang.to_string());
            }
        }
        langs
    }
}

/// Single metadata provider settings.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider switch.
    pub enabled: bool,
    /// API key or access token.
    pub api_key: String,
    /// Provider base URL.
    pub base_url: String,
    /// User agent (providers that require one).
    pub user_agent: String,
}

/// Metadata resolution settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MetadataConfig {
    /// Master switch.
    pub enabled: bool,
    /// Language priority for localized lookups.
    pub language_priority: Vec<String>,
    /// Minimum merged confidence to keep a result.
    pub min_confidence: f64,
    /// Query cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Dump query/result JSON next to the outputs.
    pub debug: bool,
    /// Per-provider minimum title similarity.
    pub min_title_similarity: f64,
    /// Outbound request rate; 0 disables limiting.
    pub rps: f64,
    /// TMDB provider.
    pub tmdb: ProviderConfig,
    /// Bangumi provider.
    pub bangumi: ProviderConfig,
    /// WMDB provider.
    pub wmdb: ProviderConfig,
    /// Provider weight: tmdb.
    pub weight_tmdb: f64,
    /// Provider weight: bangumi.
    pub weight_bangumi: f64,
    /// Provider weight: wmdb.
    pub weight_wmdb: f64,
    /// Manual-override JSON directory (relative to the output dir).
    pub manual_dir: String,
    /// Look for NFO sidecars.
    pub nfo_enabled: bool,
    /// Only accept an NFO named after the video.
    pub nfo_same_name_only: bool,
    /// Title alias YAML path.
    pub title_aliases_path: String,
    /// Ask the LLM for additional title aliases.
    pub llm_title_alias_enabled: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            language_priority: vec!["zh-CN".to_string(), "en-US".to_string()],
            min_confidence: 0.5,
            cache_ttl_secs: 86400,
            debug: false,
            min_title_similarity: 0.6,
            rps: 0.0,
            tmdb: ProviderConfig {
                enabled: true,
                base_url: "https://api.themoviedb.org/3".to_string(),
                ..ProviderConfig::default()
            },
            bangumi: ProviderConfig {
                enabled: true,
                base_url: "https://api.bgm.tv".to_string(),
                user_agent: "subwatch/0.4".to_string(),
                ..ProviderConfig::default()
            },
            wmdb: ProviderConfig {
                enabled: false,
                base_url: "https://api.wmdb.tv".to_string(),
                ..ProviderConfig::default()
            },
            weight_tmdb: 1.0,
            weight_bangumi: 0.8,
            weight_wmdb: 0.5,
            manual_dir: "metadata".to_string(),
            nfo_enabled: false,
            nfo_same_name_only: true,
            title_aliases_path: String::new(),
            llm_title_alias_enabled: true,
        }
    }
}

/// Hotword delivery mode.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HotwordMode {
    /// Register a vendor-side vocabulary before the job.
    Vocabulary,
    /// Attach the flat list to every call.
    Param,
}

impl Default for HotwordMode {
    fn default() -> Self {
        HotwordMode::Vocabulary
    }
}

/// Hotword vocabulary settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HotwordConfig {
    /// Master switch.
    pub enabled: bool,
    /// Cap on list length.
    pub max: usize,
    /// Languages hotwords may be built for.
    pub langs: Vec<String>,
    /// Delivery mode.
    pub mode: HotwordMode,
    /// Request parameter name used in `param` mode.
    pub param_name: String,
    /// Item weight, clamped to 1..=5.
    pub weight: i32,
    /// Vocabulary name prefix.
    pub prefix: String,
    /// Target model registered with the vocabulary; empty uses the ASR model.
    pub target_model: String,
    /// Skip language filtering when no language hints are configured.
    pub allow_mixed: bool,
    /// Include glossary keys.
    pub use_glossary: bool,
    /// Include metadata character names.
    pub use_metadata: bool,
    /// Include resolved title aliases.
    pub use_title_aliases: bool,
}

impl Default for HotwordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max: 50,
            langs: Vec::new(),
            mode: HotwordMode::default(),
            param_name: "hot_words".to_string(),
            weight: 4,
            prefix: "subwatch".to_string(),
            target_model: String::new(),
            allow_mixed: false,
            use_glossary: true,
            use_metadata: true,
            use_title_aliases: true,
        }
    }
}

/// Evaluation sample collection.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EvalConfig {
    /// Master switch.
    pub collect: bool,
    /// Output directory (relative to the job output dir unless absolute).
    pub output_dir: String,
    /// Fraction of files sampled, chosen by path hash.
    pub sample_rate: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            collect: false,
            output_dir: "eval".to_string(),
            sample_rate: 1.0,
        }
    }
}

/// Process and per-run logging.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Process log directory; empty disables the file log.
    pub dir: String,
    /// Process log file name.
    pub file_name: String,
    /// Rotation threshold in bytes.
    pub max_bytes: u64,
    /// Rotated generations kept.
    pub max_backups: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            file_name: "subwatch.log".to_string(),
            max_bytes: 10 * 1024 * 1024,
            max_backups: 5,
        }
    }
}

impl Config {
    /// Validate the items the service cannot run without.
    ///
    /// Missing watch directories and an incomplete object store for offline
    /// recognition are fatal; a missing ASR key is reported by the caller so
    /// startup can still log it alongside the banner.
    pub fn validate(&self) -> Result<()> {
        if self.watcher.watch_dirs.is_empty() {
            return Err(SubWatchError::config(
                "watcher.watch_dirs is empty; configure at least one watch directory",
            ));
        }
        if self.asr.mode == AsrMode::Offline && !self.storage.is_complete() {
            return Err(SubWatchError::config(
                "offline ASR requires storage.endpoint, bucket and access keys",
            ));
        }
        if self.translate.enabled && self.translate.effective_dst_langs(&self.subtitle.simplified_lang).is_empty()
        {
            return Err(SubWatchError::config(
                "translate.dst_langs and subtitle.simplified_lang are both empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.watcher.scan_interval_secs, 300);
        assert_eq!(config.queue.lock_ttl_secs, 7200);
        assert_eq!(config.asr.model, "paraformer-v2");
        assert_eq!(config.asr.sample_rate, 16000);
        assert_eq!(config.subtitle.simplified_lang, "zh");
        assert_eq!(config.translate.batch_lines, 10);
        assert!((config.subtitle.reuse_min_confidence - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_empty_watch_dirs() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("watch_dirs"));
    }

    #[test]
    fn test_validate_offline_requires_storage() {
        let mut config = Config {
            watcher: WatcherConfig {
                watch_dirs: vec![PathBuf::from("/watch")],
                ..WatcherConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.storage.endpoint = "oss.example.com".into();
        config.storage.bucket = "subs".into();
        config.storage.access_key_id = "ak".into();
        config.storage.access_key_secret = "sk".into();
        assert!(config.validate().is_ok());

        config.asr.mode = AsrMode::Realtime;
        config.storage = StorageConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_dst_langs_prepends_simplified() {
        let translate = TranslateConfig {
            dst_langs: vec!["en".to_string(), "zh".to_string()],
            ..TranslateConfig::default()
        };
        assert_eq!(translate.effective_dst_langs("zh"), vec!["zh", "en"]);
    }

    #[test]
    fn test_queue_normalized_clamps_zeroes() {
        let queue = QueueConfig {
            worker_concurrency: 0,
            ffmpeg_concurrency: 0,
            max_active_jobs: 0,
            ..QueueConfig::default()
        }
        .normalized();
        assert_eq!(queue.worker_concurrency, 1);
        assert_eq!(queue.ffmpeg_concurrency, 1);
        assert_eq!(queue.max_active_jobs, 1);
    }
}
