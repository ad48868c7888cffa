//! Speech recognition orchestration.
//!
//! Two modes reach the vendor: offline (upload + async task + poll) and
//! real-time (chunked calls against the streaming endpoint). The vendor is
//! abstracted behind [`Recognizer`] and [`VocabularyService`] so tests and
//! alternative backends can substitute HTTP-free implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::Result;
use crate::config::{AsrConfig, AsrMode, SegmentMode};
use crate::core::segment::{SegmentCaps, post_process};
use crate::core::srt::Cue;
use crate::error::SubWatchError;

pub mod chunk;
pub mod client;
pub mod realtime;
pub mod response;
pub mod vocabulary;

pub use chunk::{ChunkPlan, merge_chunk_cues, split_wav, wav_duration_seconds};
pub use client::HttpRecognizer;
pub use realtime::{RealtimeOutcome, run_realtime};
pub use vocabulary::HttpVocabularyService;

/// Options for one offline transcription call.
#[derive(Debug, Clone, Default)]
pub struct OfflineOptions {
    /// Pre-registered vocabulary id.
    pub vocabulary_id: Option<String>,
    /// Flat hotword list for `param`-mode delivery.
    pub hotwords: Option<Vec<String>>,
}

/// Options for one real-time transcription call. `None` fields fall back to
/// the configured defaults; the VAD cascade overrides them explicitly.
#[derive(Debug, Clone, Default)]
pub struct RealtimeOptions {
    /// Pre-registered vocabulary id.
    pub vocabulary_id: Option<String>,
    /// Override: semantic punctuation sentencing.
    pub semantic_punctuation_enabled: Option<bool>,
    /// Override: max in-sentence silence.
    pub max_sentence_silence: Option<u32>,
    /// Override: multi-threshold VAD mode.
    pub multi_threshold_mode_enabled: Option<bool>,
}

/// Recognition capability.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe audio the store serves at `url`; returns the vendor
    /// response envelope with any out-of-line transcript already fetched.
    async fn transcribe_offline(&self, url: &str, opts: &OfflineOptions) -> Result<Value>;

    /// Transcribe one WAV chunk with the streaming recogniser.
    async fn transcribe_realtime(&self, wav_chunk: &Path, opts: &RealtimeOptions) -> Result<Value>;
}

/// Vocabulary lifecycle capability.
#[async_trait]
pub trait VocabularyService: Send + Sync {
    /// Register a hotword vocabulary; returns the vendor-side id.
    async fn create_vocabulary(
        &self,
        items: &[crate::core::hotwords::HotwordItem],
        prefix: &str,
        target_model: &str,
    ) -> Result<String>;

    /// Delete a vocabulary.
    async fn delete_vocabulary(&self, id: &str) -> Result<()>;
}

/// Model names served by the real-time endpoint.
pub fn is_realtime_model(model_name: &str) -> bool {
    let name = model_name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    const REALTIME_MODELS: &[&str] = &[
        "fun-asr-realtime-2025-11-07",
        "paraformer-realtime-8k-v2",
        "paraformer-realtime-v2",
        "fun-asr-realtime",
        "paraformer-realtime",
    ];
    REALTIME_MODELS.contains(&name.as_str()) || name.starts_with("fun-asr-realtime")
}

/// Resolve the effective mode: `auto` derives from the model name.
pub fn resolve_mode(mode: AsrMode, model_name: &str) -> AsrMode {
    match mode {
        AsrMode::Auto => {
            if is_realtime_model(model_name) {
                AsrMode::Realtime
            } else {
                AsrMode::Offline
            }
        }
        other => other,
    }
}

/// Build cues from a recognition response under the given segmentation mode.
///
/// `auto` keeps sentence boundaries (word grouping when only words exist);
/// `post` runs the segmenter with the short-merge pass. An empty result is
/// an error: recognisers signal success explicitly, never by absence.
pub fn build_cues(response: &Value, segment_mode: SegmentMode, cfg: &AsrConfig) -> Result<Vec<Cue>> {
    let parsed = response::parse_recognition(response);
    let mut sentences = parsed.sentences;
    if sentences.is_empty() && !parsed.words.is_empty() {
        sentences = vec![crate::core::segment::Sentence {
            begin_ms: None,
            end_ms: None,
            text: String::new(),
            words: parsed.words.clone(),
        }];
    }

    let cues = match segment_mode {
        SegmentMode::Auto => {
            if !sentences.is_empty() && sentences.iter().any(|s| s.begin_ms.is_some()) {
                response::cues_from_sentences(&sentences)
            } else {
                response::cues_from_words(&parsed.words)
            }
        }
        SegmentMode::Post => {
            let caps = SegmentCaps {
                max_duration_seconds: cfg.max_duration_seconds,
                max_chars: cfg.max_chars,
                min_duration_seconds: cfg.min_duration_seconds,
                min_chars: cfg.min_chars,
                merge_gap_ms: cfg.merge_gap_ms,
            };
            post_process(&sentences, &caps)
        }
    };

    if cues.is_empty() {
        return Err(SubWatchError::asr("no timestamped recognition results"));
    }
    Ok(cues)
}
