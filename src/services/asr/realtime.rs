//! Real-time recognition orchestration: chunking, per-chunk retry and the
//! adaptive fallback cascade.

use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::config::{AsrConfig, SegmentMode};
use crate::core::srt::Cue;
use crate::error::SubWatchError;
use crate::services::asr::chunk::{ChunkPlan, merge_chunk_cues, split_wav, wav_duration_seconds};
use crate::services::asr::{Recognizer, RealtimeOptions, build_cues};

/// Result of one chunked recognition pass.
#[derive(Debug)]
pub struct RealtimeOutcome {
    /// Stitched cues across all chunks.
    pub cues: Vec<Cue>,
    /// Raw vendor responses, in chunk order, for the raw-JSON dump.
    pub responses: Vec<Value>,
    /// Chunks that failed after their retries.
    pub failures: usize,
    /// Total chunk count.
    pub total: usize,
    /// The plan the pass ran with.
    pub plan: ChunkPlan,
}

impl RealtimeOutcome {
    fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total as f64
    }
}

async fn run_pass(
    recognizer: &dyn Recognizer,
    wav: &Path,
    plan: ChunkPlan,
    opts: &RealtimeOptions,
    segment_mode: SegmentMode,
    cfg: &AsrConfig,
    tmp_dir: &Path,
) -> Result<RealtimeOutcome> {
    let chunks = split_wav(wav, plan.seconds as f64, plan.overlap_ms, tmp_dir)?;
    log::info!(
        "realtime pass: {} chunks of {}s (overlap {}ms) for {}",
        chunks.len(),
        plan.seconds,
        plan.overlap_ms,
        wav.display()
    );

    let mut responses = Vec::new();
    let mut chunk_cues: Vec<Vec<Cue>> = Vec::new();
    let mut failures = 0usize;
    let total = chunks.len();

    for chunk in &chunks {
        let mut attempt = 0usize;
        let result = loop {
            match recognizer.transcribe_realtime(&chunk.path, opts).await {
                Ok(response) => break Some(response),
                Err(e) => {
                    attempt += 1;
                    if attempt >= cfg.chunk.retry.max(1) {
                        log::error!(
                            "realtime chunk failed after {} attempts: {} ({})",
                            attempt,
                            chunk.path.display(),
                            e
                        );
                        break None;
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        };
        match result {
            Some(response) => {
                match build_cues(&response, segment_mode, cfg) {
                    Ok(cues) => {
                        chunk_cues.push(
                            cues.iter().map(|c| c.offset(chunk.offset_ms)).collect(),
                        );
                    }
                    Err(e) => {
                        failures += 1;
                        log::error!("realtime chunk unparseable: {}", e);
                    }
                }
                responses.push(response);
            }
            None => failures += 1,
        }
        if chunk.path != *wav {
            let _ = std::fs::remove_file(&chunk.path);
        }
    }

    let cues = merge_chunk_cues(chunk_cues, plan.overlap_ms);
    Ok(RealtimeOutcome {
        cues,
        responses,
        failures,
        total,
        plan,
    })
}

/// Run real-time recognition with the adaptive cascade.
///
/// A first pass runs at the planned chunk length. When the failure rate
/// reaches the threshold and the chunk is still above the minimum, the pass
/// reruns at half the length; if the rate is still too high, a final pass
/// switches the recogniser to VAD-driven sentencing. All passes use an
/// explicit per-job [`ChunkPlan`] snapshot.
pub async fn run_realtime(
    recognizer: &dyn Recognizer,
    wav: &Path,
    vocabulary_id: Option<String>,
    segment_mode: SegmentMode,
    cfg: &AsrConfig,
    tmp_dir: &Path,
) -> Result<RealtimeOutcome> {
    let duration = wav_duration_seconds(wav)?;
    let plan = ChunkPlan::choose(&cfg.chunk, duration);
    let opts = RealtimeOptions {
        vocabulary_id,
        ..RealtimeOptions::default()
    };

    let mut outcome = run_pass(recognizer, wav, plan, &opts, segment_mode, cfg, tmp_dir).await?;

    let threshold = cfg.chunk.failure_rate_threshold;
    if cfg.chunk.adaptive_retry
        && outcome.total > 0
        && outcome.failure_rate() >= threshold
        && outcome.plan.seconds > cfg.chunk.min_seconds
    {
        let halved = outcome.plan.halved(&cfg.chunk);
        log::warn!(
            "realtime failure rate {:.2} over threshold, retrying at {}s chunks",
            outcome.failure_rate(),
            halved.seconds
        );
        outcome = run_pass(recognizer, wav, halved, &opts, segment_mode, cfg, tmp_dir).await?;
    }

    if cfg.chunk.fallback_enabled && outcome.total > 0 && outcome.failure_rate() >= threshold {
        log::warn!(
            "realtime failure rate {:.2} still over threshold, retrying with VAD sentencing",
            outcome.failure_rate()
        );
        let fallback_opts = RealtimeOptions {
            vocabulary_id: opts.vocabulary_id.clone(),
            semantic_punctuation_enabled: Some(false),
            max_sentence_silence: Some(cfg.chunk.fallback_max_sentence_silence),
            multi_threshold_mode_enabled: Some(cfg.chunk.fallback_multi_threshold),
        };
        outcome = run_pass(
            recognizer,
            wav,
            outcome.plan,
            &fallback_opts,
            segment_mode,
            cfg,
            tmp_dir,
        )
        .await?;
    }

    if outcome.cues.is_empty() {
        return Err(SubWatchError::asr("no usable realtime chunk results"));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRecognizer {
        /// Outcomes per call: `true` succeeds, `false` errors.
        script: Mutex<Vec<bool>>,
        calls: AtomicUsize,
        vad_calls: AtomicUsize,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
                vad_calls: AtomicUsize::new(0),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        async fn transcribe_offline(
            &self,
            _url: &str,
            _opts: &crate::services::asr::OfflineOptions,
        ) -> Result<Value> {
            unreachable!("offline not used in realtime tests")
        }

        async fn transcribe_realtime(
            &self,
            _wav_chunk: &Path,
            opts: &RealtimeOptions,
        ) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if opts.semantic_punctuation_enabled == Some(false) {
                self.vad_calls.fetch_add(1, Ordering::SeqCst);
            }
            let ok = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() { true } else { script.remove(0) }
            };
            if !ok {
                return Err(SubWatchError::asr("scripted failure"));
            }
            let start = (call as i64) * 10;
            Ok(json!({
                "transcripts": [{"sentences": [
                    {"begin_time": start, "end_time": start + 800, "text": format!("chunk {}", call)}
                ]}]
            }))
        }
    }

    fn write_wav(dir: &Path, seconds: f64) -> std::path::PathBuf {
        let path = dir.join("audio.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..(seconds * 8000.0) as usize {
            writer.write_sample((i % 32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn test_cfg() -> AsrConfig {
        let mut cfg = AsrConfig::default();
        cfg.chunk.seconds = 1;
        cfg.chunk.overlap_ms = 100;
        cfg.chunk.retry = 1;
        cfg.chunk.min_seconds = 1;
        cfg.chunk.max_seconds = 2;
        cfg.chunk.failure_rate_threshold = 0.5;
        cfg
    }

    #[tokio::test]
    async fn test_clean_pass_stitches_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_wav(dir.path(), 3.0);
        let recognizer = ScriptedRecognizer::always_ok();
        let outcome = run_realtime(
            &recognizer,
            &wav,
            None,
            SegmentMode::Auto,
            &test_cfg(),
            dir.path(),
        )
        .await
        .unwrap();
        assert!(outcome.total >= 3);
        assert_eq!(outcome.failures, 0);
        assert!(!outcome.cues.is_empty());
        let indices: Vec<usize> = outcome.cues.iter().map(|c| c.index).collect();
        let expected: Vec<usize> = (1..=outcome.cues.len()).collect();
        assert_eq!(indices, expected);
    }

    #[tokio::test]
    async fn test_vad_fallback_engages_after_persistent_failures() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_wav(dir.path(), 3.0);
        // The first pass's four chunks all fail, tripping the threshold;
        // the script then drains and the VAD pass runs clean.
        let recognizer = ScriptedRecognizer::new(vec![false; 4]);
        let mut cfg = test_cfg();
        // min == initial chunk size, so the halving step is skipped and the
        // VAD fallback is the second pass.
        cfg.chunk.adaptive_retry = true;
        let outcome = run_realtime(
            &recognizer,
            &wav,
            None,
            SegmentMode::Auto,
            &cfg,
            dir.path(),
        )
        .await
        .unwrap();
        assert!(recognizer.vad_calls.load(Ordering::SeqCst) > 0);
        assert!(!outcome.cues.is_empty());
    }

    #[tokio::test]
    async fn test_empty_outcome_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_wav(dir.path(), 3.0);
        let recognizer = ScriptedRecognizer::new(vec![false; 64]);
        let mut cfg = test_cfg();
        cfg.chunk.fallback_enabled = true;
        let result = run_realtime(
            &recognizer,
            &wav,
            None,
            SegmentMode::Auto,
            &cfg,
            dir.path(),
        )
        .await;
        assert!(result.is_err());
    }
}
