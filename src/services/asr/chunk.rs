//! WAV chunking for real-time recognition.
//!
//! Long recordings are split into consecutive windows with an overlap tail;
//! per-chunk cue lists are stitched back together by monotonically advancing
//! the end boundary and dropping cues fully contained in the previous
//! chunk's overlap region.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::config::RealtimeChunkConfig;
use crate::core::srt::Cue;
use crate::error::SubWatchError;

/// One WAV chunk on disk with its offset into the source recording.
#[derive(Debug, Clone)]
pub struct WavChunk {
    /// Chunk file path; equals the source path when no split was needed.
    pub path: PathBuf,
    /// Offset of the chunk start in the source, in milliseconds.
    pub offset_ms: i64,
}

/// Per-job chunking snapshot. Derived once from configuration and the
/// recording duration; the adaptive cascade rebuilds it with a shorter
/// length instead of mutating shared state.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    /// Chunk length in seconds.
    pub seconds: u64,
    /// Overlap tail in milliseconds.
    pub overlap_ms: u64,
}

impl ChunkPlan {
    /// Choose the chunk length: an explicit configured length wins,
    /// otherwise the duration is divided into about `target` chunks and
    /// clamped to the configured bounds.
    pub fn choose(cfg: &RealtimeChunkConfig, duration_seconds: f64) -> Self {
        let seconds = if cfg.seconds > 0 {
            cfg.seconds
        } else if duration_seconds <= 0.0 {
            cfg.max_seconds
        } else if cfg.target > 0 {
            let duration = duration_seconds.ceil() as u64;
            let chunk = duration.div_ceil(cfg.target);
            chunk.clamp(cfg.min_seconds, cfg.max_seconds)
        } else {
            cfg.max_seconds
        };
        Self {
            seconds: seconds.max(1),
            overlap_ms: cfg.overlap_ms,
        }
    }

    /// The halved plan used by the adaptive retry, clamped to the bounds.
    pub fn halved(&self, cfg: &RealtimeChunkConfig) -> Self {
        let seconds = (self.seconds / 2)
            .max(1)
            .clamp(cfg.min_seconds, cfg.max_seconds);
        Self {
            seconds,
            overlap_ms: self.overlap_ms,
        }
    }
}

/// Duration of a WAV file in seconds.
pub fn wav_duration_seconds(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Split a WAV into `chunk_seconds` windows with `overlap_ms` tails.
///
/// Recordings at or below one chunk length are returned unsplit. An overlap
/// at or above the chunk length is halved to keep windows advancing.
pub fn split_wav(
    path: &Path,
    chunk_seconds: f64,
    overlap_ms: u64,
    tmp_dir: &Path,
) -> Result<Vec<WavChunk>> {
    if chunk_seconds <= 0.0 {
        return Ok(vec![WavChunk {
            path: path.to_path_buf(),
            offset_ms: 0,
        }]);
    }
    let duration = wav_duration_seconds(path)?;
    if duration <= chunk_seconds {
        return Ok(vec![WavChunk {
            path: path.to_path_buf(),
            offset_ms: 0,
        }]);
    }

    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let rate = spec.sample_rate as u64;
    let channels = spec.channels as u64;
    if rate == 0 || channels == 0 {
        return Err(SubWatchError::media_tool("WAV header reports zero rate or channels"));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, hound::Error>>()?;
    let total_frames = samples.len() as u64 / channels;
    let frames_per_chunk = ((chunk_seconds * rate as f64) as u64).max(1);
    let mut overlap_frames = overlap_ms * rate / 1000;
    if overlap_frames >= frames_per_chunk {
        overlap_frames = frames_per_chunk / 2;
    }

    let mut chunks = Vec::new();
    let mut start_frame: u64 = 0;
    let mut index = 0usize;
    while start_frame < total_frames {
        let end_frame = (start_frame + frames_per_chunk).min(total_frames);
        let chunk_path = tmp_dir.join(format!(
            "chunk-{}-{}.wav",
            uuid::Uuid::new_v4().simple(),
            index
        ));
        let mut writer = hound::WavWriter::create(&chunk_path, spec)?;
        let lo = (start_frame * channels) as usize;
        let hi = (end_frame * channels) as usize;
        for sample in &samples[lo..hi] {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        chunks.push(WavChunk {
            path: chunk_path,
            offset_ms: (start_frame * 1000 / rate) as i64,
        });
        index += 1;

        let advance = frames_per_chunk.saturating_sub(overlap_frames).max(1);
        start_frame += advance;
        if end_frame == total_frames {
            break;
        }
    }
    Ok(chunks)
}

/// Stitch per-chunk cue lists into one sequence.
///
/// The end boundary only advances: a cue ending at or before the previous
/// end is a duplicate from the overlap; a cue starting before the previous
/// end and ending inside the previous overlap tail is dropped as well.
/// Indices are reassigned 1..N.
pub fn merge_chunk_cues(chunks: Vec<Vec<Cue>>, overlap_ms: u64) -> Vec<Cue> {
    let overlap = overlap_ms as i64;
    let mut merged: Vec<Cue> = Vec::new();
    for part in chunks {
        for cue in part {
            let Some(last) = merged.last() else {
                merged.push(cue);
                continue;
            };
            let last_end = last.end_ms;
            if cue.end_ms <= last_end {
                continue;
            }
            if cue.start_ms < last_end && cue.end_ms <= last_end + overlap {
                continue;
            }
            merged.push(cue);
        }
    }
    for (i, cue) in merged.iter_mut().enumerate() {
        cue.index = i + 1;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, seconds: f64, rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (seconds * rate as f64) as usize;
        for i in 0..total {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_choose_plan_explicit_wins() {
        let cfg = RealtimeChunkConfig {
            seconds: 600,
            ..RealtimeChunkConfig::default()
        };
        assert_eq!(ChunkPlan::choose(&cfg, 10_000.0).seconds, 600);
    }

    #[test]
    fn test_choose_plan_derives_from_target() {
        let cfg = RealtimeChunkConfig {
            seconds: 0,
            min_seconds: 300,
            max_seconds: 900,
            target: 12,
            ..RealtimeChunkConfig::default()
        };
        // 7200s / 12 chunks = 600s each.
        assert_eq!(ChunkPlan::choose(&cfg, 7200.0).seconds, 600);
        // Short recordings clamp to the minimum.
        assert_eq!(ChunkPlan::choose(&cfg, 100.0).seconds, 300);
        // Very long recordings clamp to the maximum.
        assert_eq!(ChunkPlan::choose(&cfg, 100_000.0).seconds, 900);
        // Unknown duration falls back to the maximum.
        assert_eq!(ChunkPlan::choose(&cfg, 0.0).seconds, 900);
    }

    #[test]
    fn test_halved_clamps_to_min() {
        let cfg = RealtimeChunkConfig {
            min_seconds: 300,
            max_seconds: 900,
            ..RealtimeChunkConfig::default()
        };
        let plan = ChunkPlan {
            seconds: 900,
            overlap_ms: 500,
        };
        assert_eq!(plan.halved(&cfg).seconds, 450);
        let small = ChunkPlan {
            seconds: 400,
            overlap_ms: 500,
        };
        assert_eq!(small.halved(&cfg).seconds, 300);
    }

    #[test]
    fn test_short_wav_is_not_split() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("short.wav");
        write_test_wav(&wav, 0.5, 16000);
        let chunks = split_wav(&wav, 1.0, 0, dir.path()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].path, wav);
        assert_eq!(chunks[0].offset_ms, 0);
    }

    #[test]
    fn test_one_second_wav_splits_with_overlap() {
        // 1.0 s at 16 kHz split into 0.4 s windows with a 100 ms overlap
        // yields chunks at strictly increasing offsets starting at 0.
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("one.wav");
        write_test_wav(&wav, 1.0, 16000);
        let chunks = split_wav(&wav, 0.4, 100, dir.path()).unwrap();
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].offset_ms, 0);
        for pair in chunks.windows(2) {
            assert!(pair[1].offset_ms > pair[0].offset_ms);
        }
        // Overlap shortens the stride below the window length.
        assert_eq!(chunks[1].offset_ms, 300);

        // Coverage: the final chunk reaches the end of the recording.
        let last = &chunks[chunks.len() - 1];
        let last_duration = wav_duration_seconds(&last.path).unwrap();
        assert!((last.offset_ms as f64 / 1000.0 + last_duration - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_excessive_overlap_is_halved() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("w.wav");
        write_test_wav(&wav, 3.0, 8000);
        let chunks = split_wav(&wav, 1.0, 5000, dir.path()).unwrap();
        // The stride stays positive, so the split terminates.
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            assert!(pair[1].offset_ms > pair[0].offset_ms);
        }
    }

    #[test]
    fn test_merge_chunk_cues_drops_overlap_duplicates() {
        let chunk1 = vec![
            Cue::new(1, 0, 1000, "a"),
            Cue::new(2, 1200, 2000, "b"),
        ];
        let chunk2 = vec![
            // Fully before the previous end: duplicate.
            Cue::new(1, 1300, 1900, "b'"),
            // Starts before previous end, ends inside overlap tail: dropped.
            Cue::new(2, 1900, 2400, "c"),
            // Genuinely new.
            Cue::new(3, 2600, 3000, "d"),
        ];
        let merged = merge_chunk_cues(vec![chunk1, chunk2], 500);
        let texts: Vec<&str> = merged.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "d"]);
        let indices: Vec<usize> = merged.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_chunk_cues_empty_chunks() {
        let merged = merge_chunk_cues(vec![vec![], vec![Cue::new(1, 0, 100, "x")]], 500);
        assert_eq!(merged.len(), 1);
    }
}
