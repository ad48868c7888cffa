//! Segmentation of recogniser output into subtitle cues.
//!
//! Sentences (optionally with word-level timings) become cues bounded by
//! duration and character caps; the `post` mode then merges cues that fall
//! below the minimum duration or length.

use crate::core::srt::{Cue, sanitize_text};

pub mod grouping;
mod merge;

pub use merge::{merge_short_segments, merge_text};

/// A recognised sentence with optional word-level timings.
#[derive(Debug, Clone, Default)]
pub struct Sentence {
    /// Sentence start in milliseconds, when the vendor supplied one.
    pub begin_ms: Option<i64>,
    /// Sentence end in milliseconds.
    pub end_ms: Option<i64>,
    /// Sentence text.
    pub text: String,
    /// Word-level timings; empty when the vendor returned none.
    pub words: Vec<Word>,
}

/// A recognised word with timing and trailing punctuation.
#[derive(Debug, Clone, Default)]
pub struct Word {
    /// Word start in milliseconds.
    pub begin_ms: Option<i64>,
    /// Word end in milliseconds.
    pub end_ms: Option<i64>,
    /// Word text.
    pub text: String,
    /// Punctuation the recogniser attached after the word.
    pub punctuation: String,
}

/// A provisional cue before indices are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Start in milliseconds.
    pub start_ms: i64,
    /// End in milliseconds.
    pub end_ms: i64,
    /// Text content.
    pub text: String,
}

/// Caps and thresholds driving segmentation and the short-merge pass.
#[derive(Debug, Clone, Copy)]
pub struct SegmentCaps {
    /// Max cue duration in seconds.
    pub max_duration_seconds: f64,
    /// Max cue characters.
    pub max_chars: usize,
    /// Min cue duration in seconds (short-merge threshold).
    pub min_duration_seconds: f64,
    /// Min cue characters (short-merge threshold).
    pub min_chars: usize,
    /// Max gap bridged by the short-merge pass.
    pub merge_gap_ms: i64,
}

impl Default for SegmentCaps {
    fn default() -> Self {
        Self {
            max_duration_seconds: 3.5,
            max_chars: 25,
            min_duration_seconds: 1.0,
            min_chars: 6,
            merge_gap_ms: 400,
        }
    }
}

const BREAK_PUNCT: &[&str] = &["。", "！", "？", "!", "?"];

/// Convert sentences into segments bounded by the duration/character caps.
///
/// Word timings, when present, drive the cue boundaries: a cue breaks when
/// the accumulated duration or length exceeds its cap or the current word
/// carries break punctuation. Sentences without word timings are emitted
/// whole when within caps, otherwise split into proportional chunks.
pub fn segment_sentences(
    sentences: &[Sentence],
    max_duration_seconds: f64,
    max_chars: usize,
) -> Vec<Segment> {
    let mut segments = Vec::new();

    for sentence in sentences {
        if !sentence.words.is_empty() {
            segment_words(&sentence.words, max_duration_seconds, max_chars, &mut segments);
            continue;
        }

        let (Some(begin), Some(end)) = (sentence.begin_ms, sentence.end_ms) else {
            continue;
        };
        let text = sentence.text.trim();
        if text.is_empty() {
            continue;
        }
        let duration = (end - begin) as f64 / 1000.0;
        let char_count = text.chars().count();
        if duration <= max_duration_seconds && char_count <= max_chars {
            segments.push(Segment {
                start_ms: begin,
                end_ms: end,
                text: text.to_string(),
            });
            continue;
        }

        // Long sentence without word timings: split into proportional chunks.
        let mut chunk_count = char_count / max_chars + 1;
        chunk_count = chunk_count.max((duration / max_duration_seconds) as usize + 1);
        let chunk_count = chunk_count.max(1);
        let time_span = (end - begin).max(1);
        let chars: Vec<char> = text.chars().collect();
        let chunk_size = (chars.len() / chunk_count).max(1);
        for i in 0..chunk_count {
            let start_idx = i * chunk_size;
            if start_idx >= chars.len() {
                break;
            }
            let end_idx = if i == chunk_count - 1 {
                chars.len()
            } else {
                ((i + 1) * chunk_size).min(chars.len())
            };
            let chunk_text: String = chars[start_idx..end_idx].iter().collect();
            let chunk_text = chunk_text.trim().to_string();
            if chunk_text.is_empty() {
                continue;
            }
            let chunk_start = begin + time_span * i as i64 / chunk_count as i64;
            let chunk_end = begin + time_span * (i + 1) as i64 / chunk_count as i64;
            segments.push(Segment {
                start_ms: chunk_start,
                end_ms: chunk_end,
                text: chunk_text,
            });
        }
    }

    segments
        .into_iter()
        .filter_map(|seg| {
            let text = sanitize_text(&seg.text);
            if text.is_empty() {
                None
            } else {
                Some(Segment { text, ..seg })
            }
        })
        .collect()
}

fn segment_words(
    words: &[Word],
    max_duration_seconds: f64,
    max_chars: usize,
    segments: &mut Vec<Segment>,
) {
    let mut buffer: Vec<String> = Vec::new();
    let mut start_ms: Option<i64> = None;
    let mut end_ms: i64 = 0;

    let flush = |buffer: &mut Vec<String>, start_ms: &mut Option<i64>, end_ms: i64, segments: &mut Vec<Segment>| {
        if let Some(start) = *start_ms {
            let text: String = buffer.concat().trim().to_string();
            if !text.is_empty() {
                segments.push(Segment {
                    start_ms: start,
                    end_ms,
                    text,
                });
            }
        }
        buffer.clear();
        *start_ms = None;
    };

    for word in words {
        let token = format!("{}{}", word.text, word.punctuation);
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (Some(word_start), Some(word_end)) = (word.begin_ms, word.end_ms) else {
            continue;
        };
        if start_ms.is_none() {
            start_ms = Some(word_start);
        }
        end_ms = word_end;
        buffer.push(token.to_string());

        let text_len: usize = buffer.iter().map(|t| t.chars().count()).sum();
        let duration = start_ms
            .map(|s| (end_ms - s) as f64 / 1000.0)
            .unwrap_or(0.0);
        let should_break = duration > max_duration_seconds
            || text_len > max_chars
            || BREAK_PUNCT.contains(&word.punctuation.as_str());
        if should_break {
            flush(&mut buffer, &mut start_ms, end_ms, segments);
        }
    }
    flush(&mut buffer, &mut start_ms, end_ms, segments);
}

/// Run the full post-processing chain: segment, short-merge, index.
pub fn post_process(sentences: &[Sentence], caps: &SegmentCaps) -> Vec<Cue> {
    let segments = segment_sentences(sentences, caps.max_duration_seconds, caps.max_chars);
    let merged = merge_short_segments(
        segments,
        caps.min_duration_seconds,
        caps.min_chars,
        caps.max_duration_seconds,
        caps.max_chars,
        caps.merge_gap_ms,
    );
    assign_indices(merged)
}

/// Convert segments into cues with 1-based contiguous indices.
pub fn assign_indices(segments: Vec<Segment>) -> Vec<Cue> {
    segments
        .into_iter()
        .enumerate()
        .map(|(i, seg)| Cue::new(i + 1, seg.start_ms, seg.end_ms, seg.text))
        .collect()
}
