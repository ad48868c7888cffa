//! Short-segment merging for the `post` segmentation mode.

use crate::core::lang::{has_han, has_kana};
use crate::core::segment::Segment;

/// Join two text fragments script-aware: CJK and kana fragments concatenate
/// without a separator, everything else gets a single space.
pub fn merge_text(lhs: &str, rhs: &str) -> String {
    if lhs.is_empty() {
        return rhs.to_string();
    }
    if rhs.is_empty() {
        return lhs.to_string();
    }
    let combined = format!("{}{}", lhs, rhs);
    if has_han(&combined) || has_kana(&combined) {
        combined
    } else {
        format!("{} {}", lhs, rhs)
    }
}

/// Merge segments shorter than the minimum duration or length into a
/// neighbour.
///
/// A short segment first tries to merge forward, then backward. Merges are
/// only taken when the gap is within `max_gap_ms` and the combined segment
/// stays within 1.3x of the duration and character caps.
pub fn merge_short_segments(
    segments: Vec<Segment>,
    min_duration_seconds: f64,
    min_chars: usize,
    max_duration_seconds: f64,
    max_chars: usize,
    max_gap_ms: i64,
) -> Vec<Segment> {
    if segments.is_empty() {
        return Vec::new();
    }
    let merge_max_duration = max_duration_seconds * 1.3;
    let merge_max_chars = (max_chars as f64 * 1.3) as usize;
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut i = 0;

    while i < segments.len() {
        let seg = &segments[i];
        let duration = (seg.end_ms - seg.start_ms) as f64 / 1000.0;
        let is_short = duration < min_duration_seconds || seg.text.chars().count() < min_chars;
        if !is_short {
            merged.push(seg.clone());
            i += 1;
            continue;
        }

        // Forward merge.
        if i + 1 < segments.len() {
            let next = &segments[i + 1];
            let gap = next.start_ms - seg.end_ms;
            let combined_text = merge_text(&seg.text, &next.text);
            let combined_duration = (next.end_ms - seg.start_ms) as f64 / 1000.0;
            if gap <= max_gap_ms
                && combined_duration <= merge_max_duration
                && combined_text.chars().count() <= merge_max_chars
            {
                merged.push(Segment {
                    start_ms: seg.start_ms,
                    end_ms: next.end_ms,
                    text: combined_text,
                });
                i += 2;
                continue;
            }
        }

        // Backward merge.
        if let Some(prev) = merged.pop() {
            let gap = seg.start_ms - prev.end_ms;
            let combined_text = merge_text(&prev.text, &seg.text);
            let combined_duration = (seg.end_ms - prev.start_ms) as f64 / 1000.0;
            if gap <= max_gap_ms
                && combined_duration <= merge_max_duration
                && combined_text.chars().count() <= merge_max_chars
            {
                merged.push(Segment {
                    start_ms: prev.start_ms,
                    end_ms: seg.end_ms,
                    text: combined_text,
                });
                i += 1;
                continue;
            }
            merged.push(prev);
        }

        merged.push(seg.clone());
        i += 1;
    }

    merged
}
