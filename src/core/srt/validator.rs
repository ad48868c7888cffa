//! Structural validation and repair of cue lists.

use crate::core::srt::Cue;

/// A structural problem found while validating a cue list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issue {
    /// Cue content was empty after trimming; the cue was dropped.
    EmptyContent,
    /// End timestamp was at or before the start; end was pushed out 500 ms.
    EndBeforeStart,
    /// Start timestamp was negative; clamped to zero.
    NegativeStart,
    /// Cue started before the previous cue ended; shifted forward keeping
    /// its duration.
    Overlap,
}

/// Repair a cue list in order and report the issues encountered.
///
/// The function is idempotent: running it on its own output yields the same
/// cues and no issues.
pub fn validate(cues: &[Cue]) -> (Vec<Cue>, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut fixed: Vec<Cue> = Vec::with_capacity(cues.len());
    let mut prev_end: Option<i64> = None;

    for cue in cues {
        let content = cue.text.trim();
        if content.is_empty() {
            issues.push(Issue::EmptyContent);
            continue;
        }
        let mut start = cue.start_ms;
        let mut end = cue.end_ms;
        if end <= start {
            issues.push(Issue::EndBeforeStart);
            end = start + 500;
        }
        if start < 0 {
            issues.push(Issue::NegativeStart);
            start = 0;
        }
        if let Some(prev) = prev_end {
            if start < prev {
                issues.push(Issue::Overlap);
                let duration = end - start;
                start = prev;
                end = start + duration;
            }
        }
        prev_end = Some(end);
        fixed.push(Cue {
            index: fixed.len() + 1,
            start_ms: start,
            end_ms: end,
            text: content.to_string(),
        });
    }

    (fixed, issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start_ms: i64, end_ms: i64, text: &str) -> Cue {
        Cue::new(0, start_ms, end_ms, text)
    }

    #[test]
    fn test_drops_empty_content() {
        let (fixed, issues) = validate(&[cue(0, 1000, "  "), cue(1000, 2000, "ok")]);
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].text, "ok");
        assert!(issues.contains(&Issue::EmptyContent));
    }

    #[test]
    fn test_repairs_inverted_and_overlapping() {
        let (fixed, issues) = validate(&[cue(2000, 1000, "a"), cue(1500, 2000, "b")]);
        assert_eq!(fixed.len(), 2);
        assert!(fixed[0].start_ms <= fixed[0].end_ms);
        assert!(fixed[1].start_ms >= fixed[0].end_ms);
        assert!(!issues.is_empty());
        assert!(issues.contains(&Issue::EndBeforeStart));
        assert!(issues.contains(&Issue::Overlap));
    }

    #[test]
    fn test_clamps_negative_start() {
        let (fixed, issues) = validate(&[cue(-200, 300, "a")]);
        assert_eq!(fixed[0].start_ms, 0);
        assert!(issues.contains(&Issue::NegativeStart));
    }

    #[test]
    fn test_reindexes_contiguously() {
        let (fixed, _) = validate(&[cue(0, 100, "a"), cue(200, 50, ""), cue(300, 400, "c")]);
        let indices: Vec<usize> = fixed.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_fixed_point() {
        let input = vec![cue(2000, 1000, "a"), cue(1500, 2000, "b"), cue(-5, 0, "c")];
        let (once, _) = validate(&input);
        let (twice, issues) = validate(&once);
        assert_eq!(once, twice);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_overlap_preserves_duration() {
        let (fixed, _) = validate(&[cue(0, 3000, "a"), cue(1000, 2500, "b")]);
        assert_eq!(fixed[1].start_ms, 3000);
        assert_eq!(fixed[1].duration_ms(), 1500);
    }
}
