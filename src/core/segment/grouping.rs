//! Grouping of cues into translation contexts.
//!
//! A group is a contiguous run of cues the translator should see together:
//! consecutive cues whose gap is small and whose text has not reached a
//! sentence boundary, or whose current line is too short to stand alone.

use std::collections::BTreeMap;

/// One line prepared for translation, with its group assignment.
#[derive(Debug, Clone)]
pub struct GroupLine {
    /// Cue index the line came from.
    pub index: usize,
    /// Start in milliseconds.
    pub start_ms: i64,
    /// End in milliseconds.
    pub end_ms: i64,
    /// Source text with embedded newlines flattened to `<br>`.
    pub text_src: String,
    /// Assigned group id.
    pub group_id: Option<usize>,
}

/// A contiguous run of lines translated as one context.
#[derive(Debug, Clone)]
pub struct CueGroup {
    /// Group id.
    pub group_id: usize,
    /// Cue indices in order.
    pub line_indices: Vec<usize>,
    /// All member texts joined with spaces.
    pub full_text_src: String,
}

/// Language-family thresholds for grouping.
#[derive(Debug, Clone)]
pub struct GroupingConfig {
    /// Max inter-cue gap for time continuity.
    pub min_gap_ms: i64,
    /// "Short line" threshold in characters (CJK families).
    pub short_len_chars: Option<usize>,
    /// "Short line" threshold in words (Latin-like families).
    pub short_len_words: Option<usize>,
    /// Sentence-terminal characters.
    pub sentence_end_chars: &'static str,
}

impl GroupingConfig {
    /// Thresholds for the given source language family.
    pub fn for_lang(src_lang: &str) -> Self {
        let lower = src_lang.to_lowercase();
        if lower.starts_with("ja") {
            return Self {
                min_gap_ms: 600,
                short_len_chars: Some(6),
                short_len_words: None,
                sentence_end_chars: "。．！？!?…",
            };
        }
        Self {
            min_gap_ms: 600,
            short_len_chars: None,
            short_len_words: Some(3),
            sentence_end_chars: ".?!…",
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Assign group ids to `lines` in place and return the groups keyed by id.
pub fn group_lines(lines: &mut [GroupLine], src_lang: &str) -> BTreeMap<usize, CueGroup> {
    let cfg = GroupingConfig::for_lang(src_lang);
    if lines.is_empty() {
        return BTreeMap::new();
    }

    let mut current_group_id = 0usize;
    lines[0].group_id = Some(current_group_id);

    for i in 1..lines.len() {
        let gap_ms = lines[i].start_ms - lines[i - 1].end_ms;
        let prev_clean = lines[i - 1].text_src.replace("<br>", " ").trim().to_string();
        let cur_clean = lines[i].text_src.replace("<br>", " ").trim().to_string();

        let mut is_short = false;
        if let Some(chars) = cfg.short_len_chars {
            is_short = cur_clean.chars().count() <= chars;
        }
        if let Some(words) = cfg.short_len_words {
            is_short = is_short || word_count(&cur_clean) <= words;
        }

        let prev_ends_with_sentence = prev_clean
            .chars()
            .last()
            .map(|ch| cfg.sentence_end_chars.contains(ch))
            .unwrap_or(false);
        let time_continuous = gap_ms >= 0 && gap_ms <= cfg.min_gap_ms;

        let same_group = time_continuous && (is_short || !prev_ends_with_sentence);
        if same_group {
            lines[i].group_id = lines[i - 1].group_id;
        } else {
            current_group_id += 1;
            lines[i].group_id = Some(current_group_id);
        }
    }

    let mut groups: BTreeMap<usize, CueGroup> = BTreeMap::new();
    for line in lines.iter() {
        let Some(gid) = line.group_id else { continue };
        let group = groups.entry(gid).or_insert_with(|| CueGroup {
            group_id: gid,
            line_indices: Vec::new(),
            full_text_src: String::new(),
        });
        group.line_indices.push(line.index);
    }

    let by_index: BTreeMap<usize, &GroupLine> = lines.iter().map(|l| (l.index, l)).collect();
    for group in groups.values_mut() {
        let parts: Vec<String> = group
            .line_indices
            .iter()
            .filter_map(|idx| by_index.get(idx))
            .map(|l| l.text_src.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        group.full_text_src = parts.join(" ");
    }

    groups
}
