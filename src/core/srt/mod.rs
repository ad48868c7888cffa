//! SRT primitives: the [`Cue`] type, strict parsing and serialization,
//! lenient text-file decoding and subtitle text sanitization.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::Result;
use crate::error::SubWatchError;

pub mod validator;

/// One subtitle line with millisecond timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// 1-based cue index.
    pub index: usize,
    /// Start timestamp in milliseconds.
    pub start_ms: i64,
    /// End timestamp in milliseconds.
    pub end_ms: i64,
    /// Cue content; multi-line content is newline-joined.
    pub text: String,
}

impl Cue {
    /// Construct a cue. Indices are reassigned on compose, so callers may
    /// pass a provisional value.
    pub fn new(index: usize, start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        Self {
            index,
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    /// Cue duration in milliseconds; negative spans collapse to zero.
    pub fn duration_ms(&self) -> i64 {
        (self.end_ms - self.start_ms).max(0)
    }

    /// Shift both timestamps forward by `offset_ms`.
    pub fn offset(&self, offset_ms: i64) -> Cue {
        Cue {
            index: self.index,
            start_ms: self.start_ms + offset_ms,
            end_ms: self.end_ms + offset_ms,
            text: self.text.clone(),
        }
    }
}

static TIME_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3}) --> (\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

/// Parse SRT content into cues.
///
/// Blocks are separated by blank lines. Blocks whose timing line does not
/// match the SRT timestamp format are skipped; a malformed index line is an
/// error.
pub fn parse(content: &str) -> Result<Vec<Cue>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in content.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }

        let index: usize = lines[0].trim().parse().map_err(|e| {
            SubWatchError::subtitle("SRT", format!("invalid cue index: {}", e))
        })?;

        if let Some(caps) = TIME_LINE.captures(lines[1]) {
            let start_ms = capture_ms(&caps, 1);
            let end_ms = capture_ms(&caps, 5);
            let text = lines[2..].join("\n");
            cues.push(Cue {
                index,
                start_ms,
                end_ms,
                text,
            });
        }
    }

    Ok(cues)
}

fn capture_ms(caps: &regex::Captures<'_>, start_group: usize) -> i64 {
    // Groups are \d{2,3} so the parses cannot fail.
    let hours: i64 = caps[start_group].parse().unwrap();
    let minutes: i64 = caps[start_group + 1].parse().unwrap();
    let seconds: i64 = caps[start_group + 2].parse().unwrap();
    let millis: i64 = caps[start_group + 3].parse().unwrap();
    hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis
}

/// Serialize cues to SRT text: UTF-8, no BOM, trailing newline.
///
/// Indices are rewritten 1..N regardless of the values on the cues.
pub fn compose(cues: &[Cue]) -> String {
    let mut output = String::new();
    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            ms_to_timestamp(cue.start_ms),
            ms_to_timestamp(cue.end_ms)
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }
    output.trim_end().to_string() + "\n"
}

/// Format a millisecond timestamp as `HH:MM:SS,mmm`, clamping negatives.
pub fn ms_to_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Read a text file tolerating the encodings subtitle files appear in:
/// UTF-8 with or without BOM, UTF-16 LE/BE with BOM, and GB18030.
pub fn read_text_file(path: &Path) -> String {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return String::new(),
    };
    decode_subtitle_bytes(&data)
}

/// Decode raw subtitle bytes; see [`read_text_file`].
pub fn decode_subtitle_bytes(data: &[u8]) -> String {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&data[3..]).into_owned();
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        let (text, _, _) = encoding_rs::UTF_16LE.decode(data);
        return text.into_owned();
    }
    if data.starts_with(&[0xFE, 0xFF]) {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(data);
        return text.into_owned();
    }
    if let Ok(text) = std::str::from_utf8(data) {
        return text.to_string();
    }
    let (text, _, had_errors) = encoding_rs::GB18030.decode(data);
    if !had_errors {
        return text.into_owned();
    }
    String::from_utf8_lossy(data).into_owned()
}

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BRACE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]*\}").unwrap());
static NUM_PREFIX_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[\d+\]\s*").unwrap());
static NUM_PREFIX_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)\:]\s*").unwrap());

/// Strip markup and enumeration prefixes from subtitle text, per line.
pub fn sanitize_text(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let stripped = line.trim_start_matches('\u{feff}');
        let stripped = MARKUP_TAG.replace_all(stripped, "");
        let stripped = BRACE_BLOCK.replace_all(&stripped, "");
        let stripped = NUM_PREFIX_BRACKET.replace_all(&stripped, "");
        let stripped = NUM_PREFIX_PLAIN.replace_all(&stripped, "");
        lines.push(stripped.into_owned());
    }
    lines.join("\n").trim().to_string()
}

/// Strip a leading `[n]` or `n.`-style enumeration prefix from one line.
pub fn clean_line_prefix(text: &str) -> String {
    let stripped = text.trim_start_matches('\u{feff}').trim();
    let stripped = NUM_PREFIX_BRACKET.replace_all(stripped, "");
    NUM_PREFIX_PLAIN.replace_all(&stripped, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:03,000\nHello, World!\n\n2\n00:00:05,000 --> 00:00:08,000\nThis is a test subtitle.\n多行測試\n\n";

    #[test]
    fn test_srt_parsing_basic() {
        let cues = parse(SAMPLE_SRT).unwrap();

        assert_eq!(cues.len(), 2);
        let first = &cues[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.start_ms, 1000);
        assert_eq!(first.end_ms, 3000);
        assert_eq!(first.text, "Hello, World!");

        let second = &cues[1];
        assert_eq!(second.start_ms, 5000);
        assert_eq!(second.end_ms, 8000);
        assert_eq!(second.text, "This is a test subtitle.\n多行測試");
    }

    #[test]
    fn test_srt_serialization_roundtrip() {
        let cues = parse(SAMPLE_SRT).unwrap();
        let serialized = compose(&cues);
        let reparsed = parse(&serialized).unwrap();
        assert_eq!(cues.len(), reparsed.len());
        for (o, r) in cues.iter().zip(reparsed.iter()) {
            assert_eq!(o.start_ms, r.start_ms);
            assert_eq!(o.end_ms, r.end_ms);
            assert_eq!(o.text, r.text);
        }
    }

    #[test]
    fn test_srt_invalid_format() {
        let invalid_time = "1\n00:00:01 --> 00:00:03\nText\n\n";
        let cues = parse(invalid_time).unwrap();
        assert_eq!(cues.len(), 0);
        let invalid_index = "invalid\n00:00:01,000 --> 00:00:03,000\nText\n\n";
        assert!(parse(invalid_index).is_err());
    }

    #[test]
    fn test_srt_empty_and_malformed_blocks() {
        assert_eq!(parse("").unwrap().len(), 0);
        assert_eq!(parse("\n\n\n").unwrap().len(), 0);
        let malformed = "1\n00:00:01,000 --> 00:00:03,000\n\n";
        assert_eq!(parse(malformed).unwrap().len(), 0);
    }

    #[test]
    fn test_bom_and_crlf_tolerated() {
        let content = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nhi\r\n\r\n";
        let cues = parse(content).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "hi");
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(ms_to_timestamp(0), "00:00:00,000");
        assert_eq!(ms_to_timestamp(-50), "00:00:00,000");
        assert_eq!(
            ms_to_timestamp(23 * 3_600_000 + 59 * 60_000 + 59 * 1000 + 999),
            "23:59:59,999"
        );
    }

    #[test]
    fn test_compose_reindexes() {
        let cues = vec![
            Cue::new(7, 0, 1000, "a"),
            Cue::new(9, 2000, 3000, "b"),
        ];
        let text = compose(&cues);
        assert!(text.starts_with("1\n"));
        assert!(text.contains("\n\n2\n"));
        assert!(text.ends_with('\n'));
        assert!(!text.ends_with("\n\n"));
    }

    #[test]
    fn test_sanitize_text_strips_markup_and_prefixes() {
        assert_eq!(sanitize_text("<i>hello</i>"), "hello");
        assert_eq!(sanitize_text("{\\an8}note"), "note");
        assert_eq!(sanitize_text("[3] line"), "line");
        assert_eq!(sanitize_text("2. line"), "line");
        assert_eq!(sanitize_text("  plain  "), "plain");
    }

    #[test]
    fn test_clean_line_prefix() {
        assert_eq!(clean_line_prefix("[12] こんにちは"), "こんにちは");
        assert_eq!(clean_line_prefix("3: text"), "text");
        assert_eq!(clean_line_prefix("no prefix"), "no prefix");
    }

    #[test]
    fn test_decode_utf16le_bytes() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_subtitle_bytes(&data), "hi");
    }
}
