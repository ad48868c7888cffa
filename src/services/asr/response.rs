//! Recognition response parsing.
//!
//! Vendor envelopes are weakly typed: fields move between `output`,
//! `results` and `transcripts`, and key names vary between the batch and
//! streaming APIs. Parsing is a total function over `serde_json::Value`;
//! absent or oddly-typed fields become `None`, never errors. Error
//! envelopes are detected separately: a non-zero `code` is a failure even
//! under HTTP 200.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::core::segment::{Sentence, Word};
use crate::core::srt::{Cue, sanitize_text};

/// Fields of interest pulled out of a recognition response.
#[derive(Debug, Default)]
pub struct ParsedRecognition {
    /// Sentence list with optional word timings.
    pub sentences: Vec<Sentence>,
    /// Bare word list (some responses carry words without sentences).
    pub words: Vec<Word>,
    /// Pointer to an out-of-line transcript, when the response carries one.
    pub transcription_url: Option<String>,
}

fn first_i64(item: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(value) = item.get(*key) {
            if let Some(n) = value.as_i64() {
                return Some(n);
            }
            if let Some(f) = value.as_f64() {
                return Some(f as i64);
            }
        }
    }
    None
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| item.get(*key).and_then(Value::as_str))
}

fn parse_word(item: &Value) -> Option<Word> {
    if !item.is_object() {
        return None;
    }
    Some(Word {
        begin_ms: first_i64(item, &["begin_time", "start_time", "start"]),
        end_ms: first_i64(item, &["end_time", "end"]),
        text: first_str(item, &["text", "word"]).unwrap_or("").to_string(),
        punctuation: first_str(item, &["punctuation"]).unwrap_or("").to_string(),
    })
}

fn parse_sentence(item: &Value) -> Option<Sentence> {
    if !item.is_object() {
        return None;
    }
    let words = item
        .get("words")
        .or_else(|| item.get("word_list"))
        .and_then(Value::as_array)
        .map(|words| words.iter().filter_map(parse_word).collect())
        .unwrap_or_default();
    Some(Sentence {
        begin_ms: first_i64(item, &["begin_time", "start_time", "start"]),
        end_ms: first_i64(item, &["end_time", "end"]),
        text: first_str(item, &["text", "sentence", "transcription"])
            .unwrap_or("")
            .to_string(),
        words,
    })
}

/// Drill through `output`/`results`/`transcripts` indirection to the result
/// object carrying sentences or words.
fn result_object(response: &Value) -> Option<Value> {
    let output = response.get("output").unwrap_or(response);
    let mut result = match output {
        Value::Object(_) => match output.get("results").and_then(Value::as_array) {
            Some(results) if !results.is_empty() => results[0].clone(),
            _ => output.clone(),
        },
        Value::Array(items) if !items.is_empty() => items[0].clone(),
        _ => return None,
    };
    if let Some(transcripts) = result.get("transcripts").and_then(Value::as_array) {
        if let Some(first) = transcripts.first() {
            result = first.clone();
        }
    }
    result.is_object().then_some(result)
}

/// Parse a recognition response into sentences, words and the optional
/// transcript URL.
pub fn parse_recognition(response: &Value) -> ParsedRecognition {
    let Some(result) = result_object(response) else {
        return ParsedRecognition::default();
    };

    let sentences: Vec<Sentence> = result
        .get("sentences")
        .or_else(|| result.get("sentence_list"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_sentence).collect())
        .unwrap_or_default();
    let words: Vec<Word> = result
        .get("words")
        .or_else(|| result.get("word_list"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_word).collect())
        .unwrap_or_default();
    let transcription_url = result
        .get("transcription_url")
        .and_then(Value::as_str)
        .map(str::to_string);

    ParsedRecognition {
        sentences,
        words,
        transcription_url,
    }
}

/// Extract a vendor error message from a response envelope.
///
/// Checks the top level and the `output` object for a `code` other than
/// 0/200 paired with a message. Returns `None` for clean responses.
pub fn extract_error(response: &Value) -> Option<String> {
    let mut candidates = vec![response];
    if let Some(output) = response.get("output") {
        if output.is_object() {
            candidates.push(output);
        }
    }
    for item in candidates {
        let code = item.get("code").or_else(|| item.get("status_code"));
        let message = item
            .get("message")
            .or_else(|| item.get("msg"))
            .or_else(|| item.get("error"));
        if code.is_none() && message.is_none() {
            continue;
        }
        let code_ok = match code {
            None => false,
            Some(Value::Number(n)) => n.as_i64() == Some(0) || n.as_i64() == Some(200),
            Some(Value::String(s)) => s == "0" || s == "200" || s.is_empty(),
            Some(Value::Null) => true,
            _ => false,
        };
        if code_ok {
            continue;
        }
        let code_text = code
            .map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let message_text = message
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        return Some(format!("vendor error: {} {}", code_text, message_text).trim().to_string());
    }
    None
}

const WORD_BREAK_PUNCT: &[&str] = &[",", ".", "?", "!", ":", ";", "。", "？", "！"];
const MAX_WORDS_PER_CUE: usize = 12;

static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

/// Build cues directly from sentence timings (`auto` segmentation).
pub fn cues_from_sentences(sentences: &[Sentence]) -> Vec<Cue> {
    let mut cues = Vec::new();
    for item in sentences {
        let (Some(start), Some(end)) = (item.begin_ms, item.end_ms) else {
            continue;
        };
        let text = item.text.trim();
        if text.is_empty() {
            continue;
        }
        let end = if end <= start { start + 500 } else { end };
        cues.push(Cue::new(
            cues.len() + 1,
            start,
            end,
            sanitize_text(text),
        ));
    }
    cues
}

/// Build cues from a bare word list, breaking on punctuation or every
/// `MAX_WORDS_PER_CUE` words.
pub fn cues_from_words(words: &[Word]) -> Vec<Cue> {
    let mut cues: Vec<Cue> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut seg_start: Option<i64> = None;
    let mut seg_end: i64 = 0;

    let mut flush = |buffer: &mut Vec<String>, seg_start: &mut Option<i64>, seg_end: i64, cues: &mut Vec<Cue>| {
        if let Some(start) = *seg_start {
            if !buffer.is_empty() {
                let text = buffer.join(" ");
                let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1").into_owned();
                let end = if seg_end <= start { start + 500 } else { seg_end };
                cues.push(Cue::new(cues.len() + 1, start, end, sanitize_text(text.trim())));
            }
        }
        buffer.clear();
        *seg_start = None;
    };

    for word in words {
        let token = word.text.trim();
        if token.is_empty() {
            continue;
        }
        let (Some(start), Some(end)) = (word.begin_ms, word.end_ms) else {
            continue;
        };
        if seg_start.is_none() {
            seg_start = Some(start);
        }
        seg_end = end;
        buffer.push(token.to_string());
        if WORD_BREAK_PUNCT.contains(&token) || buffer.len() >= MAX_WORDS_PER_CUE {
            flush(&mut buffer, &mut seg_start, seg_end, &mut cues);
        }
    }
    flush(&mut buffer, &mut seg_start, seg_end, &mut cues);
    cues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_offline_shape() {
        let response = json!({
            "output": {
                "results": [{
                    "transcripts": [{
                        "sentences": [
                            {"begin_time": 0, "end_time": 700, "text": "こんにちは",
                             "words": [{"begin_time": 0, "end_time": 700, "text": "こんにちは", "punctuation": "。"}]},
                            {"start_time": 800, "end": 1500, "sentence": "世界"}
                        ]
                    }]
                }]
            }
        });
        let parsed = parse_recognition(&response);
        assert_eq!(parsed.sentences.len(), 2);
        assert_eq!(parsed.sentences[0].text, "こんにちは");
        assert_eq!(parsed.sentences[0].words.len(), 1);
        assert_eq!(parsed.sentences[0].words[0].punctuation, "。");
        // Alternative key spellings are accepted.
        assert_eq!(parsed.sentences[1].begin_ms, Some(800));
        assert_eq!(parsed.sentences[1].end_ms, Some(1500));
        assert_eq!(parsed.sentences[1].text, "世界");
    }

    #[test]
    fn test_parse_streaming_shape() {
        let response = json!({
            "transcripts": [{"sentences": [
                {"begin_time": 10, "end_time": 900, "text": "hello"}
            ]}]
        });
        let parsed = parse_recognition(&response);
        assert_eq!(parsed.sentences.len(), 1);
    }

    #[test]
    fn test_parse_transcription_url() {
        let response = json!({
            "output": {"results": [{"transcription_url": "https://cdn.example/t.json"}]}
        });
        let parsed = parse_recognition(&response);
        assert!(parsed.sentences.is_empty());
        assert_eq!(
            parsed.transcription_url.as_deref(),
            Some("https://cdn.example/t.json")
        );
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_recognition(&json!("string")).sentences.is_empty());
        assert!(parse_recognition(&json!(null)).sentences.is_empty());
        assert!(parse_recognition(&json!({"output": []})).sentences.is_empty());
    }

    #[test]
    fn test_extract_error_detects_nonzero_code() {
        let response = json!({"output": {"code": "InvalidParameter", "message": "bad model"}});
        let error = extract_error(&response).unwrap();
        assert!(error.contains("InvalidParameter"));
        assert!(error.contains("bad model"));
    }

    #[test]
    fn test_extract_error_accepts_success_codes() {
        assert!(extract_error(&json!({"code": 200, "message": "ok"})).is_none());
        assert!(extract_error(&json!({"code": "0"})).is_none());
        assert!(extract_error(&json!({"output": {"sentences": []}})).is_none());
    }

    #[test]
    fn test_cues_from_sentences_skips_and_repairs() {
        let sentences = vec![
            Sentence {
                begin_ms: Some(0),
                end_ms: Some(0),
                text: "inverted".into(),
                words: vec![],
            },
            Sentence {
                begin_ms: None,
                end_ms: Some(100),
                text: "no start".into(),
                words: vec![],
            },
        ];
        let cues = cues_from_sentences(&sentences);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].end_ms, 500);
    }

    #[test]
    fn test_cues_from_words_breaks_on_punctuation() {
        let word = |b: i64, e: i64, t: &str| Word {
            begin_ms: Some(b),
            end_ms: Some(e),
            text: t.into(),
            punctuation: String::new(),
        };
        let words = vec![word(0, 100, "hello"), word(100, 200, "."), word(300, 400, "world")];
        let cues = cues_from_words(&words);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "hello.");
        assert_eq!(cues[1].text, "world");
    }
}
