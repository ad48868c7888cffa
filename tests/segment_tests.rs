//! Segmentation scenarios: short-merge behavior and word-driven cue
//! construction with punctuation.

use subwatch::core::segment::{
    Segment, Sentence, SegmentCaps, Word, merge_short_segments, post_process, segment_sentences,
};

#[test]
fn short_first_segment_merges_into_following_line() {
    let segments = vec![
        Segment {
            start_ms: 0,
            end_ms: 400,
            text: "あ".to_string(),
        },
        Segment {
            start_ms: 450,
            end_ms: 2000,
            text: "こんにちは".to_string(),
        },
    ];
    let merged = merge_short_segments(segments, 1.0, 2, 3.5, 25, 200);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].start_ms, 0);
    assert_eq!(merged[0].end_ms, 2000);
    assert_eq!(merged[0].text, "あこんにちは");
}

#[test]
fn words_with_punctuation_drive_cue_boundaries() {
    let sentences = vec![Sentence {
        begin_ms: Some(0),
        end_ms: Some(1500),
        text: String::new(),
        words: vec![
            Word {
                begin_ms: Some(0),
                end_ms: Some(700),
                text: "こんにちは".to_string(),
                punctuation: "。".to_string(),
            },
            Word {
                begin_ms: Some(800),
                end_ms: Some(1500),
                text: "世界".to_string(),
                punctuation: String::new(),
            },
        ],
    }];
    let segments = segment_sentences(&sentences, 3.5, 25);
    let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
    assert!(joined.contains("こんにちは。世界"));
    assert_eq!(segments[0].start_ms, 0);
    assert_eq!(segments[0].end_ms, 700);
}

#[test]
fn post_mode_merges_and_reindexes() {
    let sentences = vec![
        Sentence {
            begin_ms: Some(0),
            end_ms: Some(400),
            text: "あ".to_string(),
            words: vec![],
        },
        Sentence {
            begin_ms: Some(450),
            end_ms: Some(2000),
            text: "こんにちは".to_string(),
            words: vec![],
        },
        Sentence {
            begin_ms: Some(5000),
            end_ms: Some(7000),
            text: "さようなら世界".to_string(),
            words: vec![],
        },
    ];
    let caps = SegmentCaps {
        max_duration_seconds: 3.5,
        max_chars: 25,
        min_duration_seconds: 1.0,
        min_chars: 2,
        merge_gap_ms: 200,
    };
    let cues = post_process(&sentences, &caps);
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].text, "あこんにちは");
    let indices: Vec<usize> = cues.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn latin_merge_keeps_word_separation() {
    let segments = vec![
        Segment {
            start_ms: 0,
            end_ms: 300,
            text: "so".to_string(),
        },
        Segment {
            start_ms: 350,
            end_ms: 2000,
            text: "it begins".to_string(),
        },
    ];
    let merged = merge_short_segments(segments, 1.0, 3, 3.5, 40, 200);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].text, "so it begins");
}
