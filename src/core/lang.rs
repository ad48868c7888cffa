//! Language tags and script classification shared across the pipeline.

/// Normalize a language tag: lowercase, `_` replaced by `-`.
pub fn normalize_lang(value: &str) -> String {
    value.trim().to_lowercase().replace('_', "-")
}

/// Collapse a language tag to the codes the recogniser understands.
///
/// `jpn`/`ja*` becomes `ja`, `eng`/`en*` becomes `en`, `chi`/`zh*` becomes
/// `zh`; anything else passes through, empty becomes `auto`.
pub fn normalize_lang_for_asr(value: &str) -> String {
    let norm = normalize_lang(value);
    if norm.starts_with("jpn") || norm.starts_with("ja") {
        return "ja".to_string();
    }
    if norm.starts_with("eng") || norm.starts_with("en") {
        return "en".to_string();
    }
    if norm.starts_with("chi") || norm.starts_with("zh") {
        return "zh".to_string();
    }
    if norm.is_empty() {
        return "auto".to_string();
    }
    norm
}

/// Collapse a language tag to a two-letter base code for confidence
/// estimation: `jpn` becomes `ja`, `zho`/`chi`/`cn` become `zh`, `eng`
/// becomes `en`.
pub fn normalize_lang_tag(value: &str) -> String {
    if value.trim().is_empty() {
        return String::new();
    }
    let norm = normalize_lang(value);
    let base = norm.split('-').next().unwrap_or("");
    match base {
        "jpn" | "ja" | "japanese" => "ja".to_string(),
        "chi" | "zho" | "zh" | "cn" => "zh".to_string(),
        "eng" | "en" | "english" => "en".to_string(),
        other => other.to_string(),
    }
}

/// Guess a three-letter language code from a filename or label.
pub fn guess_lang_from_label(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if ["jpn", "ja", "japanese", "日本語"]
        .iter()
        .any(|t| lower.contains(t))
    {
        return Some("jpn");
    }
    if ["eng", "en", "english"].iter().any(|t| lower.contains(t)) {
        return Some("eng");
    }
    if ["chi", "zh", "chs", "cht", "中文", "简体", "繁体"]
        .iter()
        .any(|t| lower.contains(t))
    {
        return Some("chi");
    }
    None
}

/// True when `ch` is hiragana or katakana.
pub fn is_kana(ch: char) -> bool {
    ('\u{3040}'..='\u{30ff}').contains(&ch)
}

/// True when `ch` is in the CJK unified ideographs block.
pub fn is_han(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

/// True when the text contains any kana.
pub fn has_kana(text: &str) -> bool {
    text.chars().any(is_kana)
}

/// True when the text contains any Han ideograph.
pub fn has_han(text: &str) -> bool {
    text.chars().any(is_han)
}

/// True when the text contains any ASCII letter.
pub fn has_latin(text: &str) -> bool {
    text.chars().any(|ch| ch.is_ascii_alphabetic())
}

/// True when every character is ASCII.
pub fn is_ascii_text(text: &str) -> bool {
    text.chars().all(|ch| (ch as u32) < 128)
}
