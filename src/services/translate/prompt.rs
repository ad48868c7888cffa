//! Prompt construction for translation and polishing.

use crate::core::glossary::{Glossary, format_glossary};
use crate::core::workinfo::WorkInfo;
use crate::services::metadata::WorkMetadata;
use crate::services::translate::TranslateItem;

/// Confidence-tiered hint about the work the lines come from.
pub fn work_hint(work_info: Option<&WorkInfo>) -> String {
    let Some(info) = work_info else {
        return "作品信息未知。".to_string();
    };
    if info.source == "none" {
        return "作品信息未知。".to_string();
    }
    let title = info.title.as_deref().unwrap_or("未知");
    let season = info.season.as_deref().unwrap_or("未知");
    let episode = info.episode.as_deref().unwrap_or("未知");
    let level = if info.confidence >= 0.7 {
        "很可能是"
    } else if info.confidence >= 0.4 {
        "可能是"
    } else {
        "仅供参考，可能是"
    };
    format!(
        "{}《{}》，季/篇章：{}，集数：{}。如有歧义以上下文为准。",
        level, title, season, episode
    )
}

/// Render the metadata context block (titles, episode info, character
/// translations) appended to the background hint.
pub fn metadata_context(metadata: Option<&WorkMetadata>, dst_lang: &str) -> String {
    let Some(metadata) = metadata else {
        return String::new();
    };
    let mut lines = Vec::new();
    let mut title_parts = Vec::new();
    if let Some(title) = &metadata.title_original {
        title_parts.push(title.clone());
    }
    for (lang, title) in &metadata.title_localized {
        title_parts.push(format!("{}: {}", lang, title));
    }
    if !title_parts.is_empty() {
        lines.push(format!("作品标题：{}", title_parts.join(" / ")));
    }
    if metadata.season.is_some() || metadata.episode.is_some() {
        lines.push(format!(
            "集数信息：S{}E{}",
            metadata
                .season
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".into()),
            metadata
                .episode
                .map(|e| e.to_string())
                .unwrap_or_else(|| "?".into()),
        ));
    }
    for (lang, title) in &metadata.episode_title {
        lines.push(format!("本集标题({})：{}", lang, title));
    }
    let glossary = metadata.character_glossary(dst_lang);
    if !glossary.is_empty() {
        lines.push("主要角色与译名：".to_string());
        for (name, alias) in glossary.iter().take(20) {
            lines.push(format!("- {} => {}", name, alias));
        }
    }
    lines.join("\n")
}

/// Full background hint: work hint plus the metadata context when present.
pub fn context_hint(
    work_info: Option<&WorkInfo>,
    metadata: Option<&WorkMetadata>,
    dst_lang: &str,
) -> String {
    let hint = work_hint(work_info);
    let context = metadata_context(metadata, dst_lang);
    if context.is_empty() {
        hint
    } else {
        format!("{}\n\n{}", hint, context)
    }
}

fn context_block(item: &TranslateItem) -> String {
    format!(
        "【同组完整原文】:\n{}\n\n【上一行】:\n{}\n\n【当前行】:\n{}\n\n【下一行】:\n{}",
        item.full_text.replace("<br>", "\n"),
        item.prev_text.replace("<br>", "\n"),
        item.cur_text.replace("<br>", "\n"),
        item.next_text.replace("<br>", "\n"),
    )
}

/// System prompt for context-aware (one item per call) translation.
pub fn context_system_prompt(src_lang: &str, dst_lang: &str, glossary: &Glossary) -> String {
    format!(
        "你是专业的字幕翻译人员。\n\n\
         - 源语言：{}\n\
         - 目标语言：{}\n\n\
         任务：将源语言字幕翻译成适合影视字幕阅读的简洁口语化译文。\n\n\
         硬性要求：\n\
         - 严格做到「一行输入对应一行输出」：每个条目只翻译当前行。\n\
         - 不合并行、不拆分行、不输出多余解释或标注。\n\
         - 不得随意删除信息，必要时可根据上下文补齐省略。\n\
         - 保留人名、地名、技能名、组织名等专有名词。\n\n{}",
        src_lang,
        dst_lang,
        format_glossary(glossary)
    )
}

/// System prompt for bulk (numbered batch) translation.
pub fn bulk_system_prompt(dst_lang: &str, glossary: &Glossary) -> String {
    format!(
        "你是专业影视字幕译者。翻译为{}，保持与输入行数一致。\
         一行输入对应一行输出，不要增删行。\
         输出时每行以编号 [n] 开头，对应输入编号。\
         不要添加解释、不要多余标点。\
         遇到人名或专有名词尽量保留原文或音译。译文要短、口语化、适合字幕阅读。\n\n{}",
        dst_lang,
        format_glossary(glossary)
    )
}

/// User prompt for a context-aware call.
pub fn context_user_prompt(items: &[TranslateItem], hint: &str) -> String {
    let blocks: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{}]\n{}", i + 1, context_block(item)))
        .collect();
    if items.len() == 1 {
        format!(
            "背景提示：{}\n\n下面是当前字幕行及上下文。请只翻译【当前行】，仅输出 1 行译文，不要编号。\n{}",
            hint,
            blocks.join("\n\n")
        )
    } else {
        format!(
            "背景提示：{}\n\n下面是若干条字幕台词，每条前面都有编号 [n]。请参考上下文，只翻译【当前行】，保持行号不变。输出时每行以相同编号开头。\n{}",
            hint,
            blocks.join("\n\n")
        )
    }
}

/// User prompt for a bulk call: numbered source lines.
pub fn bulk_user_prompt(items: &[TranslateItem], hint: &str) -> String {
    let lines: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[{}] {}", i + 1, item.cur_text))
        .collect();
    format!(
        "背景提示：{}\n\n下面是若干条字幕台词，每条前面都有编号 [n]。请逐条翻译，保持行号不变。输出时每行以相同的编号开头，后面是译文。\n{}",
        hint,
        lines.join("\n")
    )
}

/// System prompt for the polish pass: refine wording, never re-translate.
pub fn polish_system_prompt(glossary: &Glossary) -> String {
    format!(
        "你是负责润色已有翻译字幕的编辑。\
         不要重新翻译，只微调译文用词、统一术语、使上下文更自然。\
         不得增删行，每行输出对应一行输入。\
         每行必须保留开头编号 [n]，编号不可更改。\n\n{}",
        format_glossary(glossary)
    )
}

/// User prompt for one polish block of `(source, translation)` pairs.
pub fn polish_user_prompt(
    originals: &[String],
    translations: &[String],
    work_info: Option<&WorkInfo>,
) -> String {
    let hint = match work_info {
        Some(info) if info.source != "none" => format!(
            "作品提示：可能是《{}》，如有歧义以上下文为准。",
            info.title.as_deref().unwrap_or("未知")
        ),
        _ => "作品信息未知。".to_string(),
    };
    let pairs: Vec<String> = originals
        .iter()
        .zip(translations.iter())
        .enumerate()
        .map(|(i, (src, trans))| format!("[{}]\n原文：{}\n译文：{}\n", i + 1, src, trans))
        .collect();
    format!(
        "{}\n\n请按编号顺序润色译文，保持行数一致，只输出润色后的译文，每行以编号开头：\n{}",
        hint,
        pairs.join("\n")
    )
}
