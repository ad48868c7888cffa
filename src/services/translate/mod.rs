//! Translation pipeline: deterministic caching, context-grouped batching,
//! the line-count invariant with per-line fallback, the optional polish
//! pass and bilingual assembly.

use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::{BilingualOrder, TranslateConfig};
use crate::core::glossary::Glossary;
use crate::core::segment::grouping::{GroupLine, group_lines};
use crate::core::srt::{Cue, clean_line_prefix, sanitize_text};
use crate::core::workinfo::WorkInfo;
use crate::error::SubWatchError;
use crate::services::chat::ChatModel;
use crate::services::metadata::WorkMetadata;

pub mod cache;
pub mod prompt;

pub use cache::{MemoryCache, SqliteCache, TranslationCache, cache_key};

/// One line prepared for translation with its surrounding context.
#[derive(Debug, Clone, Default)]
pub struct TranslateItem {
    /// The line being translated.
    pub cur_text: String,
    /// Previous line in the same group.
    pub prev_text: String,
    /// Next line in the same group.
    pub next_text: String,
    /// The whole group's source text.
    pub full_text: String,
}

/// Split a completion into trimmed, prefix-stripped, non-empty lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(clean_line_prefix)
        .collect()
}

/// Wrap single-line CJK text at `max_chars` characters. Multi-line text and
/// non-Chinese targets pass through unchanged.
pub fn wrap_lines(text: &str, dst_lang: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.contains('\n') || !dst_lang.starts_with("zh") {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build translation items from cues, grouped into contexts.
pub fn items_from_cues(cues: &[Cue], src_lang: &str, grouping_enabled: bool) -> Vec<TranslateItem> {
    let mut lines: Vec<GroupLine> = cues
        .iter()
        .map(|cue| GroupLine {
            index: cue.index,
            start_ms: cue.start_ms,
            end_ms: cue.end_ms,
            text_src: sanitize_text(&cue.text).replace('\n', "<br>"),
            group_id: None,
        })
        .collect();

    if !grouping_enabled {
        return lines
            .iter()
            .map(|line| TranslateItem {
                cur_text: line.text_src.clone(),
                full_text: line.text_src.clone(),
                ..TranslateItem::default()
            })
            .collect();
    }

    let groups = group_lines(&mut lines, src_lang);
    let by_index: std::collections::BTreeMap<usize, &GroupLine> =
        lines.iter().map(|l| (l.index, l)).collect();

    lines
        .iter()
        .map(|line| {
            let Some(group) = line.group_id.and_then(|gid| groups.get(&gid)) else {
                return TranslateItem {
                    cur_text: line.text_src.clone(),
                    full_text: line.text_src.clone(),
                    ..TranslateItem::default()
                };
            };
            let pos = group
                .line_indices
                .iter()
                .position(|&idx| idx == line.index)
                .unwrap_or(0);
            let prev_text = if pos > 0 {
                by_index
                    .get(&group.line_indices[pos - 1])
                    .map(|l| l.text_src.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            };
            let next_text = if pos + 1 < group.line_indices.len() {
                by_index
                    .get(&group.line_indices[pos + 1])
                    .map(|l| l.text_src.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            };
            TranslateItem {
                cur_text: line.text_src.clone(),
                prev_text,
                next_text,
                full_text: group.full_text_src.clone(),
            }
        })
        .collect()
}

/// Everything one translation run needs besides the items themselves.
pub struct TranslateContext<'a> {
    /// Chat model issuing the calls.
    pub chat: Arc<dyn ChatModel>,
    /// Translation cache.
    pub cache: Arc<dyn TranslationCache>,
    /// Pipeline configuration.
    pub cfg: &'a TranslateConfig,
    /// Source language.
    pub src_lang: &'a str,
    /// Destination language.
    pub dst_lang: &'a str,
    /// Work inference for prompt hints.
    pub work_info: Option<&'a WorkInfo>,
    /// Merged glossary.
    pub glossary: &'a Glossary,
    /// Resolved metadata for prompt context.
    pub metadata: Option<&'a WorkMetadata>,
    /// Append-only failure log.
    pub failed_log: &'a Path,
}

fn append_failed(log_path: &Path, header: &str, body: &str, error: &str) {
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .and_then(|mut f| writeln!(f, "{}\n{}\nERROR: {}\n", header, body, error));
    if let Err(e) = result {
        log::warn!("could not append to {}: {}", log_path.display(), e);
    }
}

async fn call_llm(ctx: &TranslateContext<'_>, batch: &[TranslateItem]) -> Result<String> {
    let hint = prompt::context_hint(ctx.work_info, ctx.metadata, ctx.dst_lang);
    let (system, user) = if ctx.cfg.context_aware {
        (
            prompt::context_system_prompt(ctx.src_lang, ctx.dst_lang, ctx.glossary),
            prompt::context_user_prompt(batch, &hint),
        )
    } else {
        (
            prompt::bulk_system_prompt(ctx.dst_lang, ctx.glossary),
            prompt::bulk_user_prompt(batch, &hint),
        )
    };

    let mut last_error = None;
    for attempt in 0..ctx.cfg.retry.max(1) {
        match ctx.chat.complete(&system, &user).await {
            Ok(raw) => return Ok(raw),
            Err(e) => {
                last_error = Some(e);
                if attempt + 1 < ctx.cfg.retry.max(1) {
                    tokio::time::sleep(Duration::from_secs(2 * (1 << attempt) as u64)).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| SubWatchError::translation("no attempts made")))
}

/// Translate one batch, enforcing the line-count invariant.
async fn translate_batch(
    ctx: &TranslateContext<'_>,
    batch: &[TranslateItem],
) -> Result<Vec<String>> {
    let raw = call_llm(ctx, batch).await?;
    let mut out_lines = normalize_lines(&raw);
    if out_lines.len() != batch.len() {
        if ctx.cfg.context_aware && batch.len() == 1 {
            // Single-item calls may come back with stray blank lines; take
            // the first real line.
            let first = raw
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(clean_line_prefix)
                .unwrap_or_default();
            out_lines = vec![first];
        }
        if out_lines.len() != batch.len() || out_lines.iter().any(|l| l.is_empty()) {
            return Err(SubWatchError::translation(format!(
                "line count mismatch: {} in, {} out",
                batch.len(),
                out_lines.len()
            )));
        }
    }
    Ok(out_lines)
}

/// Translate items with caching, batching, the invariant and fallback.
///
/// The returned vector has exactly one translated line per input item; a
/// line that failed all retries falls back to its source text verbatim.
pub async fn translate_items(
    ctx: &TranslateContext<'_>,
    items: &[TranslateItem],
) -> Vec<String> {
    let mut results: Vec<Option<String>> = vec![None; items.len()];
    let mut to_translate: Vec<(usize, String, TranslateItem)> = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let key = cache_key(ctx.src_lang, ctx.dst_lang, &item.cur_text);
        match ctx.cache.get(&key) {
            Some(cached) => {
                // Canonicalise old entries on the way out.
                let cleaned = clean_line_prefix(&cached);
                ctx.cache.set(&key, &cleaned);
                results[i] = Some(cleaned);
            }
            None => to_translate.push((i, key, item.clone())),
        }
    }

    if to_translate.is_empty() {
        return results.into_iter().map(Option::unwrap_or_default).collect();
    }

    let batch_size = if ctx.cfg.context_aware {
        1
    } else {
        ctx.cfg.batch_lines.max(1)
    };
    let batches: Vec<Vec<(usize, String, TranslateItem)>> = to_translate
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    let outcomes: Vec<(Vec<(usize, String, TranslateItem)>, Result<Vec<String>>)> =
        futures::stream::iter(batches.into_iter().map(|batch| async move {
            let items: Vec<TranslateItem> =
                batch.iter().map(|(_, _, item)| item.clone()).collect();
            let outcome = translate_batch(ctx, &items).await;
            (batch, outcome)
        }))
        .buffer_unordered(ctx.cfg.max_concurrent.max(1))
        .collect()
        .await;

    for (batch, outcome) in outcomes {
        match outcome {
            Ok(lines) => {
                for ((i, key, _item), line) in batch.iter().zip(lines) {
                    let cleaned = clean_line_prefix(&line);
                    ctx.cache.set(key, &cleaned);
                    results[*i] = Some(cleaned);
                }
            }
            Err(err) => {
                let body: Vec<String> =
                    batch.iter().map(|(_, _, item)| item.cur_text.clone()).collect();
                append_failed(
                    ctx.failed_log,
                    "BATCH_FAILED",
                    &body.join("\n"),
                    &err.to_string(),
                );
                // Retry each line of the failed batch individually.
                for (i, key, item) in &batch {
                    let single = std::slice::from_ref(item);
                    match translate_batch(ctx, single).await {
                        Ok(mut lines) => {
                            let cleaned = clean_line_prefix(&lines.remove(0));
                            ctx.cache.set(key, &cleaned);
                            results[*i] = Some(cleaned);
                        }
                        Err(err) => {
                            append_failed(
                                ctx.failed_log,
                                "LINE_FAILED",
                                &item.cur_text,
                                &err.to_string(),
                            );
                            results[*i] = Some(item.cur_text.clone());
                        }
                    }
                }
            }
        }
    }

    let mut translated: Vec<String> =
        results.into_iter().map(Option::unwrap_or_default).collect();
    if ctx.cfg.use_polish {
        let originals: Vec<String> = items.iter().map(|i| i.cur_text.clone()).collect();
        translated = polish(ctx, &originals, translated).await;
    }
    translated
}

/// Polish translated lines in blocks; a block whose output breaks the line
/// count is left unchanged.
pub async fn polish(
    ctx: &TranslateContext<'_>,
    originals: &[String],
    translated: Vec<String>,
) -> Vec<String> {
    if translated.is_empty() {
        return translated;
    }
    let batch_size = ctx.cfg.polish_batch_size.max(1);
    let mut polished = Vec::with_capacity(translated.len());
    for (block_originals, block_translated) in originals
        .chunks(batch_size)
        .zip(translated.chunks(batch_size))
    {
        let system = prompt::polish_system_prompt(ctx.glossary);
        let user = prompt::polish_user_prompt(block_originals, block_translated, ctx.work_info);
        let outcome = ctx.chat.complete(&system, &user).await;
        let block = match outcome {
            Ok(raw) => {
                let lines = normalize_lines(&raw);
                if lines.len() == block_translated.len() {
                    lines
                } else {
                    block_translated.to_vec()
                }
            }
            Err(_) => block_translated.to_vec(),
        };
        polished.extend(block);
    }
    polished
}

/// Translate a cue list into a new cue list for `dst_lang`.
pub async fn translate_cues(ctx: &TranslateContext<'_>, cues: &[Cue]) -> Vec<Cue> {
    let items = items_from_cues(cues, ctx.src_lang, ctx.cfg.grouping_enabled);
    let translated = translate_items(ctx, &items).await;
    cues.iter()
        .zip(translated)
        .map(|(cue, text)| {
            let content = text.replace("<br>", "\n");
            let content = wrap_lines(content.trim(), ctx.dst_lang, ctx.cfg.max_chars_per_line);
            let content = sanitize_text(&content);
            Cue::new(cue.index, cue.start_ms, cue.end_ms, content)
        })
        .collect()
}

/// Pair source and translated cues into bilingual cues.
pub fn build_bilingual(raw: &[Cue], translated: &[Cue], order: BilingualOrder) -> Vec<Cue> {
    raw.iter()
        .zip(translated.iter())
        .map(|(r, t)| {
            let content = match order {
                BilingualOrder::RawFirst => format!("{}\n{}", r.text, t.text),
                BilingualOrder::TransFirst => format!("{}\n{}", t.text, r.text),
            };
            Cue::new(r.index, r.start_ms, r.end_ms, content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChat {
        responses: Mutex<Vec<Result<String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.calls.lock().unwrap().push(user.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(SubWatchError::translation("script exhausted"));
            }
            responses.remove(0)
        }
    }

    fn test_cfg() -> TranslateConfig {
        TranslateConfig {
            context_aware: false,
            batch_lines: 2,
            max_concurrent: 1,
            retry: 1,
            grouping_enabled: true,
            use_polish: false,
            ..TranslateConfig::default()
        }
    }

    fn items(texts: &[&str]) -> Vec<TranslateItem> {
        texts
            .iter()
            .map(|t| TranslateItem {
                cur_text: t.to_string(),
                full_text: t.to_string(),
                ..TranslateItem::default()
            })
            .collect()
    }

    fn ctx<'a>(
        chat: Arc<dyn ChatModel>,
        cache: Arc<dyn TranslationCache>,
        cfg: &'a TranslateConfig,
        glossary: &'a Glossary,
        failed_log: &'a Path,
    ) -> TranslateContext<'a> {
        TranslateContext {
            chat,
            cache,
            cfg,
            src_lang: "ja",
            dst_lang: "zh",
            work_info: None,
            glossary,
            metadata: None,
            failed_log,
        }
    }

    #[test]
    fn test_normalize_lines_strips_prefixes() {
        let lines = normalize_lines("[1] 你好\n\n[2] 世界\n");
        assert_eq!(lines, vec!["你好", "世界"]);
    }

    #[test]
    fn test_wrap_lines_cjk_only() {
        assert_eq!(wrap_lines("一二三四五六", "zh", 3), "一二三\n四五六");
        assert_eq!(wrap_lines("short", "en", 3), "short");
        assert_eq!(wrap_lines("已有\n换行", "zh", 3), "已有\n换行");
        assert_eq!(wrap_lines("一二三", "zh", 0), "一二三");
    }

    #[test]
    fn test_items_from_cues_carries_context() {
        let cues = vec![
            Cue::new(1, 0, 1000, "今日は天気が"),
            Cue::new(2, 1100, 2000, "いいですね。"),
        ];
        let items = items_from_cues(&cues, "ja", true);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].next_text, "いいですね。");
        assert_eq!(items[1].prev_text, "今日は天気が");
        assert!(items[0].full_text.contains("今日は天気が"));
    }

    #[tokio::test]
    async fn test_bulk_translation_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        let chat = Arc::new(ScriptedChat::new(vec![Ok("[1] 你好\n[2] 世界".to_string())]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = test_cfg();
        let glossary = Glossary::new();
        let context = ctx(chat.clone(), cache.clone(), &cfg, &glossary, &log);

        let out = translate_items(&context, &items(&["こんにちは", "せかい"])).await;
        assert_eq!(out, vec!["你好", "世界"]);
        assert!(!log.exists());

        // Both lines are now cached; a second run issues no calls.
        let chat2 = Arc::new(ScriptedChat::new(vec![]));
        let context2 = ctx(chat2.clone(), cache, &cfg, &glossary, &log);
        let out2 = translate_items(&context2, &items(&["こんにちは", "せかい"])).await;
        assert_eq!(out2, vec!["你好", "世界"]);
        assert!(chat2.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_line_mismatch_falls_back_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        // Batch returns one line for two items, then the per-item retries
        // succeed.
        let chat = Arc::new(ScriptedChat::new(vec![
            Ok("[1] 你好".to_string()),
            Ok("你好".to_string()),
            Ok("世界".to_string()),
        ]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = test_cfg();
        let glossary = Glossary::new();
        let context = ctx(chat, cache, &cfg, &glossary, &log);

        let out = translate_items(&context, &items(&["こんにちは", "せかい"])).await;
        assert_eq!(out, vec!["你好", "世界"]);
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("BATCH_FAILED"));
    }

    #[tokio::test]
    async fn test_exhausted_fallback_keeps_source_text() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = test_cfg();
        let glossary = Glossary::new();
        let context = ctx(chat, cache, &cfg, &glossary, &log);

        let out = translate_items(&context, &items(&["こんにちは"])).await;
        assert_eq!(out, vec!["こんにちは"]);
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("LINE_FAILED"));
    }

    #[tokio::test]
    async fn test_context_aware_single_line_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        let chat = Arc::new(ScriptedChat::new(vec![Ok("\n 你好 \n\n备注".to_string())]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = TranslateConfig {
            context_aware: true,
            retry: 1,
            ..TranslateConfig::default()
        };
        let glossary = Glossary::new();
        let context = ctx(chat, cache, &cfg, &glossary, &log);

        let out = translate_items(&context, &items(&["こんにちは"])).await;
        assert_eq!(out, vec!["你好"]);
    }

    #[tokio::test]
    async fn test_polish_mismatch_leaves_block() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        let chat = Arc::new(ScriptedChat::new(vec![Ok("只有一行".to_string())]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = TranslateConfig {
            use_polish: true,
            polish_batch_size: 10,
            ..test_cfg()
        };
        let glossary = Glossary::new();
        let context = ctx(chat, cache, &cfg, &glossary, &log);

        let translated = vec!["你好".to_string(), "世界".to_string()];
        let originals = vec!["こんにちは".to_string(), "せかい".to_string()];
        let out = polish(&context, &originals, translated.clone()).await;
        assert_eq!(out, translated);
    }

    #[tokio::test]
    async fn test_polish_applies_when_counts_match() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("failed.log");
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "[1] 你好呀\n[2] 世界啊".to_string()
        )]));
        let cache = Arc::new(MemoryCache::new());
        let cfg = test_cfg();
        let glossary = Glossary::new();
        let context = ctx(chat, cache, &cfg, &glossary, &log);

        let out = polish(
            &context,
            &["a".to_string(), "b".to_string()],
            vec!["你好".to_string(), "世界".to_string()],
        )
        .await;
        assert_eq!(out, vec!["你好呀", "世界啊"]);
    }

    #[test]
    fn test_build_bilingual_orders() {
        let raw = vec![Cue::new(1, 0, 1000, "こんにちは")];
        let trans = vec![Cue::new(1, 0, 1000, "你好")];
        let bi = build_bilingual(&raw, &trans, BilingualOrder::RawFirst);
        assert_eq!(bi[0].text, "こんにちは\n你好");
        let bi = build_bilingual(&raw, &trans, BilingualOrder::TransFirst);
        assert_eq!(bi[0].text, "你好\nこんにちは");
    }
}
