//! Translation pipeline: cache determinism, the line-count invariant and
//! hotword language filtering.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::CountingChat;
use subwatch::config::{HotwordConfig, TranslateConfig};
use subwatch::core::glossary::Glossary;
use subwatch::core::hotwords::{build_hotwords, build_hotword_items};
use subwatch::core::srt::Cue;
use subwatch::services::translate::{
    MemoryCache, TranslateContext, TranslateItem, cache_key, translate_cues, translate_items,
};

fn context<'a>(
    chat: Arc<CountingChat>,
    cache: Arc<MemoryCache>,
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
fn cache_key_depends_only_on_inputs() {
    let a = cache_key("ja", "zh", "こんにちは");
    let b = cache_key("ja", "zh", "こんにちは");
    let c = cache_key("ja", "en", "こんにちは");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[tokio::test]
async fn second_run_is_served_entirely_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("failed.log");
    let cache = Arc::new(MemoryCache::new());
    let cfg = TranslateConfig {
        context_aware: true,
        retry: 1,
        ..TranslateConfig::default()
    };
    let glossary = Glossary::new();

    let items = vec![TranslateItem {
        cur_text: "こんにちは".to_string(),
        full_text: "こんにちは".to_string(),
        ..TranslateItem::default()
    }];

    let chat = Arc::new(CountingChat::new("你好"));
    let ctx = context(chat.clone(), cache.clone(), &cfg, &glossary, &log);
    let first = translate_items(&ctx, &items).await;
    assert_eq!(first, vec!["你好"]);
    assert_eq!(chat.calls.load(Ordering::SeqCst), 1);

    let chat2 = Arc::new(CountingChat::new("unused"));
    let ctx2 = context(chat2.clone(), cache, &cfg, &glossary, &log);
    let second = translate_items(&ctx2, &items).await;
    assert_eq!(second, vec!["你好"]);
    assert_eq!(chat2.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn translated_cues_keep_timing_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("failed.log");
    let cache = Arc::new(MemoryCache::new());
    let cfg = TranslateConfig {
        context_aware: true,
        retry: 1,
        grouping_enabled: true,
        ..TranslateConfig::default()
    };
    let glossary = Glossary::new();
    let chat = Arc::new(CountingChat::new("译文"));
    let ctx = context(chat, cache, &cfg, &glossary, &log);

    let cues = vec![
        Cue::new(1, 0, 1000, "こんにちは"),
        Cue::new(2, 1100, 2000, "せかい"),
    ];
    let translated = translate_cues(&ctx, &cues).await;
    assert_eq!(translated.len(), cues.len());
    for (src, dst) in cues.iter().zip(translated.iter()) {
        assert_eq!(src.start_ms, dst.start_ms);
        assert_eq!(src.end_ms, dst.end_ms);
        assert_eq!(dst.text, "译文");
    }
}

#[test]
fn hotword_filter_respects_language_script() {
    let cfg = HotwordConfig {
        enabled: true,
        langs: vec!["ja".to_string(), "en".to_string(), "zh".to_string()],
        ..HotwordConfig::default()
    };
    let mut glossary = Glossary::new();
    glossary.insert("アリス".to_string(), "爱丽丝".to_string());
    glossary.insert("Alice Corp".to_string(), "爱丽丝公司".to_string());

    // English recognition: no CJK hotwords survive.
    let en = build_hotwords(None, &glossary, &[], "en", &cfg, &["en".to_string()]);
    assert!(en.iter().all(|w| w.chars().all(|c| (c as u32) < 0x3000)));

    // Items built for a language outside the hints are dropped entirely.
    let items = build_hotword_items(&en, "en", &cfg, &["ja".to_string()]);
    assert!(items.is_empty());
}
