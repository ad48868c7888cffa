//! Work metadata resolution: weighted providers, merging, caching and
//! manual overrides.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::MetadataConfig;

pub mod bangumi;
pub mod nfo;
pub mod query;
pub mod similarity;
pub mod tmdb;
pub mod wmdb;

pub use nfo::{NfoInfo, load_nfo_info};
pub use query::{WorkQuery, build_work_query, load_manual_metadata, refine_aliases_via_llm};

/// A character attached to a work, with localized aliases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    /// Name in the original language.
    #[serde(rename = "nameOriginal")]
    pub name_original: String,
    /// Localized names keyed by language tag.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl Character {
    /// Pick the alias for a destination language, falling back through the
    /// simplified-Chinese tags.
    pub fn alias_for(&self, dst_lang: &str) -> Option<&str> {
        let norm_dst = crate::core::lang::normalize_lang(dst_lang);
        for (key, value) in &self.aliases {
            if crate::core::lang::normalize_lang(key).starts_with(&norm_dst) {
                return Some(value);
            }
        }
        for fallback in ["zh-cn", "zh", "zh-hans"] {
            for (key, value) in &self.aliases {
                if crate::core::lang::normalize_lang(key).starts_with(fallback) {
                    return Some(value);
                }
            }
        }
        None
    }
}

/// Resolved metadata for a work.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkMetadata {
    /// Original-language title.
    pub title_original: Option<String>,
    /// Localized titles keyed by language tag.
    pub title_localized: BTreeMap<String, String>,
    /// `tv`, `movie` or `unknown`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Release year.
    pub year: Option<i32>,
    /// Season number.
    pub season: Option<i64>,
    /// Episode number.
    pub episode: Option<i64>,
    /// Localized episode titles.
    pub episode_title: BTreeMap<String, String>,
    /// Known characters.
    pub characters: Vec<Character>,
    /// External ids (tmdb, imdb, bangumi, ...).
    pub external_ids: BTreeMap<String, serde_json::Value>,
    /// Result confidence in `[0, 1]`.
    pub confidence: f64,
    /// Provider names, primary first.
    pub sources: Vec<String>,
    /// Raw provider payloads keyed by provider name.
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl WorkMetadata {
    /// Character-name glossary for a destination language.
    pub fn character_glossary(&self, dst_lang: &str) -> BTreeMap<String, String> {
        let mut glossary = BTreeMap::new();
        for character in &self.characters {
            if let Some(alias) = character.alias_for(dst_lang) {
                glossary.insert(character.name_original.clone(), alias.to_string());
            }
        }
        glossary
    }

    /// All known titles, original first.
    pub fn all_titles(&self) -> Vec<String> {
        let mut titles = Vec::new();
        if let Some(title) = &self.title_original {
            titles.push(title.clone());
        }
        titles.extend(self.title_localized.values().cloned());
        titles
    }
}

/// Named, weighted metadata provider.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Stable provider name used for weights and result attribution.
    fn name(&self) -> &'static str;

    /// Resolve a query; `Ok(None)` means no acceptable hit.
    async fn resolve(&self, query: &WorkQuery) -> crate::Result<Option<WorkMetadata>>;
}

/// Merge per-provider results by `provider_weight x confidence`.
///
/// The heaviest record is primary; localized titles and external ids merge
/// first-wins in weight order; characters union by original name. Returns
/// `None` when the weighted-average confidence falls below the minimum.
pub fn merge_metadata(results: Vec<WorkMetadata>, config: &MetadataConfig) -> Option<WorkMetadata> {
    if results.is_empty() {
        return None;
    }
    let weight_of = |name: &str| -> f64 {
        match name {
            "tmdb" => config.weight_tmdb,
            "bangumi" => config.weight_bangumi,
            "wmdb" => config.weight_wmdb,
            _ => 1.0,
        }
    };
    let mut weighted: Vec<(WorkMetadata, f64)> = results
        .into_iter()
        .map(|meta| {
            let provider = meta.sources.first().cloned().unwrap_or_default();
            let weight = weight_of(&provider) * meta.confidence;
            (meta, weight)
        })
        .collect();
    weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
    let confidence = if total_weight > 0.0 {
        weighted
            .iter()
            .map(|(meta, w)| meta.confidence * w)
            .sum::<f64>()
            / total_weight
    } else {
        0.0
    };

    let primary = weighted[0].0.clone();
    let mut title_localized = primary.title_localized.clone();
    for (meta, _) in weighted.iter().skip(1) {
        for (lang, title) in &meta.title_localized {
            title_localized
                .entry(lang.clone())
                .or_insert_with(|| title.clone());
        }
    }

    let mut characters = Vec::new();
    let mut seen_names = std::collections::HashSet::new();
    for (meta, _) in &weighted {
        for character in &meta.characters {
            if character.name_original.is_empty()
                || !seen_names.insert(character.name_original.clone())
            {
                continue;
            }
            characters.push(character.clone());
        }
    }

    let mut external_ids = BTreeMap::new();
    for (meta, _) in &weighted {
        for (key, value) in &meta.external_ids {
            external_ids
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    let mut raw = BTreeMap::new();
    let mut sources = Vec::new();
    for (meta, _) in &weighted {
        if let Some(source) = meta.sources.first() {
            sources.push(source.clone());
            if let Some(value) = meta.raw.get(source) {
                raw.insert(source.clone(), value.clone());
            }
        }
    }

    let merged = WorkMetadata {
        title_original: primary.title_original,
        title_localized,
        kind: primary.kind,
        year: primary.year,
        season: primary.season,
        episode: primary.episode,
        episode_title: primary.episode_title,
        characters,
        external_ids,
        confidence: confidence.clamp(0.0, 1.0),
        sources,
        raw,
    };
    if merged.confidence < config.min_confidence {
        return None;
    }
    Some(merged)
}

struct CacheEntry {
    at: Instant,
    value: Option<WorkMetadata>,
}

/// Resolver running all enabled providers and merging their results, with
/// an in-memory TTL cache keyed by a stable hash of the normalised query.
pub struct MetadataService {
    config: MetadataConfig,
    providers: Vec<Box<dyn MetadataProvider>>,
    cache: Mutex<std::collections::HashMap<String, CacheEntry>>,
}

impl MetadataService {
    /// Build the service with the standard provider set.
    pub fn new(
        config: MetadataConfig,
        limiter: std::sync::Arc<crate::services::rate_limit::RateLimiter>,
    ) -> Self {
        let mut providers: Vec<Box<dyn MetadataProvider>> = Vec::new();
        if config.tmdb.enabled && !config.tmdb.api_key.is_empty() {
            providers.push(Box::new(tmdb::TmdbProvider::new(&config, limiter.clone())));
        }
        if config.bangumi.enabled && !config.bangumi.user_agent.is_empty() {
            providers.push(Box::new(bangumi::BangumiProvider::new(
                &config,
                limiter.clone(),
            )));
        }
        if config.wmdb.enabled {
            providers.push(Box::new(wmdb::WmdbProvider::new(&config, limiter)));
        }
        Self::with_providers(config, providers)
    }

    /// Build the service with explicit providers (tests).
    pub fn with_providers(
        config: MetadataConfig,
        providers: Vec<Box<dyn MetadataProvider>>,
    ) -> Self {
        Self {
            config,
            providers,
            cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn cache_key(query: &WorkQuery) -> String {
        let payload = serde_json::json!({
            "raw": query.raw_file_name,
            "dirs": query.directory_names,
            "title": query.guessed_title,
            "season": query.guessed_season,
            "episode": query.guessed_episode,
            "year": query.guessed_year,
            "type": query.guessed_type,
            "nfo_title": query.nfo_title,
            "nfo_original_title": query.nfo_original_title,
            "external_ids": query.external_ids,
        });
        let digest = Sha256::digest(payload.to_string().as_bytes());
        format!("{:x}", digest)
    }

    /// Resolve a work, consulting the cache first. Provider failures are
    /// logged and skipped; they never fail the job.
    pub async fn resolve(&self, query: &WorkQuery) -> Option<WorkMetadata> {
        if !self.config.enabled {
            return None;
        }
        let key = Self::cache_key(query);
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&key) {
                if entry.at.elapsed() < ttl {
                    return entry.value.clone();
                }
            }
        }

        let mut results = Vec::new();
        for provider in &self.providers {
            match provider.resolve(query).await {
                Ok(Some(meta)) => results.push(meta),
                Ok(None) => {}
                Err(e) => log::warn!("metadata provider {} failed: {}", provider.name(), e),
            }
        }
        let merged = merge_metadata(results, &self.config);

        self.cache.lock().unwrap().insert(
            key,
            CacheEntry {
                at: Instant::now(),
                value: merged.clone(),
            },
        );
        merged
    }
}

/// Manual-metadata directory for a job output directory.
pub fn manual_dir_for(out_dir: &Path, manual_dir: &str) -> Option<PathBuf> {
    if manual_dir.is_empty() {
        return None;
    }
    let path = Path::new(manual_dir);
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        Some(out_dir.join(manual_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(provider: &str, confidence: f64) -> WorkMetadata {
        WorkMetadata {
            title_original: Some(format!("{}-title", provider)),
            confidence,
            sources: vec![provider.to_string()],
            ..WorkMetadata::default()
        }
    }

    fn config() -> MetadataConfig {
        MetadataConfig {
            enabled: true,
            min_confidence: 0.5,
            ..MetadataConfig::default()
        }
    }

    #[test]
    fn test_merge_primary_is_heaviest() {
        // tmdb at 1.0 weight and 0.8 confidence beats bangumi at 0.8 x 0.9.
        let merged = merge_metadata(vec![meta("bangumi", 0.9), meta("tmdb", 0.8)], &config())
            .unwrap();
        assert_eq!(merged.title_original.as_deref(), Some("tmdb-title"));
        assert_eq!(merged.sources[0], "tmdb");
    }

    #[test]
    fn test_merge_first_wins_per_key() {
        let mut a = meta("tmdb", 0.9);
        a.title_localized.insert("zh-CN".into(), "甲".into());
        a.external_ids.insert("imdb".into(), serde_json::json!("tt1"));
        let mut b = meta("bangumi", 0.9);
        b.title_localized.insert("zh-CN".into(), "乙".into());
        b.title_localized.insert("ja-JP".into(), "丙".into());
        b.external_ids.insert("imdb".into(), serde_json::json!("tt2"));
        b.external_ids.insert("bangumi".into(), serde_json::json!(7));

        let merged = merge_metadata(vec![a, b], &config()).unwrap();
        assert_eq!(merged.title_localized["zh-CN"], "甲");
        assert_eq!(merged.title_localized["ja-JP"], "丙");
        assert_eq!(merged.external_ids["imdb"], serde_json::json!("tt1"));
        assert_eq!(merged.external_ids["bangumi"], serde_json::json!(7));
    }

    #[test]
    fn test_merge_characters_union_by_name() {
        let mut a = meta("tmdb", 0.9);
        a.characters.push(Character {
            name_original: "Alice".into(),
            aliases: BTreeMap::from([("zh-CN".to_string(), "爱丽丝A".to_string())]),
        });
        let mut b = meta("bangumi", 0.9);
        b.characters.push(Character {
            name_original: "Alice".into(),
            aliases: BTreeMap::from([("zh-CN".to_string(), "爱丽丝B".to_string())]),
        });
        b.characters.push(Character {
            name_original: "Bob".into(),
            aliases: BTreeMap::new(),
        });

        let merged = merge_metadata(vec![a, b], &config()).unwrap();
        assert_eq!(merged.characters.len(), 2);
        assert_eq!(merged.characters[0].alias_for("zh"), Some("爱丽丝A"));
    }

    #[test]
    fn test_merge_below_min_confidence_is_none() {
        let mut cfg = config();
        cfg.min_confidence = 0.95;
        assert!(merge_metadata(vec![meta("tmdb", 0.6)], &cfg).is_none());
    }

    #[test]
    fn test_merge_empty_is_none() {
        assert!(merge_metadata(vec![], &config()).is_none());
    }

    #[test]
    fn test_character_alias_fallback() {
        let character = Character {
            name_original: "アリス".into(),
            aliases: BTreeMap::from([("zh-CN".to_string(), "爱丽丝".to_string())]),
        };
        assert_eq!(character.alias_for("zh"), Some("爱丽丝"));
        assert_eq!(character.alias_for("en"), Some("爱丽丝"));
        let empty = Character {
            name_original: "x".into(),
            aliases: BTreeMap::new(),
        };
        assert_eq!(empty.alias_for("zh"), None);
    }

    #[tokio::test]
    async fn test_service_caches_results() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingProvider(Arc<AtomicUsize>);

        #[async_trait]
        impl MetadataProvider for CountingProvider {
            fn name(&self) -> &'static str {
                "tmdb"
            }
            async fn resolve(&self, _query: &WorkQuery) -> crate::Result<Option<WorkMetadata>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some(WorkMetadata {
                    title_original: Some("cached".into()),
                    confidence: 0.9,
                    sources: vec!["tmdb".into()],
                    ..WorkMetadata::default()
                }))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let service = MetadataService::with_providers(
            config(),
            vec![Box::new(CountingProvider(calls.clone()))],
        );
        let query = WorkQuery {
            raw_file_name: "x.mkv".into(),
            ..WorkQuery::default()
        };
        assert!(service.resolve(&query).await.is_some());
        assert!(service.resolve(&query).await.is_some());
        // Only the first resolve reached the provider.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
