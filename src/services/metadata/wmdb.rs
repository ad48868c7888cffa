//! WMDB metadata provider (Chinese movie database, lowest weight).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::MetadataConfig;
use crate::error::SubWatchError;
use crate::services::metadata::similarity::{alias_match_score, extract_year, title_similarity};
use crate::services::metadata::{MetadataProvider, WorkMetadata, WorkQuery};
use crate::services::rate_limit::RateLimiter;

/// WMDB search.
pub struct WmdbProvider {
    client: Client,
    base_url: String,
    rps: f64,
    limiter: Arc<RateLimiter>,
}

impl WmdbProvider {
    /// Build the provider from the metadata configuration section.
    pub fn new(config: &MetadataConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: config.wmdb.base_url.trim_end_matches('/').to_string(),
            rps: config.rps,
            limiter,
        }
    }

    /// Override the base URL (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MetadataProvider for WmdbProvider {
    fn name(&self) -> &'static str {
        "wmdb"
    }

    async fn resolve(&self, query: &WorkQuery) -> Result<Option<WorkMetadata>> {
        let keywords = query.candidate_titles();
        if keywords.is_empty() {
            return Ok(None);
        }

        let mut best: Option<Value> = None;
        let mut best_score = 0.0f64;
        for keyword in keywords.iter().take(3) {
            self.limiter.acquire("metadata", self.rps).await;
            let resp = self
                .client
                .get(format!("{}/api/search", self.base_url))
                .query(&[("q", keyword.as_str())])
                .send()
                .await
                .map_err(|e| SubWatchError::metadata(format!("wmdb request failed: {}", e)));
            let data: Value = match resp {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(data) => data,
                    Err(_) => continue,
                },
                _ => continue,
            };
            let Some(items) = data.get("data").and_then(Value::as_array) else {
                continue;
            };
            let Some(candidate) = items.first() else {
                continue;
            };
            let title = candidate
                .get("name")
                .or_else(|| candidate.get("originalName"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let alias_score = if query.title_aliases.is_empty() {
                0.0
            } else {
                let score = alias_match_score(&query.title_aliases, title);
                if score == 0.0 {
                    continue;
                }
                score
            };
            let score = title_similarity(keyword, title) + alias_score * 0.3;
            if score > best_score {
                best_score = score;
                best = Some(candidate.clone());
            }
        }

        let Some(best) = best else { return Ok(None) };
        let name = best.get("name").and_then(Value::as_str);
        let original = best.get("originalName").and_then(Value::as_str);
        let year = best
            .get("year")
            .and_then(Value::as_str)
            .and_then(extract_year)
            .or_else(|| best.get("year").and_then(Value::as_i64).map(|y| y as i32));

        let mut external_ids = BTreeMap::new();
        if let Some(douban) = best.get("doubanId") {
            if !douban.is_null() {
                external_ids.insert("wmdbDoubanId".to_string(), douban.clone());
            }
        }
        if let Some(imdb) = best.get("imdbId") {
            if !imdb.is_null() {
                external_ids.insert("imdb".to_string(), imdb.clone());
            }
        }

        Ok(Some(WorkMetadata {
            title_original: original.or(name).map(str::to_string),
            title_localized: name
                .map(|n| BTreeMap::from([("zh-CN".to_string(), n.to_string())]))
                .unwrap_or_default(),
            kind: query
                .guessed_type
                .clone()
                .or_else(|| Some("unknown".to_string())),
            year,
            season: query.guessed_season,
            episode: query.guessed_episode,
            episode_title: BTreeMap::new(),
            characters: Vec::new(),
            external_ids,
            confidence: best_score.clamp(0.0, 1.0),
            sources: vec![self.name().to_string()],
            raw: BTreeMap::from([(self.name().to_string(), best)]),
        }))
    }
}
