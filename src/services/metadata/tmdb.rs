//! TMDB metadata provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::MetadataConfig;
use crate::error::SubWatchError;
use crate::services::metadata::similarity::{
    alias_bonus, alias_match_score, episode_year_penalty, extract_year, title_similarity,
};
use crate::services::metadata::{MetadataProvider, WorkMetadata, WorkQuery};
use crate::services::rate_limit::RateLimiter;

/// TMDB search + episode lookup.
pub struct TmdbProvider {
    client: Client,
    api_key: String,
    base_url: String,
    min_title_similarity: f64,
    rps: f64,
    limiter: Arc<RateLimiter>,
}

impl TmdbProvider {
    /// Build the provider from the metadata configuration section.
    pub fn new(config: &MetadataConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key: config.tmdb.api_key.clone(),
            base_url: config.tmdb.base_url.trim_end_matches('/').to_string(),
            min_title_similarity: config.min_title_similarity,
            rps: config.rps,
            limiter,
        }
    }

    /// Override the base URL (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        self.limiter.acquire("metadata", self.rps).await;
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| SubWatchError::metadata(format!("tmdb request failed: {}", e)))?;
        let status = resp.status();
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SubWatchError::metadata(format!("tmdb {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(SubWatchError::metadata(format!("tmdb {}", status)));
        }
        resp.json()
            .await
            .map_err(|e| SubWatchError::metadata(format!("tmdb response parse failed: {}", e)))
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn resolve(&self, query: &WorkQuery) -> Result<Option<WorkMetadata>> {
        if self.api_key.is_empty() {
            return Ok(None);
        }
        let titles = query.candidate_titles();
        if titles.is_empty() {
            return Ok(None);
        }
        let endpoint = if query.guessed_type.as_deref() == Some("tv") {
            "tv"
        } else {
            "movie"
        };

        let mut best: Option<Value> = None;
        let mut best_score = 0.0f64;
        let mut best_lang: Option<String> = None;

        for title in titles.iter().take(3) {
            for lang in query.language_priority.iter().take(3) {
                let mut params = vec![
                    ("api_key", self.api_key.clone()),
                    ("language", lang.clone()),
                    ("query", title.clone()),
                ];
                if let Some(year) = query.guessed_year {
                    let key = if endpoint == "tv" {
                        "first_air_date_year"
                    } else {
                        "year"
                    };
                    params.push((key, year.to_string()));
                }
                let data = match self
                    .get_json(&format!("{}/search/{}", self.base_url, endpoint), &params)
                    .await
                {
                    Ok(data) => data,
                    Err(_) => continue,
                };
                let Some(results) = data.get("results").and_then(Value::as_array) else {
                    continue;
                };
                for item in results.iter().take(10) {
                    let name = item
                        .get("name")
                        .or_else(|| item.get("title"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let original = item
                        .get("original_name")
                        .or_else(|| item.get("original_title"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let date = item
                        .get("first_air_date")
                        .or_else(|| item.get("release_date"))
                        .and_then(Value::as_str)
                        .unwrap_or("");

                    let alias_score = if query.title_aliases.is_empty() {
                        0.0
                    } else {
                        let score = alias_match_score(&query.title_aliases, name)
                            .max(alias_match_score(&query.title_aliases, original));
                        if score == 0.0 {
                            continue;
                        }
                        score
                    };
                    let mut score = title_similarity(title, name) * 0.7
                        + title_similarity(title, original) * 0.2;
                    score += alias_bonus(&query.title_aliases, &[name, original])
                        + alias_score * 0.3;
                    let year = extract_year(date);
                    if let (Some(guessed), Some(year)) = (query.guessed_year, year) {
                        if (guessed - year).abs() <= 1 {
                            score += 0.1;
                        }
                    }
                    score += episode_year_penalty(query.guessed_episode, year);
                    if score > best_score {
                        best_score = score;
                        best = Some(item.clone());
                        best_lang = Some(lang.clone());
                    }
                }
            }
        }

        let Some(best) = best else { return Ok(None) };
        if best_score < self.min_title_similarity {
            return Ok(None);
        }
        let Some(tmdb_id) = best.get("id").and_then(Value::as_i64) else {
            return Ok(None);
        };

        let mut episode_title = BTreeMap::new();
        if endpoint == "tv" {
            if let (Some(season), Some(episode)) = (query.guessed_season, query.guessed_episode) {
                let lang = best_lang.clone().unwrap_or_else(|| "en-US".to_string());
                let url = format!(
                    "{}/tv/{}/season/{}/episode/{}",
                    self.base_url, tmdb_id, season, episode
                );
                if let Ok(data) = self
                    .get_json(&url, &[("api_key", self.api_key.clone()), ("language", lang.clone())])
                    .await
                {
                    if let Some(name) = data.get("name").and_then(Value::as_str) {
                        episode_title.insert(lang, name.to_string());
                    }
                }
            }
        }

        let title_original = best
            .get("original_name")
            .or_else(|| best.get("original_title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut title_localized = BTreeMap::new();
        if let Some(lang) = &best_lang {
            if let Some(name) = best
                .get("name")
                .or_else(|| best.get("title"))
                .and_then(Value::as_str)
            {
                title_localized.insert(lang.clone(), name.to_string());
            }
        }
        let year = best
            .get("first_air_date")
            .or_else(|| best.get("release_date"))
            .and_then(Value::as_str)
            .and_then(extract_year);

        Ok(Some(WorkMetadata {
            title_original,
            title_localized,
            kind: Some(endpoint.to_string()),
            year,
            season: query.guessed_season,
            episode: query.guessed_episode,
            episode_title,
            characters: Vec::new(),
            external_ids: BTreeMap::from([(
                "tmdb".to_string(),
                serde_json::json!(tmdb_id),
            )]),
            confidence: best_score.clamp(0.0, 1.0),
            sources: vec![self.name().to_string()],
            raw: BTreeMap::from([(self.name().to_string(), best)]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> MetadataConfig {
        MetadataConfig {
            enabled: true,
            min_title_similarity: 0.6,
            tmdb: crate::config::ProviderConfig {
                enabled: true,
                api_key: "k".into(),
                base_url: "https://api.themoviedb.org/3".into(),
                ..crate::config::ProviderConfig::default()
            },
            ..MetadataConfig::default()
        }
    }

    fn query() -> WorkQuery {
        WorkQuery {
            raw_file_name: "My.Show.S01E02.mkv".into(),
            guessed_title: Some("My Show".into()),
            guessed_season: Some(1),
            guessed_episode: Some(2),
            guessed_type: Some("tv".into()),
            language_priority: vec!["zh-CN".into()],
            ..WorkQuery::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_tv_with_episode_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("query", "My Show"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": 100,
                    "name": "My Show (CN)",
                    "original_name": "My Show",
                    "first_air_date": "2019-04-07"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tv/100/season/1/episode/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "第二集"
            })))
            .mount(&server)
            .await;

        let provider = TmdbProvider::new(&config(), Arc::new(RateLimiter::new()))
            .with_base_url(server.uri());
        let meta = provider.resolve(&query()).await.unwrap().unwrap();
        assert_eq!(meta.title_original.as_deref(), Some("My Show"));
        assert_eq!(meta.title_localized["zh-CN"], "My Show (CN)");
        assert_eq!(meta.year, Some(2019));
        assert_eq!(meta.episode_title["zh-CN"], "第二集");
        assert_eq!(meta.external_ids["tmdb"], serde_json::json!(100));
        assert!(meta.confidence > 0.6);
    }

    #[tokio::test]
    async fn test_weak_similarity_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": 7,
                    "name": "Entirely Unrelated Program",
                    "original_name": "Nothing Alike"
                }]
            })))
            .mount(&server)
            .await;

        let provider = TmdbProvider::new(&config(), Arc::new(RateLimiter::new()))
            .with_base_url(server.uri());
        assert!(provider.resolve(&query()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alias_gate_excludes_non_matching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": 7, "name": "My Show", "original_name": "My Show"}]
            })))
            .mount(&server)
            .await;

        let provider = TmdbProvider::new(&config(), Arc::new(RateLimiter::new()))
            .with_base_url(server.uri());
        let mut q = query();
        q.title_aliases = vec!["Some Other Franchise".into()];
        assert!(provider.resolve(&q).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_returns_none() {
        let mut cfg = config();
        cfg.tmdb.api_key = String::new();
        let provider = TmdbProvider::new(&cfg, Arc::new(RateLimiter::new()));
        assert!(provider.resolve(&query()).await.unwrap().is_none());
    }
}
