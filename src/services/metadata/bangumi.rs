//! Bangumi metadata provider (anime-centric, carries character data).

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
use crate::services::metadata::{Character, MetadataProvider, WorkMetadata, WorkQuery};
use crate::services::rate_limit::RateLimiter;

/// Bangumi subject search + detail + characters.
pub struct BangumiProvider {
    client: Client,
    access_token: String,
    user_agent: String,
    base_url: String,
    min_title_similarity: f64,
    rps: f64,
    limiter: Arc<RateLimiter>,
}

impl BangumiProvider {
    /// Build the provider from the metadata configuration section.
    pub fn new(config: &MetadataConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            access_token: config.bangumi.api_key.clone(),
            user_agent: config.bangumi.user_agent.clone(),
            base_url: config.bangumi.base_url.trim_end_matches('/').to_string(),
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
        let mut req = self
            .client
            .get(url)
            .query(params)
            .header("User-Agent", &self.user_agent);
        if !self.access_token.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.access_token));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| SubWatchError::metadata(format!("bangumi request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SubWatchError::metadata(format!("bangumi {}", status)));
        }
        resp.json()
            .await
            .map_err(|e| SubWatchError::metadata(format!("bangumi response parse failed: {}", e)))
    }
}

#[async_trait]
impl MetadataProvider for BangumiProvider {
    fn name(&self) -> &'static str {
        "bangumi"
    }

    async fn resolve(&self, query: &WorkQuery) -> Result<Option<WorkMetadata>> {
        let keywords = query.candidate_titles();
        if keywords.is_empty() {
            return Ok(None);
        }

        let mut best: Option<Value> = None;
        let mut best_score = 0.0f64;
        for keyword in keywords.iter().take(3) {
            let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
            let data = match self
                .get_json(
                    &format!("{}/search/subject/{}", self.base_url, encoded),
                    &[
                        ("type", "2".to_string()),
                        ("responseGroup", "small".to_string()),
                        ("max_results", "10".to_string()),
                    ],
                )
                .await
            {
                Ok(data) => data,
                Err(_) => continue,
            };
            let Some(results) = data.get("list").and_then(Value::as_array) else {
                continue;
            };
            for item in results {
                let name = item.get("name").and_then(Value::as_str).unwrap_or("");
                let name_cn = item.get("name_cn").and_then(Value::as_str).unwrap_or("");
                let alias_score = if query.title_aliases.is_empty() {
                    0.0
                } else {
                    let score = alias_match_score(&query.title_aliases, name)
                        .max(alias_match_score(&query.title_aliases, name_cn));
                    if score == 0.0 {
                        continue;
                    }
                    score
                };
                let mut score =
                    title_similarity(keyword, name).max(title_similarity(keyword, name_cn));
                score += alias_bonus(&query.title_aliases, &[name, name_cn]) + alias_score * 0.3;
                let year = item
                    .get("date")
                    .and_then(Value::as_str)
                    .and_then(extract_year);
                score += episode_year_penalty(query.guessed_episode, year);
                if score > best_score {
                    best_score = score;
                    best = Some(item.clone());
                }
            }
        }

        let Some(best) = best else { return Ok(None) };
        if best_score < self.min_title_similarity {
            return Ok(None);
        }
        let Some(subject_id) = best.get("id").and_then(Value::as_i64) else {
            return Ok(None);
        };

        let detail = self
            .get_json(&format!("{}/v0/subjects/{}", self.base_url, subject_id), &[])
            .await
            .unwrap_or_else(|_| best.clone());

        let mut characters = Vec::new();
        if let Ok(char_data) = self
            .get_json(
                &format!("{}/v0/subjects/{}/characters", self.base_url, subject_id),
                &[],
            )
            .await
        {
            let items = char_data
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in items.iter().take(50) {
                let Some(name) = item.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let mut aliases = BTreeMap::new();
                if let Some(name_cn) = item.get("name_cn").and_then(Value::as_str) {
                    if !name_cn.is_empty() {
                        aliases.insert("zh-CN".to_string(), name_cn.to_string());
                    }
                }
                characters.push(Character {
                    name_original: name.to_string(),
                    aliases,
                });
            }
        }

        let year = detail
            .get("date")
            .or_else(|| best.get("date"))
            .and_then(Value::as_str)
            .and_then(extract_year);
        if episode_year_penalty(query.guessed_episode, year) < 0.0 {
            return Ok(None);
        }

        let title_original = detail
            .get("name")
            .or_else(|| best.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut title_localized = BTreeMap::new();
        if let Some(name_cn) = detail.get("name_cn").and_then(Value::as_str) {
            if !name_cn.is_empty() {
                title_localized.insert("zh-CN".to_string(), name_cn.to_string());
            }
        }

        Ok(Some(WorkMetadata {
            title_original,
            title_localized,
            kind: query.guessed_type.clone().or_else(|| Some("tv".to_string())),
            year,
            season: query.guessed_season,
            episode: query.guessed_episode,
            episode_title: BTreeMap::new(),
            characters,
            external_ids: BTreeMap::from([(
                "bangumi".to_string(),
                serde_json::json!(subject_id),
            )]),
            confidence: best_score.clamp(0.0, 1.0),
            sources: vec![self.name().to_string()],
            raw: BTreeMap::from([(self.name().to_string(), detail)]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> MetadataConfig {
        MetadataConfig {
            enabled: true,
            min_title_similarity: 0.6,
            ..MetadataConfig::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_with_characters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/search/subject/.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [{"id": 55, "name": "ワンピース", "name_cn": "海贼王", "date": "1999-10-20"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v0/subjects/55$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "ワンピース", "name_cn": "海贼王", "date": "1999-10-20"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v0/subjects/55/characters$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"name": "ルフィ", "name_cn": "路飞"}]
            })))
            .mount(&server)
            .await;

        let provider = BangumiProvider::new(&config(), Arc::new(RateLimiter::new()))
            .with_base_url(server.uri());
        let query = WorkQuery {
            raw_file_name: "op.mkv".into(),
            guessed_title: Some("ワンピース".into()),
            ..WorkQuery::default()
        };
        let meta = provider.resolve(&query).await.unwrap().unwrap();
        assert_eq!(meta.title_original.as_deref(), Some("ワンピース"));
        assert_eq!(meta.title_localized["zh-CN"], "海贼王");
        assert_eq!(meta.characters.len(), 1);
        assert_eq!(meta.characters[0].alias_for("zh"), Some("路飞"));
        assert_eq!(meta.year, Some(1999));
    }

    #[tokio::test]
    async fn test_impossible_episode_year_pairing_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/search/subject/.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "list": [{"id": 56, "name": "Old Show", "name_cn": "", "date": "1975-01-01"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v0/subjects/56.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Old Show", "date": "1975-01-01"
            })))
            .mount(&server)
            .await;

        let provider = BangumiProvider::new(&config(), Arc::new(RateLimiter::new()))
            .with_base_url(server.uri());
        let query = WorkQuery {
            raw_file_name: "old.mkv".into(),
            guessed_title: Some("Old Show".into()),
            guessed_episode: Some(120),
            ..WorkQuery::default()
        };
        assert!(provider.resolve(&query).await.unwrap().is_none());
    }
}
