//! Vendor-side hotword vocabulary lifecycle.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::AsrConfig;
use crate::core::hotwords::HotwordItem;
use crate::error::SubWatchError;
use crate::services::asr::VocabularyService;
use crate::services::asr::response::extract_error;
use crate::services::rate_limit::RateLimiter;

/// HTTP vocabulary client sharing the recognition endpoint and key.
pub struct HttpVocabularyService {
    client: Client,
    api_key: String,
    base_url: String,
    rps: f64,
    limiter: Arc<RateLimiter>,
}

impl HttpVocabularyService {
    /// Build a client from the ASR configuration section.
    pub fn from_config(config: &AsrConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SubWatchError::config("asr.api_key is required"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SubWatchError::asr(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rps: config.rps,
            limiter,
        })
    }

    /// Override the base URL (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl VocabularyService for HttpVocabularyService {
    async fn create_vocabulary(
        &self,
        items: &[HotwordItem],
        prefix: &str,
        target_model: &str,
    ) -> Result<String> {
        let payload = json!({
            "prefix": prefix,
            "target_model": target_model,
            "vocabulary": items,
        });
        self.limiter.acquire("asr", self.rps).await;
        let resp = self
            .client
            .post(format!("{}/vocabularies", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SubWatchError::asr(format!("vocabulary create failed: {}", e)))?;
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SubWatchError::asr(format!("vocabulary response parse failed: {}", e)))?;
        if let Some(error) = extract_error(&data) {
            return Err(SubWatchError::asr(error));
        }
        if !status.is_success() {
            return Err(SubWatchError::asr(format!("vocabulary create: {}", status)));
        }
        let vocab_status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("OK");
        if vocab_status != "OK" {
            return Err(SubWatchError::asr(format!(
                "vocabulary not ready: {}",
                vocab_status
            )));
        }
        data.get("vocabulary_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SubWatchError::asr("vocabulary response carries no id"))
    }

    async fn delete_vocabulary(&self, id: &str) -> Result<()> {
        self.limiter.acquire("asr", self.rps).await;
        let resp = self
            .client
            .delete(format!("{}/vocabularies/{}", self.base_url, id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| SubWatchError::asr(format!("vocabulary delete failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(SubWatchError::asr(format!(
                "vocabulary delete: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
