//! Chat-completion client for translation and work-info refinement.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::LlmConfig;
use crate::error::SubWatchError;
use crate::services::rate_limit::RateLimiter;

/// Abstract chat model: one prompt in, one completion out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a completion with the given system and user messages.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_attempts: u32,
    retry_delay_ms: u64,
    base_url: String,
    rps: f64,
    limiter: Arc<RateLimiter>,
}

impl ChatClient {
    /// Build a client from the LLM configuration section.
    pub fn from_config(cfg: &LlmConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        if cfg.base_url.is_empty() || cfg.api_key.is_empty() {
            return Err(SubWatchError::config(
                "translate.llm.base_url and api_key are required for chat completions",
            ));
        }
        let url = url::Url::parse(&cfg.base_url)
            .map_err(|e| SubWatchError::config(format!("invalid LLM base URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SubWatchError::config(
                "LLM base URL must use http or https protocol",
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SubWatchError::chat_service(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            retry_attempts: 2,
            retry_delay_ms: 1000,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            rps: cfg.rps,
            limiter,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn chat_completion(&self, messages: Vec<Value>) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        let mut attempt = 0u32;
        loop {
            self.limiter.acquire("llm", self.rps).await;
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&payload)
                .send()
                .await;

            let retryable_error = match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_client_error() {
                        // 4xx is not retryable: the request itself is wrong.
                        let text = resp.text().await.unwrap_or_default();
                        return Err(SubWatchError::chat_service(format!(
                            "LLM {}: {}",
                            status, text
                        )));
                    }
                    if status.is_success() {
                        let data: Value = resp.json().await.map_err(|e| {
                            SubWatchError::chat_service(format!("response parse failed: {}", e))
                        })?;
                        let content = data["choices"][0]["message"]["content"]
                            .as_str()
                            .map(str::to_string);
                        match content {
                            Some(content) => return Ok(content),
                            None => SubWatchError::chat_service(format!(
                                "unexpected response shape: {}",
                                data
                            )),
                        }
                    } else {
                        let text = resp.text().await.unwrap_or_default();
                        SubWatchError::chat_service(format!("LLM {}: {}", status, text))
                    }
                }
                Err(e) => SubWatchError::chat_service(format!("request failed: {}", e)),
            };

            if attempt >= self.retry_attempts {
                return Err(retryable_error);
            }
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(
                self.retry_delay_ms * (1 << (attempt - 1)) as u64,
            ))
            .await;
        }
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": user}),
        ];
        self.chat_completion(messages).await
    }
}
