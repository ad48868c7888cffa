//! HTTP recognition client.
//!
//! Offline transcription submits an async task and polls it; real-time
//! transcription streams the chunk body as fixed-duration audio frames and
//! receives sentence events as the response payload. Vendor error envelopes
//! are checked on every response, success status codes included.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::config::AsrConfig;
use crate::error::SubWatchError;
use crate::services::asr::response::extract_error;
use crate::services::asr::{OfflineOptions, Recognizer, RealtimeOptions};
use crate::services::rate_limit::RateLimiter;

const POLL_INTERVAL_SECS: u64 = 5;
const POLL_MAX_ATTEMPTS: usize = 360;

/// Recognition client for an async-task/streaming HTTP vendor API.
pub struct HttpRecognizer {
    client: Client,
    config: AsrConfig,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl HttpRecognizer {
    /// Build a recognizer from the ASR configuration section.
    pub fn from_config(config: &AsrConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SubWatchError::config("asr.api_key is required"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SubWatchError::asr(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            limiter,
        })
    }

    /// Override the base URL (tests point this at a mock server).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    async fn submit_offline_task(&self, url: &str, opts: &OfflineOptions) -> Result<String> {
        let mut parameters = serde_json::Map::new();
        // Language hints only reach the hint-capable batch model.
        if self.config.model == "paraformer-v2" && !self.config.language_hints.is_empty() {
            parameters.insert("language_hints".into(), json!(self.config.language_hints));
        }
        if let Some(vocab_id) = &opts.vocabulary_id {
            parameters.insert("vocabulary_id".into(), json!(vocab_id));
        } else if let Some(hotwords) = &opts.hotwords {
            parameters.insert("hot_words".into(), json!(hotwords));
        }
        let payload = json!({
            "model": self.config.model,
            "input": {"file_urls": [url]},
            "parameters": Value::Object(parameters),
        });

        self.limiter.acquire("asr", self.config.rps).await;
        let resp = self
            .auth(
                self.client
                    .post(format!("{}/services/audio/asr/transcription", self.base_url)),
            )
            .header("X-Async-Request", "enable")
            .json(&payload)
            .send()
            .await
            .map_err(|e| SubWatchError::asr(format!("transcription submit failed: {}", e)))?;
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SubWatchError::asr(format!("submit response parse failed: {}", e)))?;
        if let Some(error) = extract_error(&data) {
            return Err(SubWatchError::asr(error));
        }
        if !status.is_success() {
            return Err(SubWatchError::asr(format!("transcription submit: {}", status)));
        }
        data.get("output")
            .and_then(|o| o.get("task_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SubWatchError::asr("submit response carries no task id"))
    }

    async fn poll_task(&self, task_id: &str) -> Result<Value> {
        for _ in 0..POLL_MAX_ATTEMPTS {
            self.limiter.acquire("asr", self.config.rps).await;
            let resp = self
                .auth(self.client.get(format!("{}/tasks/{}", self.base_url, task_id)))
                .send()
                .await
                .map_err(|e| SubWatchError::asr(format!("task poll failed: {}", e)))?;
            let data: Value = resp
                .json()
                .await
                .map_err(|e| SubWatchError::asr(format!("poll response parse failed: {}", e)))?;
            if let Some(error) = extract_error(&data) {
                return Err(SubWatchError::asr(error));
            }
            let status = data
                .get("output")
                .and_then(|o| o.get("task_status"))
                .and_then(Value::as_str)
                .unwrap_or("");
            match status {
                "SUCCEEDED" => return Ok(data),
                "FAILED" | "CANCELED" => {
                    return Err(SubWatchError::asr(format!("task ended {}", status)));
                }
                _ => tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await,
            }
        }
        Err(SubWatchError::asr("task poll timed out"))
    }

    /// Fetch an out-of-line transcript the response points at.
    async fn fetch_transcript(&self, url: &str) -> Result<Value> {
        self.limiter.acquire("asr", self.config.rps).await;
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| SubWatchError::asr(format!("transcript fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(SubWatchError::asr(format!(
                "transcript fetch: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| SubWatchError::asr(format!("transcript parse failed: {}", e)))
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn transcribe_offline(&self, url: &str, opts: &OfflineOptions) -> Result<Value> {
        let task_id = self.submit_offline_task(url, opts).await?;
        let result = self.poll_task(&task_id).await?;
        let parsed = crate::services::asr::response::parse_recognition(&result);
        if parsed.sentences.is_empty() && parsed.words.is_empty() {
            if let Some(transcript_url) = parsed.transcription_url {
                return self.fetch_transcript(&transcript_url).await;
            }
        }
        Ok(result)
    }

    async fn transcribe_realtime(&self, wav_chunk: &Path, opts: &RealtimeOptions) -> Result<Value> {
        let options = &self.config.options;
        let frames = read_wav_frames(
            wav_chunk,
            self.config.sample_rate,
            self.config.chunk.stream_frame_ms,
        )?;

        self.limiter.acquire("asr", self.config.rps).await;
        let stream = futures::stream::iter(
            frames
                .into_iter()
                .map(Ok::<_, std::convert::Infallible>),
        );
        let body = reqwest::Body::wrap_stream(stream);

        let mut req = self
            .auth(
                self.client
                    .post(format!("{}/services/audio/asr/recognition", self.base_url)),
            )
            .header("Content-Type", "audio/wav")
            .query(&[
                ("model", self.config.model.as_str()),
                ("format", "wav"),
            ])
            .query(&[("sample_rate", self.config.sample_rate)])
            .query(&[(
                "semantic_punctuation_enabled",
                opts.semantic_punctuation_enabled
                    .unwrap_or(options.semantic_punctuation_enabled),
            )])
            .query(&[(
                "max_sentence_silence",
                opts.max_sentence_silence.unwrap_or(options.max_sentence_silence),
            )])
            .query(&[(
                "multi_threshold_mode_enabled",
                opts.multi_threshold_mode_enabled
                    .unwrap_or(options.multi_threshold_mode_enabled),
            )])
            .query(&[(
                "punctuation_prediction_enabled",
                options.punctuation_prediction_enabled,
            )])
            .query(&[(
                "disfluency_removal_enabled",
                options.disfluency_removal_enabled,
            )]);
        if self.config.model == "paraformer-realtime-v2" && !self.config.language_hints.is_empty() {
            req = req.query(&[("language_hints", self.config.language_hints.join(","))]);
        }
        if let Some(vocab_id) = &opts.vocabulary_id {
            req = req.query(&[("vocabulary_id", vocab_id.as_str())]);
        }

        let resp = req
            .body(body)
            .send()
            .await
            .map_err(|e| SubWatchError::asr(format!("realtime call failed: {}", e)))?;
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SubWatchError::asr(format!("realtime response parse failed: {}", e)))?;
        if let Some(error) = extract_error(&data) {
            return Err(SubWatchError::asr(error));
        }
        if !status.is_success() {
            return Err(SubWatchError::asr(format!("realtime call: {}", status)));
        }
        Ok(data)
    }
}

/// Read a WAV into fixed-duration PCM frames for the streaming body.
fn read_wav_frames(path: &Path, sample_rate: u32, frame_ms: u64) -> Result<Vec<bytes::Bytes>> {
    let mut reader = hound::WavReader::open(path)?;
    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, hound::Error>>()?;
    let frame_samples = ((sample_rate as u64 * frame_ms.max(1)) / 1000).max(1) as usize;
    let mut frames = Vec::new();
    for chunk in samples.chunks(frame_samples) {
        let mut bytes = Vec::with_capacity(chunk.len() * 2);
        for sample in chunk {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        frames.push(bytes::Bytes::from(bytes));
    }
    Ok(frames)
}
