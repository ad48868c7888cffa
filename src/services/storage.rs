//! Object storage for offline recognition audio.
//!
//! The pipeline needs three operations: upload a local file under a key,
//! produce a fetchable URL (public or time-limited signed) and delete the
//! object when the job is done.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::Result;
use crate::config::{StorageConfig, StoreUrlMode};
use crate::error::SubWatchError;

/// Object store capability.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `local_path` under `key`.
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Fetchable URL for `key`, honoring the configured visibility mode.
    fn url(&self, key: &str) -> String;

    /// Delete the object.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// HTTP object store speaking a bucket-per-host S3/OSS-style API.
pub struct HttpObjectStore {
    client: Client,
    config: StorageConfig,
    retry_attempts: usize,
}

impl HttpObjectStore {
    /// Build a store from the storage configuration section.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if !config.is_complete() {
            return Err(SubWatchError::config(
                "storage endpoint, bucket and access keys are required",
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| SubWatchError::object_store(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
            retry_attempts: 3,
        })
    }

    fn host(&self) -> String {
        let endpoint = self
            .config
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("{}.{}", self.config.bucket, endpoint)
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.host(), key)
    }

    fn signature(&self, key: &str, expires: u64) -> String {
        let payload = format!(
            "{}|{}|{}|{}",
            self.config.access_key_secret, self.config.access_key_id, key, expires
        );
        let digest = Sha256::digest(payload.as_bytes());
        format!("{:x}", digest)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let url = self.object_url(key);
        let mut last_error = None;
        for attempt in 0..self.retry_attempts {
            let file = tokio::fs::File::open(local_path).await.map_err(|e| {
                SubWatchError::object_store(format!("open upload source failed: {}", e))
            })?;
            let stream = FramedRead::new(file, BytesCodec::new());
            let body = reqwest::Body::wrap_stream(stream);
            let result = self
                .client
                .put(&url)
                .header("Authorization", format!("Bearer {}", self.config.access_key_id))
                .body(body)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    last_error = Some(SubWatchError::object_store(format!(
                        "upload failed with {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    last_error = Some(SubWatchError::object_store(format!("upload failed: {}", e)));
                }
            }
            if attempt + 1 < self.retry_attempts {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
        Err(last_error.unwrap_or_else(|| SubWatchError::object_store("upload failed")))
    }

    fn url(&self, key: &str) -> String {
        match self.config.url_mode {
            StoreUrlMode::Public => self.object_url(key),
            StoreUrlMode::Presign => {
                let expires = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
                    + self.config.presign_expire_secs;
                format!(
                    "{}?Expires={}&Signature={}",
                    self.object_url(key),
                    expires,
                    self.signature(key, expires)
                )
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.object_url(key);
        let resp = self
            .client
            .delete(&url)
            .header("Authorization", format!("Bearer {}", self.config.access_key_id))
            .send()
            .await
            .map_err(|e| SubWatchError::object_store(format!("delete failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(SubWatchError::object_store(format!(
                "delete failed with {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: StoreUrlMode) -> StorageConfig {
        StorageConfig {
            endpoint: "https://oss.example.com".to_string(),
            bucket: "subs".to_string(),
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            url_mode: mode,
            ..StorageConfig::default()
        }
    }

    #[test]
    fn test_public_url_shape() {
        let store = HttpObjectStore::from_config(&config(StoreUrlMode::Public)).unwrap();
        assert_eq!(
            store.url("subtitle-audio/x.wav"),
            "https://subs.oss.example.com/subtitle-audio/x.wav"
        );
    }

    #[test]
    fn test_presigned_url_carries_expiry_and_signature() {
        let store = HttpObjectStore::from_config(&config(StoreUrlMode::Presign)).unwrap();
        let url = store.url("k.wav");
        assert!(url.starts_with("https://subs.oss.example.com/k.wav?Expires="));
        assert!(url.contains("&Signature="));
    }

    #[test]
    fn test_signature_is_deterministic_per_key() {
        let store = HttpObjectStore::from_config(&config(StoreUrlMode::Presign)).unwrap();
        assert_eq!(store.signature("a", 100), store.signature("a", 100));
        assert_ne!(store.signature("a", 100), store.signature("b", 100));
        assert_ne!(store.signature("a", 100), store.signature("a", 101));
    }

    #[test]
    fn test_from_config_requires_settings() {
        let incomplete = StorageConfig::default();
        assert!(HttpObjectStore::from_config(&incomplete).is_err());
    }
}
