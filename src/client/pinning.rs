//! Content pinning capability and the Pinata adapter.

use crate::models::{GiftdropError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Upload content and get back its content id.
#[async_trait]
pub trait Pinner: Send + Sync {
    /// Pin raw bytes under a display name.
    async fn pin(&self, name: &str, data: Vec<u8>) -> Result<String>;

    /// Pin a JSON document.
    async fn pin_json(&self, name: &str, value: &serde_json::Value) -> Result<String> {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| GiftdropError::Internal(format!("serializing {name}: {e}")))?;
        self.pin(name, data).await
    }

    /// Pin a file from disk.
    async fn pin_file(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| GiftdropError::io(format!("reading {}", path.display()), e))?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.pin(&name, data).await
    }
}

/// Pinata `pinFileToIPFS` client.
pub struct PinataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl PinataClient {
    pub fn new(base_url: impl Into<String>, api_key: String, secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        }
    }
}

#[async_trait]
impl Pinner for PinataClient {
    async fn pin(&self, name: &str, data: Vec<u8>) -> Result<String> {
        let operation = format!("Pinning {name}");
        let size = data.len();
        let url = format!("{}/pinning/pinFileToIPFS", self.base_url);

        let part = reqwest::multipart::Part::bytes(data).file_name(name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text(
                "pinataMetadata",
                serde_json::json!({ "name": name }).to_string(),
            )
            .text(
                "pinataOptions",
                serde_json::json!({ "cidVersion": 1 }).to_string(),
            );

        let response = self
            .client
            .post(&url)
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GiftdropError::external(&operation, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GiftdropError::external(
                &operation,
                format!("status {status}: {text}"),
            ));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GiftdropError::external(&operation, format!("invalid reply: {e}")))?;

        let cid = json["IpfsHash"]
            .as_str()
            .ok_or_else(|| GiftdropError::external(&operation, "reply is missing IpfsHash"))?
            .to_string();

        info!(name, cid = %cid, size, "Pinned");
        Ok(cid)
    }
}
