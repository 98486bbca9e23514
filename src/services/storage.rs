// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage client for avatar and cover images.
//!
//! Uploads go to Cloudinary's signed upload API. The staged local file is
//! removed after every attempt, successful or not.

use crate::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Result of an upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { url: String },
    Failed { reason: String },
}

impl UploadOutcome {
    /// The public URL, if the upload produced one.
    pub fn url(self) -> Option<String> {
        match self {
            UploadOutcome::Uploaded { url } => Some(url),
            UploadOutcome::Failed { .. } => None,
        }
    }
}

/// Something that can take a local file and return a public URL.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, local_path: &Path) -> UploadOutcome;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Cloudinary upload client.
#[derive(Clone)]
pub struct CloudinaryStorage {
    http: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_url: format!(
                "{}/v1_1/{}/auto/upload",
                config.cloudinary_base_url.trim_end_matches('/'),
                config.cloudinary_cloud_name
            ),
            api_key: config.cloudinary_api_key.clone(),
            api_secret: config.cloudinary_api_secret.clone(),
        }
    }

    async fn try_upload(&self, local_path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| format!("Failed to read staged file: {}", e))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_secs();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", sign_upload(timestamp, &self.api_secret))
            .text("signature_algorithm", "sha256");

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Upload request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Upload rejected ({}): {}", status, body));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid upload response: {}", e))?;

        body.secure_url
            .or(body.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| "Upload response has no URL".to_string())
    }
}

/// Signature over the signed parameters (just `timestamp` here).
fn sign_upload(timestamp: u64, api_secret: &str) -> String {
    let to_sign = format!("timestamp={}{}", timestamp, api_secret);
    hex::encode(Sha256::digest(to_sign.as_bytes()))
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(&self, local_path: &Path) -> UploadOutcome {
        let result = self.try_upload(local_path).await;

        if let Err(e) = tokio::fs::remove_file(local_path).await {
            tracing::warn!(path = %local_path.display(), error = %e, "Failed to remove staged upload");
        }

        match result {
            Ok(url) => {
                tracing::info!(url = %url, "File uploaded to object storage");
                UploadOutcome::Uploaded { url }
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "Object storage upload failed");
                UploadOutcome::Failed { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_upload() {
        let expected = hex::encode(Sha256::digest(b"timestamp=1315060510abcd"));
        assert_eq!(sign_upload(1315060510, "abcd"), expected);
    }

    #[test]
    fn test_upload_url_from_config() {
        let config = Config {
            cloudinary_base_url: "https://api.cloudinary.com/".to_string(),
            cloudinary_cloud_name: "demo".to_string(),
            ..Config::default()
        };
        let storage = CloudinaryStorage::new(&config);
        assert_eq!(
            storage.upload_url,
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );
    }

    #[test]
    fn test_outcome_url() {
        let ok = UploadOutcome::Uploaded {
            url: "https://cdn/x.png".to_string(),
        };
        let failed = UploadOutcome::Failed {
            reason: "nope".to_string(),
        };
        assert_eq!(ok.url(), Some("https://cdn/x.png".to_string()));
        assert_eq!(failed.url(), None);
    }

    #[tokio::test]
    async fn test_failed_upload_still_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar.png");
        tokio::fs::write(&path, b"png").await.unwrap();

        // Default config points at a closed local port.
        let storage = CloudinaryStorage::new(&Config::default());
        let outcome = storage.upload(&path).await;

        assert!(matches!(outcome, UploadOutcome::Failed { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CloudinaryStorage::new(&Config::default());
        let outcome = storage.upload(&dir.path().join("nope.png")).await;
        assert!(matches!(outcome, UploadOutcome::Failed { .. }));
    }
}
