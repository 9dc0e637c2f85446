// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Image Relocation
//!
//! Event images are rehosted to object storage under a deterministic key
//! so listings never hot-link fragile origin URLs. Tracking, ad, and pixel
//! URLs are discarded outright, never rehosted. Every failure mode is
//! non-fatal: the original URL is retained and the pipeline moves on.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use event_harvester_domain::services::is_tracking_url;
use event_harvester_domain::HarvestError;

use crate::infrastructure::config::ImageStoreConfig;

/// Image download cap; anything larger is left at its origin.
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Seam for the object-storage bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores bytes under the key; returns the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, HarvestError>;
}

/// HTTP bucket client: `PUT {endpoint}/{key}` with an optional bearer token.
pub struct HttpBucketStore {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl HttpBucketStore {
    pub fn new(config: &ImageStoreConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HarvestError::invalid_config(format!("failed to build bucket client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpBucketStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, HarvestError> {
        let url = format!("{}/{}", self.endpoint, key);
        let mut request = self
            .client
            .put(&url)
            .header("content-type", content_type)
            .body(bytes);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HarvestError::provider(format!("bucket upload failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(HarvestError::provider(format!(
                "bucket returned {} for {}",
                response.status(),
                key
            )));
        }
        Ok(url)
    }
}

/// Downloads and rehosts event images.
pub struct ImageRelocator {
    store: Option<std::sync::Arc<dyn ObjectStore>>,
    client: reqwest::Client,
}

/// What happened to an image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    /// Rehosted; use this URL instead.
    Relocated(String),
    /// Tracking/pixel URL; drop the image entirely.
    Discarded,
    /// Kept at origin (no store configured, download failed, too large).
    KeptOriginal,
}

impl ImageRelocator {
    pub fn new(store: Option<std::sync::Arc<dyn ObjectStore>>) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| HarvestError::invalid_config(format!("failed to build image client: {}", e)))?;
        Ok(Self { store, client })
    }

    /// Relocates one image under a deterministic key (event or queue id).
    pub async fn relocate(&self, image_url: &str, key: &str) -> RelocationOutcome {
        if is_tracking_url(image_url) {
            return RelocationOutcome::Discarded;
        }
        let Some(store) = &self.store else {
            return RelocationOutcome::KeptOriginal;
        };

        let response = match self.client.get(image_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(image_url, status = %response.status(), "image fetch non-200");
                return RelocationOutcome::KeptOriginal;
            }
            Err(e) => {
                debug!(image_url, error = %e, "image fetch failed");
                return RelocationOutcome::KeptOriginal;
            }
        };

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        if !content_type.starts_with("image/") {
            return RelocationOutcome::Discarded;
        }

        let bytes = match response.bytes().await {
            Ok(bytes) if bytes.len() <= MAX_IMAGE_BYTES => bytes.to_vec(),
            Ok(_) => {
                debug!(image_url, "image over size cap, keeping original");
                return RelocationOutcome::KeptOriginal;
            }
            Err(e) => {
                debug!(image_url, error = %e, "image body read failed");
                return RelocationOutcome::KeptOriginal;
            }
        };

        let extension = extension_for(&content_type);
        let object_key = format!("events/{}.{}", key, extension);
        match store.put(&object_key, bytes, &content_type).await {
            Ok(public_url) => RelocationOutcome::Relocated(public_url),
            Err(e) => {
                debug!(image_url, error = %e, "rehost failed, keeping original");
                RelocationOutcome::KeptOriginal
            }
        }
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        ct if ct.contains("png") => "png",
        ct if ct.contains("webp") => "webp",
        ct if ct.contains("gif") => "gif",
        ct if ct.contains("svg") => "svg",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracking_urls_discarded() {
        let relocator = ImageRelocator::new(None).unwrap();
        assert_eq!(
            relocator.relocate("https://facebook.com/tr?id=1", "abc").await,
            RelocationOutcome::Discarded
        );
        assert_eq!(
            relocator.relocate("https://example.nl/pixel.gif", "abc").await,
            RelocationOutcome::Discarded
        );
    }

    #[tokio::test]
    async fn test_no_store_keeps_original() {
        let relocator = ImageRelocator::new(None).unwrap();
        assert_eq!(
            relocator.relocate("https://cdn.example.nl/flyer.jpg", "abc").await,
            RelocationOutcome::KeptOriginal
        );
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
    }
}
