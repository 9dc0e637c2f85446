// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dynamic Fetcher
//!
//! JavaScript rendering is delegated to an external render service
//! (headless-browser farm or scrapingbee-style API); this module speaks its
//! request/response contract. The service is optional configuration: when
//! absent, the failover ladder simply has no dynamic rung.
//!
//! Contract: `POST {endpoint}` with `{"url": …, "wait_ms": …}` (bearer key
//! if configured) returns `{"html": …, "status": …, "final_url": …}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use event_harvester_domain::HarvestError;

use crate::infrastructure::config::{FetchConfig, RendererConfig};
use crate::infrastructure::fetch::client::FetchedPage;

/// Seam for rendered fetching; the failover machine only sees this trait.
#[async_trait]
pub trait DynamicFetcher: Send + Sync {
    async fn fetch_rendered(&self, url: &str) -> Result<FetchedPage, HarvestError>;
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    final_url: Option<String>,
}

fn default_status() -> u16 {
    200
}

/// Render-service client implementation.
pub struct RenderServiceFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    wait_ms: u64,
}

impl RenderServiceFetcher {
    pub fn new(renderer: &RendererConfig, fetch: &FetchConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(fetch.dynamic_timeout_secs))
            .build()
            .map_err(|e| {
                HarvestError::invalid_config(format!("failed to build render client: {}", e))
            })?;
        Ok(Self {
            client,
            endpoint: renderer.endpoint.clone(),
            api_key: renderer.api_key.clone(),
            wait_ms: 2_000,
        })
    }
}

#[async_trait]
impl DynamicFetcher for RenderServiceFetcher {
    async fn fetch_rendered(&self, url: &str) -> Result<FetchedPage, HarvestError> {
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "url": url,
            "wait_ms": self.wait_ms,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HarvestError::TimeoutError(format!("render service timeout: {}", e))
            } else {
                HarvestError::fetch_transient(format!("render service unreachable: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(HarvestError::fetch_transient(format!(
                "render service returned {}",
                response.status()
            )));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| HarvestError::fetch_transient(format!("bad render response: {}", e)))?;

        Ok(FetchedPage {
            html: rendered.html,
            final_url: rendered.final_url.unwrap_or_else(|| url.to_string()),
            status_code: rendered.status,
            headers: std::collections::BTreeMap::new(),
        })
    }
}
