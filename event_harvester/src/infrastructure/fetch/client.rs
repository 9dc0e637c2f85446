// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Static HTTP Fetcher
//!
//! Plain reqwest GET with browser-mimicking headers. Status codes ≥ 400 are
//! returned to the caller in the `FetchedPage` - the waterfall and failover
//! machinery decide what a 403 or 503 means; only transport-level failures
//! become errors here.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::collections::BTreeMap;
use std::time::Duration;

use event_harvester_domain::HarvestError;

use crate::infrastructure::config::FetchConfig;

/// Result of one fetch, successful or not: the caller owns status handling.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    /// URL after redirects.
    pub final_url: String,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Whether the payload is HTML/XML rather than JSON, PDF, images…
    pub fn is_markup(&self) -> bool {
        match self.content_type() {
            Some(ct) => {
                ct.contains("html") || ct.contains("xml") || ct.contains("text/plain")
            }
            // Absent content type: assume markup and let extraction decide.
            None => true,
        }
    }
}

/// Browser-mimicking static fetcher over a shared reqwest client.
#[derive(Clone)]
pub struct StaticFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl StaticFetcher {
    /// Builds the shared client: redirects followed, gzip on, cookies kept
    /// for the session.
    pub fn new(config: &FetchConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .gzip(true)
            .timeout(Duration::from_secs(config.static_timeout_secs))
            .build()
            .map_err(|e| HarvestError::invalid_config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// - `FetchPermanent` for DNS resolution failures
    /// - `TimeoutError` for request timeouts
    /// - `FetchTransient` for other transport failures
    ///
    /// HTTP error statuses do NOT error; they come back in the page.
    pub async fn fetch(&self, url: &str, language: &str) -> Result<FetchedPage, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value(&format!("{},en;q=0.7", language))?);

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let html = response.text().await.map_err(classify_transport_error)?;

        Ok(FetchedPage {
            html,
            final_url,
            status_code,
            headers,
        })
    }
}

fn header_value(s: &str) -> Result<HeaderValue, HarvestError> {
    HeaderValue::from_str(s)
        .map_err(|e| HarvestError::invalid_config(format!("invalid header value '{}': {}", s, e)))
}

/// Maps a reqwest transport failure onto the fetch taxonomy.
fn classify_transport_error(e: reqwest::Error) -> HarvestError {
    if e.is_timeout() {
        return HarvestError::TimeoutError(e.to_string());
    }
    // reqwest wraps resolver failures inside connect errors; the rendered
    // message is the only portable discriminator.
    let message = e.to_string();
    if e.is_connect() && message.contains("dns") {
        return HarvestError::fetch_permanent(format!("DNS resolution failed: {}", message));
    }
    HarvestError::fetch_transient(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, content_type: Option<&str>) -> FetchedPage {
        let mut headers = BTreeMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        FetchedPage {
            html: String::new(),
            final_url: "https://example.nl".into(),
            status_code: status,
            headers,
        }
    }

    #[test]
    fn test_success_range() {
        assert!(page(200, None).is_success());
        assert!(page(204, None).is_success());
        assert!(!page(301, None).is_success());
        assert!(!page(403, None).is_success());
        assert!(!page(500, None).is_success());
    }

    #[test]
    fn test_markup_detection() {
        assert!(page(200, Some("text/html; charset=utf-8")).is_markup());
        assert!(page(200, Some("application/xhtml+xml")).is_markup());
        assert!(page(200, Some("application/rss+xml")).is_markup());
        assert!(!page(200, Some("application/pdf")).is_markup());
        assert!(!page(200, Some("image/png")).is_markup());
        assert!(page(200, None).is_markup());
    }
}
