// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # LLM Provider Client
//!
//! The LLM is specified by request/response contract only: a chat-style
//! completions endpoint taking a system and user message and returning the
//! assistant text. The AI extraction fallback and the self-healing engine
//! both go through the `LlmClient` seam; tests substitute canned clients.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use event_harvester_domain::HarvestError;

use crate::infrastructure::config::LlmConfig;

/// Seam for chat completions.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends one system+user exchange and returns the assistant text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, HarvestError>;
}

/// Marker the HTTP client embeds for 429 responses so callers can requeue
/// instead of retrying immediately.
pub const RATE_LIMIT_MARKER: &str = "provider rate limited (429)";

/// Whether a provider error is the rate-limit case.
pub fn is_rate_limited(error: &HarvestError) -> bool {
    matches!(error, HarvestError::ProviderError(message) if message.contains(RATE_LIMIT_MARKER))
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Chat-completions HTTP client (OpenAI-compatible wire shape).
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarvestError::invalid_config(format!("failed to build LLM client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, HarvestError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HarvestError::TimeoutError(format!("LLM request timed out: {}", e))
                } else {
                    HarvestError::provider(format!("LLM request failed: {}", e))
                }
            })?;

        match response.status().as_u16() {
            429 => Err(HarvestError::provider(RATE_LIMIT_MARKER.to_string())),
            status if status >= 400 => Err(HarvestError::provider(format!(
                "LLM provider returned {}",
                status
            ))),
            _ => {
                let completion: CompletionResponse = response
                    .json()
                    .await
                    .map_err(|e| HarvestError::provider(format!("bad LLM response: {}", e)))?;
                completion
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| HarvestError::provider("LLM response had no choices"))
            }
        }
    }
}

/// Strips markdown code fences the model wraps JSON in.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
