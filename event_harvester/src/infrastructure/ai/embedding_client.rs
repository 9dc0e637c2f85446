// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Embedding Provider Client
//!
//! Vector generation by contract: POST text, receive a float vector. The
//! canonical store is 1536-wide; providers returning fewer dimensions are
//! zero-padded and longer vectors truncated, so the column shape never
//! varies. Embedding failure is non-blocking by design - events persist
//! without a vector and a background sweep re-embeds later.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use event_harvester_domain::entities::EMBEDDING_DIM;
use event_harvester_domain::HarvestError;

use crate::infrastructure::config::EmbeddingConfig;

/// Seam for embedding generation.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds one text; the result is already padded to 1536.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HarvestError>;
}

/// Pads or truncates a provider vector to the canonical 1536 width.
pub fn pad_to_dimension(mut vector: Vec<f32>) -> Vec<f32> {
    vector.resize(EMBEDDING_DIM, 0.0);
    vector
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embeddings HTTP client (OpenAI-compatible wire shape).
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                HarvestError::invalid_config(format!("failed to build embedding client: {}", e))
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, HarvestError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
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
                    HarvestError::TimeoutError(format!("embedding request timed out: {}", e))
                } else {
                    HarvestError::provider(format!("embedding request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(HarvestError::provider(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| HarvestError::provider(format!("bad embedding response: {}", e)))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| HarvestError::provider("embedding response had no data"))?;

        Ok(pad_to_dimension(vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_vector_zero_padded() {
        let padded = pad_to_dimension(vec![0.5; 768]);
        assert_eq!(padded.len(), EMBEDDING_DIM);
        assert_eq!(padded[767], 0.5);
        assert_eq!(padded[768], 0.0);
        assert_eq!(padded[EMBEDDING_DIM - 1], 0.0);
    }

    #[test]
    fn test_exact_vector_untouched() {
        let padded = pad_to_dimension(vec![0.25; EMBEDDING_DIM]);
        assert_eq!(padded.len(), EMBEDDING_DIM);
        assert!(padded.iter().all(|v| *v == 0.25));
    }

    #[test]
    fn test_long_vector_truncated() {
        let padded = pad_to_dimension(vec![1.0; EMBEDDING_DIM + 100]);
        assert_eq!(padded.len(), EMBEDDING_DIM);
    }
}
