// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Harvester Configuration
//!
//! Typed configuration layered from defaults, an optional TOML file, and
//! `HARVESTER_`-prefixed environment variables (double underscore as the
//! section separator: `HARVESTER_FETCH__STATIC_TIMEOUT_SECS=20`).
//!
//! ## Degradation Policy
//!
//! The datastore URL is the only hard requirement; a missing value is a
//! fatal `InvalidConfiguration` at startup. Every provider block - LLM,
//! embedding, dynamic renderer, geocoders, image bucket, Slack - is
//! optional, and an absent block degrades the corresponding capability
//! gracefully: no AI fallback, no vectors (re-embed sweep idles), no
//! dynamic rung on the failover ladder, geocoding limited to HTML
//! extraction and cache, images left at their origin URLs.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use event_harvester_domain::HarvestError;

/// Root configuration for all harvester processes.
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// SQLite connection URL. Required; startup fails without it.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// LLM provider for AI extraction and healing. Optional.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    /// Embedding provider. Optional.
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    /// External render service for dynamic fetching. Optional.
    #[serde(default)]
    pub renderer: Option<RendererConfig>,
    /// Geocoding providers, tried round-robin. May be empty.
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Object storage for image relocation. Optional.
    #[serde(default)]
    pub image_store: Option<ImageStoreConfig>,
    /// Slack webhook for error/fatal alerts. Optional.
    #[serde(default)]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub static_timeout_secs: u64,
    pub dynamic_timeout_secs: u64,
    /// Default minimum inter-request delay per host, overridable per source.
    pub min_host_delay_ms: u64,
    /// Retry attempts per fetch before failover accounting.
    pub max_attempts: u32,
    /// Backoff cap between fetch retries.
    pub max_backoff_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            static_timeout_secs: 15,
            dynamic_timeout_secs: 30,
            min_host_delay_ms: 200,
            max_attempts: 3,
            max_backoff_secs: 10,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:140.0) Gecko/20100101 Firefox/140.0"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Transient-failure attempts before an item goes terminal.
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Items per worker batch.
    pub batch_limit: u32,
    /// Claims older than this are reaped as stalled.
    pub claim_ttl_secs: u64,
    /// Soft deadline for one worker batch.
    pub soft_deadline_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1,
            max_delay_secs: 300,
            batch_limit: 10,
            claim_ttl_secs: 120,
            soft_deadline_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum cards for a strategy to win the waterfall.
    pub min_cards: usize,
    /// Pagination recursion depth per source run.
    pub pagination_depth: u32,
    /// Accepted years: current through current + window.
    pub target_year_window: i32,
    /// HTML handed to the LLM is truncated to this many chars.
    pub ai_html_max_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_cards: 1,
            pagination_depth: 1,
            target_year_window: 1,
            ai_html_max_chars: 24_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Consecutive failures that trigger a healing attempt.
    pub failure_threshold: u32,
    /// Consecutive failures (with a failed healing attempt) that quarantine.
    pub quarantine_threshold: u32,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            quarantine_threshold: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Sources scheduled per coordinator tick.
    pub batch_size: u32,
    /// `ready_to_persist` depth beyond which minting halves.
    pub backpressure_threshold: u64,
    /// Re-scrape interval for a source after a successful run.
    pub scrape_interval_hours: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            backpressure_threshold: 200,
            scrape_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeocodingConfig {
    #[serde(default)]
    pub providers: Vec<GeocodeProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeProviderConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Minimum delay between requests to this provider.
    #[serde(default = "default_provider_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_provider_delay_ms() -> u64 {
    1100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageStoreConfig {
    /// Bucket base URL; objects are PUT at `{endpoint}/{key}`.
    pub endpoint: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl HarvestConfig {
    /// Loads configuration: defaults ← optional TOML file ← environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, HarvestError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix("HARVESTER").separator("__"))
            .build()
            .map_err(|e| HarvestError::invalid_config(format!("failed to load configuration: {}", e)))?;

        let config: HarvestConfig = settings
            .try_deserialize()
            .map_err(|e| HarvestError::invalid_config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation: the datastore URL is the one hard requirement.
    pub fn validate(&self) -> Result<(), HarvestError> {
        match &self.database_url {
            Some(url) if !url.trim().is_empty() => {}
            _ => {
                return Err(HarvestError::invalid_config(
                    "database_url is required (set HARVESTER_DATABASE_URL or the database_url key)",
                ))
            }
        }
        if self.queue.max_attempts == 0 {
            return Err(HarvestError::invalid_config("queue.max_attempts must be at least 1"));
        }
        if self.extraction.min_cards == 0 {
            return Err(HarvestError::invalid_config("extraction.min_cards must be at least 1"));
        }
        Ok(())
    }

    /// The validated datastore URL.
    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> HarvestConfig {
        HarvestConfig {
            database_url: Some("sqlite://harvester.db".into()),
            fetch: FetchConfig::default(),
            queue: QueueConfig::default(),
            extraction: ExtractionConfig::default(),
            healing: HealingConfig::default(),
            coordinator: CoordinatorConfig::default(),
            llm: None,
            embedding: None,
            renderer: None,
            geocoding: GeocodingConfig::default(),
            image_store: None,
            slack_webhook: None,
        }
    }

    #[test]
    fn test_defaults_are_spec_values() {
        let config = base_config();
        assert_eq!(config.fetch.static_timeout_secs, 15);
        assert_eq!(config.fetch.dynamic_timeout_secs, 30);
        assert_eq!(config.fetch.min_host_delay_ms, 200);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.extraction.min_cards, 1);
        assert_eq!(config.extraction.pagination_depth, 1);
        assert_eq!(config.healing.failure_threshold, 3);
    }

    #[test]
    fn test_missing_database_url_is_fatal() {
        let mut config = base_config();
        config.database_url = None;
        assert!(matches!(
            config.validate(),
            Err(HarvestError::InvalidConfiguration(_))
        ));

        config.database_url = Some("  ".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_optional_providers_absent_is_valid() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert!(config.llm.is_none());
        assert!(config.geocoding.providers.is_empty());
    }
}
