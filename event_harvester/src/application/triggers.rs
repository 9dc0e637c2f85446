// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Trigger Surface Contracts
//!
//! JSON request/response shapes for the thin HTTP handler shells and the
//! CLI subcommands - both drive the same application services. Every
//! request type accepts an empty body and fills defaults.

use serde::{Deserialize, Serialize};

/// Coordinator run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorMode {
    /// Discover new sources only.
    Discovery,
    /// Re-crawl known sources only.
    CrawlExisting,
    /// Both.
    #[default]
    Full,
}

impl CoordinatorMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovery" => Some(CoordinatorMode::Discovery),
            "crawl_existing" => Some(CoordinatorMode::CrawlExisting),
            "full" => Some(CoordinatorMode::Full),
            _ => None,
        }
    }
}

/// Coordinator trigger request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoordinatorRequest {
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub mode: CoordinatorMode,
}

/// Stage-worker trigger request (fetch and enrichment stages).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageRequest {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
}

/// Persister trigger request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistRequest {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub skip_embedding: bool,
    #[serde(default)]
    pub worker_id: Option<String>,
}

/// Healing trigger request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealRequest {
    pub source_id: String,
    #[serde(default)]
    pub mode: HealMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealMode {
    #[default]
    Repair,
    Revert,
}

/// Uniform trigger response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageResponse {
    pub success: bool,
    pub items_processed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_enriched: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_failed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_persisted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_incomplete: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl StageResponse {
    pub fn processed(items_processed: u64) -> Self {
        Self {
            success: true,
            items_processed,
            ..Default::default()
        }
    }
}
