// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Hierarchical error taxonomy for the event harvesting domain. Each variant
//! represents one stable failure class so that workers, dashboards, and the
//! retry machinery can treat errors systematically rather than by string
//! matching.
//!
//! ## Error Categories
//!
//! - **Configuration**: missing required secrets or URLs; fatal at startup
//! - **Fetch**: transient (timeout, 5xx, 429, retryable 403) vs. permanent
//!   (NXDOMAIN, 404, non-HTML leaf content)
//! - **Extraction**: every waterfall strategy produced zero cards
//! - **Validation**: extracted record missing required fields, outside the
//!   target year window, or failing the probable-event check
//! - **Geocode**: no coordinates after the hybrid ladder; item becomes
//!   laterally recoverable rather than failed
//! - **Provider**: LLM or embedding provider failure after retries;
//!   non-fatal for the item
//! - **Infrastructure**: database, serialization, timeout
//! - **Internal**: invariant violations; fatal for the worker process
//!
//! Duplicate detection is deliberately *not* an error: a duplicate insert is
//! a successful outcome, modeled as `InsertOutcome::DuplicateRace` on the
//! event repository port.
//!
//! ## Retry Semantics
//!
//! `failure_level()` maps a variant onto the queue's two-level failure
//! protocol: transient failures return the item to its prior stage with an
//! exponential not-before delay; permanent failures move it to the terminal
//! `failed` stage.

use thiserror::Error;

/// Severity of a recorded per-item failure, as understood by the queue.
///
/// Transient failures are retried (bounded by the attempt cap) by restoring
/// the item to its prior stage with an exponential `not_before` delay.
/// Permanent failures move the item to the terminal `failed` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureLevel {
    Transient,
    Permanent,
}

impl std::fmt::Display for FailureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureLevel::Transient => write!(f, "transient"),
            FailureLevel::Permanent => write!(f, "permanent"),
        }
    }
}

/// Domain-specific errors for the event harvesting pipeline.
///
/// Each variant carries a descriptive message. Variants are grouped by the
/// taxonomy in the module documentation; `category()` exposes the group name
/// for metrics labels and dashboard grouping.
#[derive(Error, Debug, Clone)]
pub enum HarvestError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Transient fetch failure: {0}")]
    FetchTransient(String),

    #[error("Permanent fetch failure: {0}")]
    FetchPermanent(String),

    #[error("Extraction produced no cards: {0}")]
    ExtractionEmpty(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Geocoding incomplete: {0}")]
    GeocodeIncomplete(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Queue item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid stage transition: {0}")]
    InvalidStageTransition(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HarvestError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new transient fetch error
    pub fn fetch_transient(msg: impl Into<String>) -> Self {
        Self::FetchTransient(msg.into())
    }

    /// Creates a new permanent fetch error
    pub fn fetch_permanent(msg: impl Into<String>) -> Self {
        Self::FetchPermanent(msg.into())
    }

    /// Creates a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::ProviderError(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Maps this error onto the queue's failure protocol.
    ///
    /// Returns `None` for errors that should not be recorded against a queue
    /// item at all (configuration and invariant violations are process-level
    /// conditions, not item-level ones).
    pub fn failure_level(&self) -> Option<FailureLevel> {
        match self {
            HarvestError::FetchTransient(_)
            | HarvestError::TimeoutError(_)
            | HarvestError::ExtractionEmpty(_)
            | HarvestError::ValidationError(_)
            | HarvestError::ProviderError(_)
            | HarvestError::DatabaseError(_) => Some(FailureLevel::Transient),
            HarvestError::FetchPermanent(_) => Some(FailureLevel::Permanent),
            _ => None,
        }
    }

    /// Checks if the error indicates a retryable condition
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HarvestError::FetchTransient(_)
                | HarvestError::TimeoutError(_)
                | HarvestError::ProviderError(_)
                | HarvestError::DatabaseError(_)
        )
    }

    /// Checks if the error must terminate the worker process.
    ///
    /// Invariant violations leave the in-memory state untrustworthy; the
    /// supervisor restarts the worker and stalled claims are reaped.
    pub fn is_fatal_for_worker(&self) -> bool {
        matches!(self, HarvestError::InternalError(_) | HarvestError::InvalidStageTransition(_))
    }

    /// Gets the error category for metrics labels and failure grouping
    pub fn category(&self) -> &'static str {
        match self {
            HarvestError::InvalidConfiguration(_) => "configuration",
            HarvestError::FetchTransient(_) => "fetch_transient",
            HarvestError::FetchPermanent(_) => "fetch_permanent",
            HarvestError::ExtractionEmpty(_) => "extraction_empty",
            HarvestError::ValidationError(_) => "validation",
            HarvestError::GeocodeIncomplete(_) => "geocode",
            HarvestError::ProviderError(_) => "provider",
            HarvestError::DatabaseError(_) => "database",
            HarvestError::SerializationError(_) => "serialization",
            HarvestError::TimeoutError(_) => "timeout",
            HarvestError::Cancelled(_) => "cancellation",
            HarvestError::SourceNotFound(_) => "source",
            HarvestError::ItemNotFound(_) => "queue",
            HarvestError::InvalidStageTransition(_) => "invariant",
            HarvestError::MetricsError(_) => "metrics",
            HarvestError::InternalError(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::SerializationError(err.to_string())
    }
}
