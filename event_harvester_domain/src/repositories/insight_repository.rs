// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Insight and healing-log port. Per-run observations feed dashboards and
//! the `auto` fetch-strategy selector; healing attempts are an audit trail.

use async_trait::async_trait;

use crate::entities::{HealingAttempt, SourceInsight};
use crate::error::HarvestError;
use crate::value_objects::{ParsingMethod, SourceId};

#[async_trait]
pub trait InsightRepository: Send + Sync {
    async fn record_insight(&self, insight: &SourceInsight) -> Result<(), HarvestError>;

    async fn record_healing_attempt(&self, attempt: &HealingAttempt) -> Result<(), HarvestError>;

    /// Most recent winning extraction strategy for a source, if any run has
    /// succeeded. Drives `auto` strategy resolution.
    async fn latest_winning_strategy(
        &self,
        source_id: SourceId,
    ) -> Result<Option<ParsingMethod>, HarvestError>;

    /// Recent raw-HTML-size observations for a source (healing wants the
    /// previous snapshot's vitals for diff context).
    async fn recent_insights(
        &self,
        source_id: SourceId,
        limit: u32,
    ) -> Result<Vec<SourceInsight>, HarvestError>;
}
