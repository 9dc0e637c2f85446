// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Source repository port. Sources are written whole: health accounting
//! mutates the entity in memory and `save` persists the full row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::Source;
use crate::error::HarvestError;
use crate::value_objects::SourceId;

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Inserts or fully updates a source row.
    async fn save(&self, source: &Source) -> Result<(), HarvestError>;

    async fn find_by_id(&self, id: SourceId) -> Result<Option<Source>, HarvestError>;

    /// Sources the coordinator may schedule: enabled, not quarantined,
    /// `next_scrape_at <= now`. Ordered by tier rank, then oldest
    /// last-successful-scrape first.
    async fn due_sources(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Source>, HarvestError>;

    /// All enabled sources, quarantined or not (operator listings).
    async fn list_enabled(&self) -> Result<Vec<Source>, HarvestError>;
}
