// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Geocode cache port. Keys are the normalized variant strings produced by
//! the fuzzy normalizer; a hit bumps the entry's counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::GeocodeCacheEntry;
use crate::error::HarvestError;

#[async_trait]
pub trait GeocodeCacheRepository: Send + Sync {
    /// Looks up a non-expired entry and increments its hit counter.
    async fn lookup(&self, key: &str, now: DateTime<Utc>) -> Result<Option<GeocodeCacheEntry>, HarvestError>;

    /// Inserts or refreshes an entry.
    async fn upsert(&self, entry: &GeocodeCacheEntry) -> Result<(), HarvestError>;

    /// Removes entries past their TTL. Returns how many were purged.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, HarvestError>;
}
