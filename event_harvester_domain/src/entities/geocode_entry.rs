// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Geocode cache entry: a normalized query key resolved to coordinates.
//! Entries expire after 180 days; the hit counter informs eviction.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Coordinates;

/// Days before a cached resolution goes stale.
pub const CACHE_TTL_DAYS: i64 = 180;

/// One resolved geocoding query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    /// Normalized variant key, e.g. `paradiso|amsterdam|nl`.
    pub key: String,
    pub coordinates: Coordinates,
    /// Which provider (or `html`) resolved it.
    pub provider: String,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
}

impl GeocodeCacheEntry {
    pub fn new(key: impl Into<String>, coordinates: Coordinates, provider: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            coordinates,
            provider: provider.into(),
            hit_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::days(CACHE_TTL_DAYS)
    }

    pub fn record_hit(&mut self) {
        self.hit_count = self.hit_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_window() {
        let mut entry = GeocodeCacheEntry::new(
            "paradiso|amsterdam|nl",
            Coordinates::new(52.3622, 4.8832).unwrap(),
            "nominatim",
        );
        assert!(!entry.is_expired(Utc::now()));

        entry.created_at = Utc::now() - Duration::days(CACHE_TTL_DAYS + 1);
        assert!(entry.is_expired(Utc::now()));
    }

    #[test]
    fn test_hit_counter() {
        let mut entry = GeocodeCacheEntry::new(
            "paradiso|amsterdam|nl",
            Coordinates::new(52.3622, 4.8832).unwrap(),
            "html",
        );
        entry.record_hit();
        entry.record_hit();
        assert_eq!(entry.hit_count, 2);
    }
}
