// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Geographic Coordinates
//!
//! Validated latitude/longitude pair. Construction rejects out-of-range
//! values and the null island `(0, 0)` - the geocoder contract guarantees it
//! never produces `(0, 0)`, and the merge policy treats a stored `(0, 0)` as
//! absent.
//!
//! ## Wire Forms
//!
//! Serialized as `{lat, lng}`; `to_point()` renders the `POINT(lng lat)`
//! string the geo-typed datastore column expects (longitude first).

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    lat: f64,
    lng: f64,
}

impl Coordinates {
    /// Creates a validated coordinate pair.
    ///
    /// # Errors
    ///
    /// Rejects latitudes outside [-90, 90], longitudes outside [-180, 180],
    /// non-finite values, and the `(0, 0)` null island.
    pub fn new(lat: f64, lng: f64) -> Result<Self, HarvestError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(HarvestError::validation("coordinates must be finite"));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(HarvestError::validation(format!("latitude {} out of range", lat)));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(HarvestError::validation(format!("longitude {} out of range", lng)));
        }
        if lat == 0.0 && lng == 0.0 {
            return Err(HarvestError::validation("(0, 0) is not a usable coordinate"));
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// `POINT(lng lat)` - longitude first, the geo column convention.
    pub fn to_point(&self) -> String {
        format!("POINT({} {})", self.lng, self.lat)
    }

    /// Parses a `POINT(lng lat)` string back into a validated pair.
    pub fn from_point(s: &str) -> Result<Self, HarvestError> {
        let inner = s
            .trim()
            .strip_prefix("POINT(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| HarvestError::validation(format!("malformed point '{}'", s)))?;
        let mut parts = inner.split_whitespace();
        let lng: f64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| HarvestError::validation("point missing longitude"))?;
        let lat: f64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| HarvestError::validation("point missing latitude"))?;
        Self::new(lat, lng)
    }

    /// Approximate equality up to float noise from storage round-trips.
    pub fn approx_eq(&self, other: &Coordinates) -> bool {
        (self.lat - other.lat).abs() < 1e-6 && (self.lng - other.lng).abs() < 1e-6
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}
