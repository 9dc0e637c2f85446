// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Price information: the raw source string plus whatever numeric bounds and
//! currency could be derived from it. The raw string is always preserved;
//! parsing is best-effort and never fails an item.

use serde::{Deserialize, Serialize};

/// Price as harvested, with optional parsed bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceInfo {
    /// Verbatim price text from the source ("€ 12,50", "gratis", "15-20 EUR").
    pub raw: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// ISO 4217 code where recognizable.
    pub currency: Option<String>,
}

impl PriceInfo {
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.min.is_none() && self.max.is_none()
    }

    /// Free events: recognized "free" keywords or an explicit zero bound.
    pub fn is_free(&self) -> bool {
        if self.min == Some(0.0) && self.max.unwrap_or(0.0) == 0.0 {
            return true;
        }
        self.raw
            .as_deref()
            .map(|raw| {
                let lowered = raw.to_lowercase();
                ["gratis", "free", "vrij entree", "kostenlos"]
                    .iter()
                    .any(|kw| lowered.contains(kw))
            })
            .unwrap_or(false)
    }
}
