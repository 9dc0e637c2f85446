// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Category
//!
//! The closed category key set every persisted event must carry. Absence or
//! ambiguity defaults to `Community`; the keyword classifier in
//! `services::category_classifier` produces these values from free text.
//!
//! The uppercase key form (`MUSIC`, `NIGHTLIFE`, …) is the wire and storage
//! representation.

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Closed set of event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Music,
    Social,
    Active,
    Culture,
    Food,
    Nightlife,
    Family,
    Civic,
    #[default]
    Community,
}

impl Category {
    /// All categories, for schema validation and prompt construction.
    pub const ALL: [Category; 9] = [
        Category::Music,
        Category::Social,
        Category::Active,
        Category::Culture,
        Category::Food,
        Category::Nightlife,
        Category::Family,
        Category::Civic,
        Category::Community,
    ];

    /// Uppercase key form used on the wire and in storage.
    pub fn as_key(&self) -> &'static str {
        match self {
            Category::Music => "MUSIC",
            Category::Social => "SOCIAL",
            Category::Active => "ACTIVE",
            Category::Culture => "CULTURE",
            Category::Food => "FOOD",
            Category::Nightlife => "NIGHTLIFE",
            Category::Family => "FAMILY",
            Category::Civic => "CIVIC",
            Category::Community => "COMMUNITY",
        }
    }

    /// Parses a category key, case-insensitively.
    pub fn parse(s: &str) -> Result<Self, HarvestError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MUSIC" => Ok(Category::Music),
            "SOCIAL" => Ok(Category::Social),
            "ACTIVE" => Ok(Category::Active),
            "CULTURE" => Ok(Category::Culture),
            "FOOD" => Ok(Category::Food),
            "NIGHTLIFE" => Ok(Category::Nightlife),
            "FAMILY" => Ok(Category::Family),
            "CIVIC" => Ok(Category::Civic),
            "COMMUNITY" => Ok(Category::Community),
            other => Err(HarvestError::validation(format!("unknown category '{}'", other))),
        }
    }

    /// Lenient parse for extractor output: anything unrecognized becomes the
    /// `Community` default rather than an error.
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_key()).unwrap(), category);
        }
    }

    #[test]
    fn test_case_insensitive_parse() {
        assert_eq!(Category::parse("music").unwrap(), Category::Music);
        assert_eq!(Category::parse(" Nightlife ").unwrap(), Category::Nightlife);
    }

    #[test]
    fn test_unknown_key_rejected_strict_defaulted_lenient() {
        assert!(Category::parse("KARAOKE").is_err());
        assert_eq!(Category::parse_lenient("KARAOKE"), Category::Community);
    }

    #[test]
    fn test_default_is_community() {
        assert_eq!(Category::default(), Category::Community);
    }

    #[test]
    fn test_serde_uses_uppercase_keys() {
        let json = serde_json::to_string(&Category::Nightlife).unwrap();
        assert_eq!(json, "\"NIGHTLIFE\"");
    }
}
