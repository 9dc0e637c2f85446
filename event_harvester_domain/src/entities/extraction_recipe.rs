// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extraction Recipe
//!
//! A stored set of CSS selectors for deterministic extraction from one site:
//! `container → item → field selectors`. Recipes are the trusted fast path
//! of the waterfall and the artifact the self-healing engine regenerates
//! when a site's markup drifts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Where a recipe came from; healing-generated recipes carry their model
/// confidence for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecipeOrigin {
    /// Hand-written by an operator.
    #[default]
    Manual,
    /// Produced by the self-healing selector engine.
    Healed {
        confidence: f64,
        reasoning: String,
    },
}

/// Selector set for deterministic extraction from one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecipe {
    /// Selector for the listing container ("#agenda", "main .events").
    container_selector: String,
    /// Selector for one event card within the container.
    item_selector: String,
    /// Field selectors, relative to an item.
    title_selector: String,
    pub date_selector: Option<String>,
    pub link_selector: Option<String>,
    pub image_selector: Option<String>,
    pub description_selector: Option<String>,
    pub location_selector: Option<String>,
    pub time_selector: Option<String>,
    origin: RecipeOrigin,
    generated_at: DateTime<Utc>,
}

impl ExtractionRecipe {
    /// Creates a recipe from the three required selectors.
    pub fn new(
        container: impl Into<String>,
        item: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, HarvestError> {
        let container = container.into();
        let item = item.into();
        let title = title.into();
        for (field, value) in [("container", &container), ("item", &item), ("title", &title)] {
            if value.trim().is_empty() {
                return Err(HarvestError::validation(format!(
                    "recipe {} selector cannot be empty",
                    field
                )));
            }
        }
        Ok(Self {
            container_selector: container,
            item_selector: item,
            title_selector: title,
            date_selector: None,
            link_selector: None,
            image_selector: None,
            description_selector: None,
            location_selector: None,
            time_selector: None,
            origin: RecipeOrigin::default(),
            generated_at: Utc::now(),
        })
    }

    pub fn container_selector(&self) -> &str {
        &self.container_selector
    }

    pub fn item_selector(&self) -> &str {
        &self.item_selector
    }

    pub fn title_selector(&self) -> &str {
        &self.title_selector
    }

    pub fn origin(&self) -> &RecipeOrigin {
        &self.origin
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Marks this recipe as produced by the healing engine.
    pub fn with_healed_origin(mut self, confidence: f64, reasoning: impl Into<String>) -> Self {
        self.origin = RecipeOrigin::Healed {
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_selectors_validated() {
        assert!(ExtractionRecipe::new("", ".card", "h3").is_err());
        assert!(ExtractionRecipe::new(".events", " ", "h3").is_err());
        assert!(ExtractionRecipe::new(".events", ".card", "h3").is_ok());
    }

    #[test]
    fn test_healed_origin_clamps_confidence() {
        let recipe = ExtractionRecipe::new(".events", ".card", "h3")
            .unwrap()
            .with_healed_origin(1.7, "container class renamed");
        match recipe.origin() {
            RecipeOrigin::Healed { confidence, .. } => assert_eq!(*confidence, 1.0),
            other => panic!("unexpected origin {:?}", other),
        }
    }
}
