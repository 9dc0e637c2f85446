// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Raw Event Cards
//!
//! One candidate event as produced by an extraction strategy, before
//! normalization. Every field except the title is best-effort raw text;
//! the normalizer owns cleaning, parsing, and validation.
//!
//! Each card is tagged with the `ParsingMethod` that produced it. The
//! method's trust level decides whether downstream may skip AI polish:
//! structured-data strategies (hydration blobs, JSON-LD, microdata, feeds)
//! and stored recipes are trusted as-is; DOM/heuristic scraping may need an
//! AI pass over the raw snippet; AI-produced cards are themselves untrusted
//! and always fully validated.

use serde::{Deserialize, Serialize};

/// Which extraction strategy produced a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethod {
    Hydration,
    JsonLd,
    Microdata,
    Feed,
    Recipe,
    Dom,
    Heuristic,
    Ai,
    AiFallback,
}

/// How much downstream processing a parsing method's output needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustLevel {
    /// Fields are reliable; skip AI parsing entirely.
    Trusted,
    /// Usable, but ambiguous fields may be re-parsed with AI.
    NeedsPolish,
    /// Full AI extraction output; validate everything.
    Untrusted,
}

impl ParsingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsingMethod::Hydration => "hydration",
            ParsingMethod::JsonLd => "json_ld",
            ParsingMethod::Microdata => "microdata",
            ParsingMethod::Feed => "feed",
            ParsingMethod::Recipe => "recipe",
            ParsingMethod::Dom => "dom",
            ParsingMethod::Heuristic => "heuristic",
            ParsingMethod::Ai => "ai",
            ParsingMethod::AiFallback => "ai_fallback",
        }
    }

    /// Trust ladder from spec'd extraction semantics: structured data and
    /// recipes skip AI; DOM scraping may want polish; AI output is never
    /// trusted blindly.
    pub fn trust_level(&self) -> TrustLevel {
        match self {
            ParsingMethod::Hydration
            | ParsingMethod::JsonLd
            | ParsingMethod::Microdata
            | ParsingMethod::Feed
            | ParsingMethod::Recipe => TrustLevel::Trusted,
            ParsingMethod::Dom | ParsingMethod::Heuristic => TrustLevel::NeedsPolish,
            ParsingMethod::Ai | ParsingMethod::AiFallback => TrustLevel::Untrusted,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.trust_level() == TrustLevel::Trusted
    }
}

impl std::fmt::Display for ParsingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One candidate event before normalization.
///
/// `raw_html` keeps the card's own markup snippet so downstream stages can
/// re-parse (time-of-day extraction digs through it) without refetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEventCard {
    pub title: String,
    /// Raw date text exactly as found ("za 12 april", "2026-04-12T20:00+02:00", …).
    pub date_text: Option<String>,
    /// Raw location text (venue line, address blob, or both).
    pub location_text: Option<String>,
    pub description: Option<String>,
    /// Absolute detail URL, resolved against the page base.
    pub detail_url: Option<String>,
    pub image_url: Option<String>,
    /// Free-text category hint from the source markup, if any.
    pub category_hint: Option<String>,
    pub method: ParsingMethod,
    /// HTML snippet of the card itself, capped by the extractor.
    pub raw_html: Option<String>,
}

impl RawEventCard {
    /// Minimal card with just a title and producing method; extraction
    /// strategies fill the rest through struct update.
    pub fn new(title: impl Into<String>, method: ParsingMethod) -> Self {
        Self {
            title: title.into(),
            date_text: None,
            location_text: None,
            description: None,
            detail_url: None,
            image_url: None,
            category_hint: None,
            method,
            raw_html: None,
        }
    }

    /// A card is worth normalizing only if it has a non-empty title and at
    /// least a date or a detail link to resolve one from.
    pub fn is_viable(&self) -> bool {
        !self.title.trim().is_empty() && (self.date_text.is_some() || self.detail_url.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_ladder() {
        assert_eq!(ParsingMethod::JsonLd.trust_level(), TrustLevel::Trusted);
        assert_eq!(ParsingMethod::Recipe.trust_level(), TrustLevel::Trusted);
        assert_eq!(ParsingMethod::Dom.trust_level(), TrustLevel::NeedsPolish);
        assert_eq!(ParsingMethod::AiFallback.trust_level(), TrustLevel::Untrusted);
    }

    #[test]
    fn test_viability() {
        let mut card = RawEventCard::new("Pride Walk", ParsingMethod::Dom);
        assert!(!card.is_viable());
        card.date_text = Some("2026-08-01".into());
        assert!(card.is_viable());

        let untitled = RawEventCard::new("  ", ParsingMethod::JsonLd);
        assert!(!untitled.is_viable());
    }

    #[test]
    fn test_method_names_stable() {
        assert_eq!(ParsingMethod::JsonLd.as_str(), "json_ld");
        assert_eq!(ParsingMethod::AiFallback.as_str(), "ai_fallback");
    }
}
