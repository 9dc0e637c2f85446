// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Probable-Event Noise Filter
//!
//! Extraction strategies, DOM scraping especially, pick up things that are
//! not events: navigation links, comment sections, cookie banners, and -
//! the classic failure - the listing page's own heading ("Concerten in
//! Amsterdam") scraped as if it were an event. This filter rejects those
//! before they can become queue payload.

use once_cell::sync::Lazy;
use regex::Regex;

/// Generic listing-page headings: a plural events word followed by a
/// location preposition ("Evenementen in Utrecht", "Concerts in Berlin",
/// "Wat te doen in Amsterdam").
static LISTING_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(evenementen|events|concerten|concerts|activiteiten|uitagenda|agenda|veranstaltungen|wat te doen|what'?s on|things to do|uitgaan)\b.{0,40}\b(in|te|bij|rond|near|rondom)\b",
    )
    .expect("static regex")
});

/// Navigation, chrome, and comment noise that shows up as card titles.
static NAV_NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(menu|home|login|inloggen|zoeken|search|contact|nieuwsbrief|newsletter|cookie|cookies|privacy|voorwaarden|reacties?|comments?|lees meer|read more|meer info|volgende|vorige|next|previous|share|deel dit|sitemap|404|page not found)\s*$",
    )
    .expect("static regex")
});

/// Heuristic check that an extracted card plausibly describes one event.
pub fn is_probable_event(title: &str, description: Option<&str>) -> bool {
    let title = title.trim();
    if title.chars().count() < 3 {
        return false;
    }
    if LISTING_HEADING_RE.is_match(title) {
        return false;
    }
    if NAV_NOISE_RE.is_match(title) {
        return false;
    }
    if let Some(description) = description {
        // A card whose body is purely a comment thread is not an event.
        let lowered = description.to_lowercase();
        if lowered.starts_with("reactie van") || lowered.starts_with("comment by") {
            return false;
        }
    }
    true
}
