// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hydration Blob Extraction
//!
//! Single-page apps ship their event data in serialized state globals
//! before the DOM ever shows it: Next.js `__NEXT_DATA__`, Nuxt
//! `__NUXT__`, and the generic `window.__PRELOADED_STATE__ = {...}`
//! pattern. This strategy pulls those blobs and scans the JSON for
//! event-shaped objects (a title-ish key plus a date-ish key).

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::extraction::support::resolve_url;

/// Bounded scan depth through state trees.
const MAX_SCAN_DEPTH: usize = 12;
/// Cards cap per blob; state trees can hold thousands of entities.
const MAX_CARDS_PER_BLOB: usize = 100;

static PRELOADED_STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)window\.(__PRELOADED_STATE__|__INITIAL_STATE__|__APP_STATE__)\s*=\s*(\{.*?\})\s*(?:;|</script>)",
    )
    .expect("static regex")
});

/// Extracts cards from hydration blobs.
pub fn extract(html: &Html, base_url: &str, raw_html: &str) -> Vec<RawEventCard> {
    let mut cards = Vec::new();

    // Next.js: a dedicated script tag with well-formed JSON.
    let next_selector = Selector::parse("script#__NEXT_DATA__").expect("static selector");
    for script in html.select(&next_selector) {
        let raw = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            scan(&value, base_url, MAX_SCAN_DEPTH, &mut cards);
        }
    }

    // Generic preloaded-state assignments, regex-located in the raw page.
    if cards.is_empty() {
        for caps in PRELOADED_STATE_RE.captures_iter(raw_html) {
            if let Ok(value) = serde_json::from_str::<Value>(&caps[2]) {
                scan(&value, base_url, MAX_SCAN_DEPTH, &mut cards);
            }
        }
    }

    cards.truncate(MAX_CARDS_PER_BLOB);
    cards
}

fn scan(value: &Value, base_url: &str, depth: usize, out: &mut Vec<RawEventCard>) {
    if depth == 0 || out.len() >= MAX_CARDS_PER_BLOB {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                scan(item, base_url, depth - 1, out);
            }
        }
        Value::Object(map) => {
            if let Some(card) = object_to_card(map, base_url) {
                out.push(card);
                // An event object's children are its own fields; no need
                // to scan inside it for more events.
                return;
            }
            for child in map.values() {
                scan(child, base_url, depth - 1, out);
            }
        }
        _ => {}
    }
}

const TITLE_KEYS: &[&str] = &["title", "name", "eventTitle", "eventName"];
const DATE_KEYS: &[&str] = &["startDate", "start_date", "date", "eventDate", "startsAt", "start"];

fn object_to_card(map: &serde_json::Map<String, Value>, base_url: &str) -> Option<RawEventCard> {
    let title = TITLE_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .filter(|t| !t.trim().is_empty())?;
    let date = DATE_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .filter(|d| looks_like_date(d))?;

    let mut card = RawEventCard::new(title, ParsingMethod::Hydration);
    card.date_text = Some(date.to_string());
    card.description = map
        .get("description")
        .or_else(|| map.get("summary"))
        .and_then(Value::as_str)
        .map(String::from);
    card.location_text = map
        .get("venue")
        .or_else(|| map.get("location"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(String::from),
            _ => None,
        });
    card.detail_url = map
        .get("url")
        .or_else(|| map.get("slug"))
        .or_else(|| map.get("link"))
        .and_then(Value::as_str)
        .and_then(|u| resolve_url(base_url, u));
    card.image_url = map
        .get("image")
        .or_else(|| map.get("imageUrl"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("url").and_then(Value::as_str).map(String::from),
            _ => None,
        })
        .and_then(|u| resolve_url(base_url, &u));
    card.category_hint = map
        .get("category")
        .or_else(|| map.get("genre"))
        .and_then(Value::as_str)
        .map(String::from);
    Some(card)
}

/// Cheap shape check so `"date": "TBA"` or ids don't pass as dates.
fn looks_like_date(s: &str) -> bool {
    s.len() >= 8 && s.chars().filter(|c| c.is_ascii_digit()).count() >= 4
}
