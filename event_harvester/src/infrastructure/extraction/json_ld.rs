// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # JSON-LD Extraction
//!
//! Collects every `<script type="application/ld+json">` block, flattens
//! embedded `@graph` structures with a bounded traversal depth (schema.org
//! graphs reference themselves through `@id` links; unbounded walks would
//! not terminate), and keeps nodes whose `@type` is an Event subtype.
//!
//! A node is *complete* - and becomes a card - iff it carries a name and a
//! start date. Location, image, offer, and description fields are mapped
//! when present in any of the common shapes (bare string, object, array).

use scraper::{Html, Selector};
use serde_json::Value;

use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::extraction::support::resolve_url;

/// Bounded traversal depth over nested @graph structures.
const MAX_GRAPH_DEPTH: usize = 8;

/// Extracts event cards from all JSON-LD blocks in the document.
pub fn extract(html: &Html, base_url: &str) -> Vec<RawEventCard> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]")
        .expect("static selector");

    let mut cards = Vec::new();
    for script in html.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let mut nodes = Vec::new();
        collect_event_nodes(&value, MAX_GRAPH_DEPTH, &mut nodes);
        for node in nodes {
            if let Some(card) = node_to_card(node, base_url) {
                cards.push(card);
            }
        }
    }
    cards
}

/// Depth-bounded walk that accumulates Event-typed object nodes.
fn collect_event_nodes<'v>(value: &'v Value, depth: usize, out: &mut Vec<&'v Value>) {
    if depth == 0 {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_event_nodes(item, depth - 1, out);
            }
        }
        Value::Object(map) => {
            if is_event_type(map.get("@type")) {
                out.push(value);
            }
            if let Some(graph) = map.get("@graph") {
                collect_event_nodes(graph, depth - 1, out);
            }
            // Events are sometimes nested under mainEntity or itemListElement.
            for key in ["mainEntity", "itemListElement", "item"] {
                if let Some(nested) = map.get(key) {
                    collect_event_nodes(nested, depth - 1, out);
                }
            }
        }
        _ => {}
    }
}

fn is_event_type(type_field: Option<&Value>) -> bool {
    match type_field {
        Some(Value::String(s)) => s.ends_with("Event"),
        Some(Value::Array(items)) => items
            .iter()
            .any(|t| t.as_str().map(|s| s.ends_with("Event")).unwrap_or(false)),
        _ => false,
    }
}

fn node_to_card(node: &Value, base_url: &str) -> Option<RawEventCard> {
    let name = string_field(node, "name")?;
    let start_date = string_field(node, "startDate")?;
    if name.trim().is_empty() || start_date.trim().is_empty() {
        return None;
    }

    let mut card = RawEventCard::new(name, ParsingMethod::JsonLd);
    card.date_text = Some(start_date);
    card.description = string_field(node, "description");
    card.detail_url = string_field(node, "url").and_then(|u| resolve_url(base_url, &u));
    card.image_url = image_field(node).and_then(|u| resolve_url(base_url, &u));
    card.location_text = location_text(node.get("location"));
    card.category_hint = string_field(node, "keywords").or_else(|| event_subtype(node));
    card.raw_html = Some(node.to_string());
    Some(card)
}

/// Reads a field that may be a string or a localized/object wrapper.
fn string_field(node: &Value, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("@value").and_then(Value::as_str).map(String::from),
        Value::Array(items) => items.first().and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// `image` may be a URL string, an ImageObject, or an array of either.
fn image_field(node: &Value) -> Option<String> {
    match node.get("image")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(String::from),
        Value::Array(items) => items.first().and_then(|first| match first {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("url").and_then(Value::as_str).map(String::from),
            _ => None,
        }),
        _ => None,
    }
}

/// Renders `location` (Place, PostalAddress, string, or array) into one
/// raw line: "Venue, Street 1, City".
fn location_text(location: Option<&Value>) -> Option<String> {
    let location = location?;
    match location {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(|first| location_text(Some(first))),
        Value::Object(map) => {
            let mut parts = Vec::new();
            if let Some(name) = map.get("name").and_then(Value::as_str) {
                parts.push(name.to_string());
            }
            if let Some(address) = map.get("address") {
                match address {
                    Value::String(s) => parts.push(s.clone()),
                    Value::Object(addr) => {
                        for key in ["streetAddress", "postalCode", "addressLocality"] {
                            if let Some(part) = addr.get(key).and_then(Value::as_str) {
                                parts.push(part.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

/// "MusicEvent" → "Music" as a category hint; bare "Event" gives nothing.
fn event_subtype(node: &Value) -> Option<String> {
    let type_name = match node.get("@type")? {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| s.ends_with("Event"))?
            .to_string(),
        _ => return None,
    };
    let stem = type_name.strip_suffix("Event")?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Embedded geo coordinates, used later by the enrichment stage; exposed
/// here so the HTML coordinate extractor shares the traversal.
pub fn geo_coordinates(html: &Html) -> Option<(f64, f64)> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]")
        .expect("static selector");
    for script in html.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let mut nodes = Vec::new();
        collect_event_nodes(&value, MAX_GRAPH_DEPTH, &mut nodes);
        for node in nodes {
            let geo = node
                .get("location")
                .and_then(|l| l.get("geo"))
                .or_else(|| node.get("geo"));
            if let Some(geo) = geo {
                let lat = number_field(geo, "latitude");
                let lng = number_field(geo, "longitude");
                if let (Some(lat), Some(lng)) = (lat, lng) {
                    return Some((lat, lng));
                }
            }
        }
    }
    None
}

fn number_field(node: &Value, key: &str) -> Option<f64> {
    match node.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Html {
        Html::parse_document(&format!(
            "<html><head><script type=\"application/ld+json\">{}</script></head><body></body></html>",
            json
        ))
    }

    #[test]
    fn test_single_event_node() {
        let html = doc(
            r#"{"@type":"Event","name":"Voorjaarsconcert","startDate":"2026-04-12T20:00:00+02:00",
               "location":{"@type":"Place","name":"Paradiso","geo":{"latitude":52.3622,"longitude":4.8832}}}"#,
        );
        let cards = extract(&html, "https://www.paradiso.nl/agenda");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Voorjaarsconcert");
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-04-12T20:00:00+02:00"));
        assert_eq!(cards[0].location_text.as_deref(), Some("Paradiso"));
        assert_eq!(cards[0].method, ParsingMethod::JsonLd);

        assert_eq!(geo_coordinates(&html), Some((52.3622, 4.8832)));
    }

    #[test]
    fn test_graph_with_multiple_events() {
        let html = doc(
            r#"{"@graph":[
                {"@type":"MusicEvent","name":"Concert A","startDate":"2026-05-01","url":"/a"},
                {"@type":"Event","name":"Markt","startDate":"2026-05-02"},
                {"@type":"WebSite","name":"Site"}
            ]}"#,
        );
        let cards = extract(&html, "https://example.nl/agenda");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].detail_url.as_deref(), Some("https://example.nl/a"));
        assert_eq!(cards[0].category_hint.as_deref(), Some("Music"));
    }

    #[test]
    fn test_incomplete_nodes_skipped() {
        let html = doc(r#"{"@type":"Event","name":"Naamloos"}"#);
        assert!(extract(&html, "https://example.nl").is_empty());

        let html = doc(r#"{"@type":"Event","startDate":"2026-05-01"}"#);
        assert!(extract(&html, "https://example.nl").is_empty());
    }

    #[test]
    fn test_deeply_nested_graph_terminates() {
        // Graphs nested past the depth bound must terminate and yield the
        // shallow nodes only.
        let mut inner = r#"{"@type":"Event","name":"Deep","startDate":"2026-05-01"}"#.to_string();
        for _ in 0..20 {
            inner = format!(r#"{{"@graph":[{}]}}"#, inner);
        }
        let html = doc(&inner);
        // Must not hang; the deep node is beyond the bound and dropped.
        assert!(extract(&html, "https://example.nl").is_empty());
    }

    #[test]
    fn test_string_geo_values() {
        let html = doc(
            r#"{"@type":"Event","name":"X","startDate":"2026-05-01",
               "location":{"geo":{"latitude":"52.1","longitude":"4.5"}}}"#,
        );
        assert_eq!(geo_coordinates(&html), Some((52.1, 4.5)));
    }

    #[test]
    fn test_type_arrays_and_image_object() {
        let html = doc(
            r#"{"@type":["Thing","TheaterEvent"],"name":"Toneel","startDate":"2026-06-01",
               "image":{"@type":"ImageObject","url":"https://cdn.example.nl/img.jpg"}}"#,
        );
        let cards = extract(&html, "https://example.nl");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].image_url.as_deref(), Some("https://cdn.example.nl/img.jpg"));
        assert_eq!(cards[0].category_hint.as_deref(), Some("Theater"));
    }
}
