// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTML Coordinate Extraction
//!
//! First rung of the hybrid geocoder: most venue pages already carry their
//! coordinates. Probed, in order: JSON-LD `Event.location.geo`, microdata
//! latitude/longitude itemprops, Open Graph `place:location:*`, the ICBM
//! meta, and embedded map URLs in their common shapes
//! (`@lat,lng`, `!3d…!4d…`, `ll=lat,lng`, OSM `#map=zoom/lat/lng`).
//!
//! All candidates pass `Coordinates::new`, which enforces the valid ranges
//! and rejects `(0, 0)`.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use event_harvester_domain::value_objects::Coordinates;

use crate::infrastructure::extraction::json_ld;

static AT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(-?\d{1,2}\.\d+),(-?\d{1,3}\.\d+)").expect("static regex"));
static BANG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!3d(-?\d{1,2}\.\d+)!4d(-?\d{1,3}\.\d+)").expect("static regex"));
static LL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]ll=(-?\d{1,2}\.\d+),(-?\d{1,3}\.\d+)").expect("static regex"));
static OSM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#map=\d+/(-?\d{1,2}\.\d+)/(-?\d{1,3}\.\d+)").expect("static regex"));

/// Extracts usable coordinates from a page, or `None`.
pub fn extract(html: &Html, raw_html: &str) -> Option<Coordinates> {
    // JSON-LD geo.
    if let Some((lat, lng)) = json_ld::geo_coordinates(html) {
        if let Ok(coordinates) = Coordinates::new(lat, lng) {
            return Some(coordinates);
        }
    }

    // Microdata itemprops.
    if let (Some(lat), Some(lng)) = (
        itemprop_number(html, "latitude"),
        itemprop_number(html, "longitude"),
    ) {
        if let Ok(coordinates) = Coordinates::new(lat, lng) {
            return Some(coordinates);
        }
    }

    // Open Graph place tags.
    if let (Some(lat), Some(lng)) = (
        meta_number(html, "meta[property=\"place:location:latitude\"]"),
        meta_number(html, "meta[property=\"place:location:longitude\"]"),
    ) {
        if let Ok(coordinates) = Coordinates::new(lat, lng) {
            return Some(coordinates);
        }
    }

    // ICBM meta: "52.3622, 4.8832".
    if let Some(content) = meta_content(html, "meta[name=\"ICBM\"]") {
        let mut parts = content.split(',').map(|p| p.trim().parse::<f64>());
        if let (Some(Ok(lat)), Some(Ok(lng))) = (parts.next(), parts.next()) {
            if let Ok(coordinates) = Coordinates::new(lat, lng) {
                return Some(coordinates);
            }
        }
    }

    // Embedded map URLs anywhere in the page.
    for re in [&*AT_RE, &*BANG_RE, &*LL_RE, &*OSM_RE] {
        for caps in re.captures_iter(raw_html) {
            let (Ok(lat), Ok(lng)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
                continue;
            };
            if let Ok(coordinates) = Coordinates::new(lat, lng) {
                return Some(coordinates);
            }
        }
    }

    None
}

fn itemprop_number(html: &Html, prop: &str) -> Option<f64> {
    let selector = Selector::parse(&format!("[itemprop=\"{}\"]", prop)).ok()?;
    let element = html.select(&selector).next()?;
    let value = element
        .value()
        .attr("content")
        .map(String::from)
        .unwrap_or_else(|| element.text().collect::<String>());
    value.trim().parse().ok()
}

fn meta_number(html: &Html, selector: &str) -> Option<f64> {
    meta_content(html, selector)?.trim().parse().ok()
}

fn meta_content(html: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    html.select(&selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> (Html, String) {
        (Html::parse_document(raw), raw.to_string())
    }

    #[test]
    fn test_json_ld_geo() {
        let (html, raw) = parse(
            r#"<script type="application/ld+json">
               {"@type":"Event","name":"X","startDate":"2026-04-12",
                "location":{"geo":{"latitude":52.3622,"longitude":4.8832}}}
               </script>"#,
        );
        let c = extract(&html, &raw).unwrap();
        assert!(c.approx_eq(&Coordinates::new(52.3622, 4.8832).unwrap()));
    }

    #[test]
    fn test_microdata_itemprops() {
        let (html, raw) = parse(
            r#"<div itemscope><meta itemprop="latitude" content="52.09" />
               <meta itemprop="longitude" content="5.12" /></div>"#,
        );
        assert!(extract(&html, &raw).is_some());
    }

    #[test]
    fn test_og_place_tags() {
        let (html, raw) = parse(
            r#"<meta property="place:location:latitude" content="51.92" />
               <meta property="place:location:longitude" content="4.48" />"#,
        );
        assert!(extract(&html, &raw).is_some());
    }

    #[test]
    fn test_icbm() {
        let (html, raw) = parse(r#"<meta name="ICBM" content="52.37, 4.89" />"#);
        assert!(extract(&html, &raw).is_some());
    }

    #[test]
    fn test_map_url_shapes() {
        for url in [
            "https://www.google.com/maps/place/Paradiso/@52.3622,4.8832,17z",
            "https://maps.google.com/maps?q=x&!3d52.3622!4d4.8832",
            "https://maps.example.com/?ll=52.3622,4.8832",
            "https://www.openstreetmap.org/#map=17/52.3622/4.8832",
        ] {
            let raw = format!("<a href=\"{}\">kaart</a>", url);
            let html = Html::parse_document(&raw);
            assert!(extract(&html, &raw).is_some(), "failed for {}", url);
        }
    }

    #[test]
    fn test_null_island_rejected() {
        let (html, raw) = parse(r#"<meta name="ICBM" content="0, 0" />"#);
        assert!(extract(&html, &raw).is_none());
    }

    #[test]
    fn test_no_coordinates() {
        let (html, raw) = parse("<html><body><p>geen kaart</p></body></html>");
        assert!(extract(&html, &raw).is_none());
    }
}
