// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Microdata / Open Graph Extraction
//!
//! Fallback structured data: schema.org microdata (`itemscope` with an
//! Event itemtype) first, then Open Graph / meta tags, which can describe
//! at most one event per page.

use scraper::{ElementRef, Html, Selector};

use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::extraction::support::{element_text, resolve_url, snippet};

/// Extracts cards from microdata scopes, then OG/meta as a last resort.
pub fn extract(html: &Html, base_url: &str) -> Vec<RawEventCard> {
    let cards = extract_microdata(html, base_url);
    if !cards.is_empty() {
        return cards;
    }
    extract_open_graph(html, base_url).into_iter().collect()
}

fn extract_microdata(html: &Html, base_url: &str) -> Vec<RawEventCard> {
    let scope_selector =
        Selector::parse("[itemscope][itemtype*=\"Event\"]").expect("static selector");

    let mut cards = Vec::new();
    for scope in html.select(&scope_selector) {
        let Some(name) = itemprop_value(&scope, "name") else {
            continue;
        };
        let Some(start_date) = itemprop_value(&scope, "startDate") else {
            continue;
        };

        let mut card = RawEventCard::new(name, ParsingMethod::Microdata);
        card.date_text = Some(start_date);
        card.description = itemprop_value(&scope, "description");
        card.location_text = itemprop_value(&scope, "location");
        card.detail_url = itemprop_attr(&scope, "url", "href")
            .or_else(|| itemprop_value(&scope, "url"))
            .and_then(|u| resolve_url(base_url, &u));
        card.image_url = itemprop_attr(&scope, "image", "src")
            .or_else(|| itemprop_attr(&scope, "image", "content"))
            .and_then(|u| resolve_url(base_url, &u));
        card.raw_html = Some(snippet(&scope));
        cards.push(card);
    }
    cards
}

/// One card from Open Graph tags, when the page itself is an event page.
fn extract_open_graph(html: &Html, base_url: &str) -> Option<RawEventCard> {
    let og_type = meta_content(html, "meta[property=\"og:type\"]")?;
    if !og_type.contains("event") {
        return None;
    }
    let title = meta_content(html, "meta[property=\"og:title\"]")?;

    // Event meta date conventions vary; probe the common ones.
    let date = meta_content(html, "meta[property=\"event:start_time\"]")
        .or_else(|| meta_content(html, "meta[property=\"og:start_time\"]"))
        .or_else(|| meta_content(html, "meta[itemprop=\"startDate\"]"))?;

    let mut card = RawEventCard::new(title, ParsingMethod::Microdata);
    card.date_text = Some(date);
    card.description = meta_content(html, "meta[property=\"og:description\"]");
    card.image_url =
        meta_content(html, "meta[property=\"og:image\"]").and_then(|u| resolve_url(base_url, &u));
    card.detail_url =
        meta_content(html, "meta[property=\"og:url\"]").and_then(|u| resolve_url(base_url, &u));
    Some(card)
}

/// Resolves an itemprop within a scope: content attribute, datetime
/// attribute, or element text, in that order.
fn itemprop_value(scope: &ElementRef<'_>, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[itemprop=\"{}\"]", prop)).ok()?;
    let element = scope.select(&selector).next()?;
    for attr in ["content", "datetime"] {
        if let Some(value) = element.value().attr(attr) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    let text = element_text(&element);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn itemprop_attr(scope: &ElementRef<'_>, prop: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[itemprop=\"{}\"]", prop)).ok()?;
    scope
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn meta_content(html: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    html.select(&selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microdata_scope() {
        let html = Html::parse_document(
            r#"<div itemscope itemtype="https://schema.org/MusicEvent">
                 <h3 itemprop="name">Jazznacht</h3>
                 <time itemprop="startDate" datetime="2026-05-09T21:00">za 9 mei</time>
                 <span itemprop="location">Bimhuis, Amsterdam</span>
                 <a itemprop="url" href="/agenda/jazznacht">meer</a>
               </div>"#,
        );
        let cards = extract(&html, "https://bimhuis.nl");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Jazznacht");
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-05-09T21:00"));
        assert_eq!(cards[0].location_text.as_deref(), Some("Bimhuis, Amsterdam"));
        assert_eq!(cards[0].detail_url.as_deref(), Some("https://bimhuis.nl/agenda/jazznacht"));
        assert_eq!(cards[0].method, ParsingMethod::Microdata);
    }

    #[test]
    fn test_scope_without_date_skipped() {
        let html = Html::parse_document(
            r#"<div itemscope itemtype="https://schema.org/Event">
                 <span itemprop="name">Naamloos</span>
               </div>"#,
        );
        assert!(extract(&html, "https://example.nl").is_empty());
    }

    #[test]
    fn test_open_graph_fallback() {
        let html = Html::parse_document(
            r#"<head>
                 <meta property="og:type" content="event" />
                 <meta property="og:title" content="Stadsfestival" />
                 <meta property="event:start_time" content="2026-06-20" />
                 <meta property="og:image" content="https://cdn.example.nl/festival.jpg" />
               </head>"#,
        );
        let cards = extract(&html, "https://example.nl");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Stadsfestival");
        assert_eq!(cards[0].image_url.as_deref(), Some("https://cdn.example.nl/festival.jpg"));
    }

    #[test]
    fn test_non_event_og_ignored() {
        let html = Html::parse_document(
            r#"<head>
                 <meta property="og:type" content="article" />
                 <meta property="og:title" content="Nieuwsbericht" />
               </head>"#,
        );
        assert!(extract(&html, "https://example.nl").is_empty());
    }
}
