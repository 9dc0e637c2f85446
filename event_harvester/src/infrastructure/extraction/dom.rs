// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DOM Selector Extraction
//!
//! Scrapes event cards with CSS selectors: any source-configured selectors
//! first, then the built-in generic set that covers the common event-site
//! markup conventions. Cards produced here are `Dom`-trusted - usable, but
//! candidates for AI polish downstream.

use scraper::{ElementRef, Html, Selector};

use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::extraction::support::{element_text, resolve_url, snippet};

/// Built-in generic card selectors, most specific first.
const GENERIC_ITEM_SELECTORS: &[&str] = &[
    "article.event",
    ".event-card",
    ".event-item",
    ".agenda-item",
    ".agenda__item",
    "[itemtype*=\"Event\"]",
    "li.event",
    ".evenement",
    ".activiteit",
];

/// Title candidates within a card.
const TITLE_SELECTORS: &[&str] = &["h1", "h2", "h3", "h4", ".title", ".event-title", "a"];

/// Date-ish nodes within a card.
const DATE_SELECTORS: &[&str] = &["time", ".date", ".event-date", ".datum", ".agenda-date"];

/// Location-ish nodes within a card.
const LOCATION_SELECTORS: &[&str] = &[".location", ".venue", ".locatie", ".place", "address"];

/// Description candidates within a card.
const DESCRIPTION_SELECTORS: &[&str] = &[".description", ".excerpt", ".summary", ".intro", "p"];

/// Extracts cards using configured selectors first, then the generic set.
pub fn extract(html: &Html, base_url: &str, configured_selectors: &[String]) -> Vec<RawEventCard> {
    for selector in configured_selectors {
        let cards = extract_with_selector(html, base_url, selector);
        if !cards.is_empty() {
            return cards;
        }
    }
    for selector in GENERIC_ITEM_SELECTORS {
        let cards = extract_with_selector(html, base_url, selector);
        if !cards.is_empty() {
            return cards;
        }
    }
    Vec::new()
}

fn extract_with_selector(html: &Html, base_url: &str, item_selector: &str) -> Vec<RawEventCard> {
    let Ok(selector) = Selector::parse(item_selector) else {
        tracing::debug!(selector = item_selector, "unparseable item selector");
        return Vec::new();
    };

    let mut cards = Vec::new();
    for element in html.select(&selector) {
        if let Some(card) = element_to_card(&element, base_url) {
            cards.push(card);
        }
    }
    cards
}

fn element_to_card(element: &ElementRef<'_>, base_url: &str) -> Option<RawEventCard> {
    let title = first_text(element, TITLE_SELECTORS)?;
    if title.is_empty() {
        return None;
    }

    let mut card = RawEventCard::new(title, ParsingMethod::Dom);
    card.date_text = date_text(element);
    card.location_text = first_text(element, LOCATION_SELECTORS);
    card.description = first_text(element, DESCRIPTION_SELECTORS);
    card.detail_url = first_href(element).and_then(|href| resolve_url(base_url, &href));
    card.image_url = first_image(element).and_then(|src| resolve_url(base_url, &src));
    card.raw_html = Some(snippet(element));

    // Without any date material the card can still be viable through its
    // detail link; the normalizer has the final say.
    Some(card)
}

fn first_text(element: &ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(found) = element.select(&parsed).next() {
            let text = element_text(&found);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Prefers a machine-readable `datetime` attribute over node text.
fn date_text(element: &ElementRef<'_>) -> Option<String> {
    for selector in DATE_SELECTORS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(found) = element.select(&parsed).next() {
            if let Some(datetime) = found.value().attr("datetime") {
                if !datetime.trim().is_empty() {
                    return Some(datetime.trim().to_string());
                }
            }
            let text = element_text(&found);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn first_href(element: &ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("a[href]").expect("static selector");
    element
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(String::from)
}

fn first_image(element: &ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("img[src], img[data-src]").expect("static selector");
    element.select(&selector).next().and_then(|img| {
        img.value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(String::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <main>
          <article class="event">
            <h3>Voorjaarsconcert</h3>
            <time datetime="2026-04-12">za 12 april</time>
            <span class="venue">Paradiso</span>
            <a href="/agenda/voorjaarsconcert">meer</a>
            <img src="/img/flyer.jpg" />
          </article>
          <article class="event">
            <h3>Pride Walk</h3>
            <div class="date">1 augustus 2026</div>
          </article>
        </main>"#;

    #[test]
    fn test_generic_selectors() {
        let html = Html::parse_document(LISTING);
        let cards = extract(&html, "https://example.nl", &[]);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, "Voorjaarsconcert");
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-04-12"));
        assert_eq!(cards[0].location_text.as_deref(), Some("Paradiso"));
        assert_eq!(
            cards[0].detail_url.as_deref(),
            Some("https://example.nl/agenda/voorjaarsconcert")
        );
        assert_eq!(cards[0].image_url.as_deref(), Some("https://example.nl/img/flyer.jpg"));
        assert_eq!(cards[1].date_text.as_deref(), Some("1 augustus 2026"));
        assert_eq!(cards[0].method, ParsingMethod::Dom);
    }

    #[test]
    fn test_configured_selector_takes_priority() {
        let html = Html::parse_document(
            r#"<div class="mijn-agenda-blok"><h2>Stadsdiner</h2><time>2026-09-01</time></div>"#,
        );
        let cards = extract(&html, "https://example.nl", &[".mijn-agenda-blok".to_string()]);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Stadsdiner");
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let html = Html::parse_document("<html><body><p>niets</p></body></html>");
        assert!(extract(&html, "https://example.nl", &[]).is_empty());
    }

    #[test]
    fn test_bad_configured_selector_falls_through() {
        let html = Html::parse_document(LISTING);
        let cards = extract(&html, "https://example.nl", &["[[[nope".to_string()]);
        assert_eq!(cards.len(), 2);
    }
}
