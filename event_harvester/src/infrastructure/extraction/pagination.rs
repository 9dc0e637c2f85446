// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pagination Discovery
//!
//! After extraction, the page is probed for a next-page link: `rel=next`
//! first, then pagination-class containers, then anchors whose text is a
//! localized "next" word. The extract stage enqueues the discovered URL as
//! a new queue item of the same source, bounded by the configured
//! recursion depth (depth-first within a source run).

use scraper::{Html, Selector};

use crate::infrastructure::extraction::support::{element_text, resolve_url};

/// Localized "next" link texts.
const NEXT_WORDS: &[&str] = &[
    "volgende", "volgende pagina", "next", "next page", "weiter", "nächste", "meer", "more", "»", "›",
];

/// Pagination containers probed for a current+1 link.
const PAGINATION_SELECTORS: &[&str] = &[
    ".pagination a",
    ".pager a",
    ".paginering a",
    "nav[aria-label*=\"pag\"] a",
    "a.next",
    "a[rel=\"next\"]",
];

/// Finds the next-page URL, if the page advertises one.
pub fn next_page_url(html: &Html, base_url: &str) -> Option<String> {
    // rel=next is authoritative when present (head link or anchor).
    let rel_next = Selector::parse("link[rel=\"next\"], a[rel=\"next\"]").expect("static selector");
    for element in html.select(&rel_next) {
        if let Some(href) = element.value().attr("href") {
            if let Some(url) = resolve_url(base_url, href) {
                if url != base_url {
                    return Some(url);
                }
            }
        }
    }

    // Pagination containers.
    for selector in PAGINATION_SELECTORS {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for anchor in html.select(&parsed) {
            let text = element_text(&anchor).to_lowercase();
            if NEXT_WORDS.iter().any(|w| text == *w || text.starts_with(&format!("{} ", w))) {
                if let Some(href) = anchor.value().attr("href") {
                    if let Some(url) = resolve_url(base_url, href) {
                        if url != base_url {
                            return Some(url);
                        }
                    }
                }
            }
        }
    }

    // Any anchor with a localized "next" text.
    let anchors = Selector::parse("a[href]").expect("static selector");
    for anchor in html.select(&anchors) {
        let text = element_text(&anchor).to_lowercase();
        if NEXT_WORDS.contains(&text.as_str()) {
            if let Some(href) = anchor.value().attr("href") {
                if let Some(url) = resolve_url(base_url, href) {
                    if url != base_url {
                        return Some(url);
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_next_link() {
        let html = Html::parse_document(
            r#"<head><link rel="next" href="/agenda?page=2" /></head>"#,
        );
        assert_eq!(
            next_page_url(&html, "https://example.nl/agenda").as_deref(),
            Some("https://example.nl/agenda?page=2")
        );
    }

    #[test]
    fn test_pagination_class() {
        let html = Html::parse_document(
            r#"<div class="pagination"><a href="?page=1">1</a><a href="?page=2">volgende</a></div>"#,
        );
        assert_eq!(
            next_page_url(&html, "https://example.nl/agenda").as_deref(),
            Some("https://example.nl/agenda?page=2")
        );
    }

    #[test]
    fn test_localized_next_text() {
        let html = Html::parse_document(r#"<a href="/agenda/p/2">Volgende</a>"#);
        assert_eq!(
            next_page_url(&html, "https://example.nl/agenda").as_deref(),
            Some("https://example.nl/agenda/p/2")
        );

        let html = Html::parse_document(r#"<a href="/agenda/p/2">Weiter</a>"#);
        assert!(next_page_url(&html, "https://example.nl/agenda").is_some());
    }

    #[test]
    fn test_no_pagination() {
        let html = Html::parse_document(r#"<a href="/contact">Contact</a>"#);
        assert!(next_page_url(&html, "https://example.nl/agenda").is_none());
    }

    #[test]
    fn test_self_link_ignored() {
        let html = Html::parse_document(
            r#"<head><link rel="next" href="https://example.nl/agenda" /></head>"#,
        );
        assert!(next_page_url(&html, "https://example.nl/agenda").is_none());
    }
}
