// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared helpers for extraction strategies: URL resolution, element text,
//! and card-snippet capping.

use scraper::ElementRef;
use url::Url;

/// Cap on the raw HTML snippet stored per card.
pub const SNIPPET_MAX_BYTES: usize = 4 * 1024;

/// Resolves a possibly relative href against the page base. Returns `None`
/// for javascript:, mailto:, fragments, and unparseable values.
pub fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let base = Url::parse(base_url).ok()?;
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// Visible text of an element, whitespace-collapsed.
pub fn element_text(element: &ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The element's own HTML, capped for storage as a card snippet.
pub fn snippet(element: &ElementRef<'_>) -> String {
    let mut html = element.html();
    if html.len() > SNIPPET_MAX_BYTES {
        let mut cut = SNIPPET_MAX_BYTES;
        while cut > 0 && !html.is_char_boundary(cut) {
            cut -= 1;
        }
        html.truncate(cut);
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_resolve_url() {
        let base = "https://example.nl/agenda/";
        assert_eq!(
            resolve_url(base, "/event/1").as_deref(),
            Some("https://example.nl/event/1")
        );
        assert_eq!(
            resolve_url(base, "detail?id=2").as_deref(),
            Some("https://example.nl/agenda/detail?id=2")
        );
        assert_eq!(
            resolve_url(base, "https://other.nl/x").as_deref(),
            Some("https://other.nl/x")
        );
        assert!(resolve_url(base, "#top").is_none());
        assert!(resolve_url(base, "javascript:void(0)").is_none());
        assert!(resolve_url(base, "mailto:info@example.nl").is_none());
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let html = Html::parse_fragment("<div>  Pride \n  <b>Walk</b>  </div>");
        let selector = Selector::parse("div").unwrap();
        let element = html.select(&selector).next().unwrap();
        assert_eq!(element_text(&element), "Pride Walk");
    }

    #[test]
    fn test_snippet_capped() {
        let big = format!("<div>{}</div>", "x".repeat(SNIPPET_MAX_BYTES * 2));
        let html = Html::parse_fragment(&big);
        let selector = Selector::parse("div").unwrap();
        let element = html.select(&selector).next().unwrap();
        assert!(snippet(&element).len() <= SNIPPET_MAX_BYTES);
    }
}
