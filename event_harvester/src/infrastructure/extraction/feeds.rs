// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Syndication Feed Extraction
//!
//! When `feed_discovery` is enabled for a source, the waterfall probes the
//! common feed locations (`/feed`, `/rss`, `/rss.xml`, `/atom.xml`,
//! `/events/feed`, plus any `<link rel="alternate">` advertised in the
//! page head) and parses RSS/Atom items into cards.
//!
//! The feed body is XML; items are located with lightweight regexes rather
//! than a full XML stack - feeds that matter here are flat item lists, and
//! malformed feeds should degrade to zero cards, not errors.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};
use event_harvester_domain::HarvestError;

use crate::infrastructure::extraction::support::resolve_url;

/// Paths probed relative to the site root.
const PROBE_PATHS: &[&str] = &["/feed", "/rss", "/rss.xml", "/atom.xml", "/feed.xml", "/events/feed"];

/// Cap on probed URLs per page, advertised links included.
const MAX_PROBES: usize = 6;

/// Seam for fetching candidate feed URLs; the extract stage wires this to
/// the fetch subsystem so feed probing obeys the same host rate limits.
#[async_trait]
pub trait FeedProber: Send + Sync {
    /// Returns the body for a candidate feed URL, or `None` for non-200 or
    /// non-feed responses.
    async fn probe(&self, url: &str) -> Result<Option<String>, HarvestError>;
}

static ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(item|entry)[\s>](.*?)</(?:item|entry)>").expect("static regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title[^>]*>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</title>").expect("static regex"));
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<link[^>]*?href="([^"]+)"|<link[^>]*>\s*(?:<!\[CDATA\[)?([^<\]]+)"#).expect("static regex")
});
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(pubDate|published|updated|dc:date)[^>]*>(.*?)</(?:pubDate|published|updated|dc:date)>")
        .expect("static regex")
});
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(description|summary|content)[^>]*>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</(?:description|summary|content)>")
        .expect("static regex")
});

/// Collects candidate feed URLs for a page: advertised alternates first,
/// then the well-known paths.
pub fn candidate_urls(html: &Html, base_url: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    let alternate = Selector::parse(
        "link[rel=\"alternate\"][type=\"application/rss+xml\"], \
         link[rel=\"alternate\"][type=\"application/atom+xml\"]",
    )
    .expect("static selector");
    for link in html.select(&alternate) {
        if let Some(href) = link.value().attr("href") {
            if let Some(url) = resolve_url(base_url, href) {
                candidates.push(url);
            }
        }
    }

    for path in PROBE_PATHS {
        if let Some(url) = resolve_url(base_url, path) {
            if !candidates.contains(&url) {
                candidates.push(url);
            }
        }
    }

    candidates.truncate(MAX_PROBES);
    candidates
}

/// Probes precomputed candidates in order and parses the first body that
/// yields items. Candidates come from `candidate_urls`, computed while the
/// parsed document is still in scope; this function itself never touches
/// the DOM, so the caller's future stays `Send`.
pub async fn probe_candidates(
    prober: &dyn FeedProber,
    candidates: &[String],
    base_url: &str,
) -> Result<Vec<RawEventCard>, HarvestError> {
    for url in candidates {
        match prober.probe(url).await {
            Ok(Some(body)) => {
                let cards = parse_feed(&body, base_url);
                if !cards.is_empty() {
                    return Ok(cards);
                }
            }
            Ok(None) => continue,
            // A dead probe URL is expected noise, not a stage failure.
            Err(e) => {
                tracing::debug!(%url, error = %e, "feed probe failed");
                continue;
            }
        }
    }
    Ok(Vec::new())
}

/// Parses RSS `<item>` / Atom `<entry>` blocks into cards.
pub fn parse_feed(body: &str, base_url: &str) -> Vec<RawEventCard> {
    let mut cards = Vec::new();
    for caps in ITEM_RE.captures_iter(body) {
        let item = &caps[2];
        let Some(title) = TITLE_RE
            .captures(item)
            .map(|c| strip_tags(c[1].trim()))
            .filter(|t| !t.is_empty())
        else {
            continue;
        };

        let mut card = RawEventCard::new(title, ParsingMethod::Feed);
        card.date_text = DATE_RE
            .captures(item)
            .map(|c| c[2].trim().to_string())
            .filter(|d| !d.is_empty());
        card.detail_url = LINK_RE
            .captures(item)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().trim().to_string())
            .and_then(|u| resolve_url(base_url, &u));
        card.description = DESCRIPTION_RE
            .captures(item)
            .map(|c| strip_tags(c[2].trim()))
            .filter(|d| !d.is_empty());
        card.raw_html = Some(item.chars().take(4096).collect());
        cards.push(card);
    }
    cards
}

/// Feed descriptions embed HTML; strip tags for the raw description text.
fn strip_tags(s: &str) -> String {
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
    TAG_RE.replace_all(s, " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
          <title>Agenda</title>
          <item>
            <title><![CDATA[Voorjaarsconcert]]></title>
            <link>https://example.nl/agenda/voorjaarsconcert</link>
            <pubDate>Sun, 12 Apr 2026 18:00:00 +0200</pubDate>
            <description><![CDATA[<p>Het orkest speelt Mahler.</p>]]></description>
          </item>
          <item>
            <title>Pride Walk</title>
            <link>https://example.nl/agenda/pride-walk</link>
          </item>
        </channel></rss>"#;

    #[test]
    fn test_parse_rss_items() {
        let cards = parse_feed(RSS, "https://example.nl");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, "Voorjaarsconcert");
        assert_eq!(cards[0].description.as_deref(), Some("Het orkest speelt Mahler."));
        assert_eq!(
            cards[0].detail_url.as_deref(),
            Some("https://example.nl/agenda/voorjaarsconcert")
        );
        assert_eq!(cards[0].method, ParsingMethod::Feed);
    }

    #[test]
    fn test_parse_atom_entries() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <title>Expo opening</title>
            <link href="https://example.nl/expo" />
            <published>2026-05-01T17:00:00Z</published>
            <summary>Nieuwe tentoonstelling</summary>
          </entry>
        </feed>"#;
        let cards = parse_feed(atom, "https://example.nl");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].detail_url.as_deref(), Some("https://example.nl/expo"));
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-05-01T17:00:00Z"));
    }

    #[test]
    fn test_malformed_feed_yields_nothing() {
        assert!(parse_feed("not xml at all", "https://example.nl").is_empty());
        assert!(parse_feed("<rss><item><title></title></item></rss>", "https://example.nl").is_empty());
    }

    #[test]
    fn test_candidate_urls_include_advertised_and_wellknown() {
        let html = Html::parse_document(
            r#"<head><link rel="alternate" type="application/rss+xml" href="/custom/feed.xml" /></head>"#,
        );
        let candidates = candidate_urls(&html, "https://example.nl/agenda");
        assert_eq!(candidates[0], "https://example.nl/custom/feed.xml");
        assert!(candidates.contains(&"https://example.nl/feed".to_string()));
        assert!(candidates.len() <= MAX_PROBES);
    }

    struct MapProber(std::collections::HashMap<String, String>);

    #[async_trait]
    impl FeedProber for MapProber {
        async fn probe(&self, url: &str) -> Result<Option<String>, HarvestError> {
            Ok(self.0.get(url).cloned())
        }
    }

    #[tokio::test]
    async fn test_probe_order_and_first_hit_wins() {
        let mut bodies = std::collections::HashMap::new();
        bodies.insert("https://example.nl/rss".to_string(), RSS.to_string());
        let prober = MapProber(bodies);

        let html = Html::parse_document("<html></html>");
        let candidates = candidate_urls(&html, "https://example.nl");
        let cards = probe_candidates(&prober, &candidates, "https://example.nl")
            .await
            .unwrap();
        assert_eq!(cards.len(), 2);
    }
}
