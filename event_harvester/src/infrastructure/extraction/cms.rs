// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # CMS Fingerprinter
//!
//! Inspects the generator meta tag, asset paths, and class-name patterns
//! to label the site's CMS and recommend a strategy order for the
//! waterfall. A recommendation only *re-orders* the deterministic
//! strategies; nothing is ever skipped, and the AI fallback stays last.

use scraper::{Html, Selector};

use event_harvester_domain::value_objects::ParsingMethod;

/// A recognized content-management system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmsLabel {
    Wordpress,
    Squarespace,
    Wix,
    Drupal,
    Joomla,
    Shopify,
    NextJs,
    Unknown,
}

impl CmsLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmsLabel::Wordpress => "wordpress",
            CmsLabel::Squarespace => "squarespace",
            CmsLabel::Wix => "wix",
            CmsLabel::Drupal => "drupal",
            CmsLabel::Joomla => "joomla",
            CmsLabel::Shopify => "shopify",
            CmsLabel::NextJs => "nextjs",
            CmsLabel::Unknown => "unknown",
        }
    }

    /// Recommended evaluation order for the deterministic strategies.
    ///
    /// WordPress sites almost always expose a working feed; Squarespace
    /// and Wix embed JSON-LD; Next.js sites carry their state in the
    /// hydration blob.
    pub fn recommended_order(&self) -> Vec<ParsingMethod> {
        match self {
            CmsLabel::Wordpress | CmsLabel::Joomla | CmsLabel::Drupal => vec![
                ParsingMethod::Recipe,
                ParsingMethod::Feed,
                ParsingMethod::JsonLd,
                ParsingMethod::Microdata,
                ParsingMethod::Hydration,
                ParsingMethod::Dom,
            ],
            CmsLabel::Squarespace | CmsLabel::Wix | CmsLabel::Shopify => vec![
                ParsingMethod::Recipe,
                ParsingMethod::JsonLd,
                ParsingMethod::Hydration,
                ParsingMethod::Microdata,
                ParsingMethod::Feed,
                ParsingMethod::Dom,
            ],
            CmsLabel::NextJs => vec![
                ParsingMethod::Recipe,
                ParsingMethod::Hydration,
                ParsingMethod::JsonLd,
                ParsingMethod::Microdata,
                ParsingMethod::Feed,
                ParsingMethod::Dom,
            ],
            CmsLabel::Unknown => vec![
                ParsingMethod::Recipe,
                ParsingMethod::JsonLd,
                ParsingMethod::Microdata,
                ParsingMethod::Hydration,
                ParsingMethod::Feed,
                ParsingMethod::Dom,
            ],
        }
    }
}

/// Fingerprints a document.
pub fn fingerprint(html: &Html, raw_html: &str) -> CmsLabel {
    if let Some(generator) = generator_meta(html) {
        let generator = generator.to_lowercase();
        if generator.contains("wordpress") {
            return CmsLabel::Wordpress;
        }
        if generator.contains("squarespace") {
            return CmsLabel::Squarespace;
        }
        if generator.contains("wix") {
            return CmsLabel::Wix;
        }
        if generator.contains("drupal") {
            return CmsLabel::Drupal;
        }
        if generator.contains("joomla") {
            return CmsLabel::Joomla;
        }
        if generator.contains("shopify") {
            return CmsLabel::Shopify;
        }
    }

    // Asset-path and markup patterns.
    if raw_html.contains("/wp-content/") || raw_html.contains("/wp-includes/") {
        return CmsLabel::Wordpress;
    }
    if raw_html.contains("static1.squarespace.com") || raw_html.contains("sqs-block") {
        return CmsLabel::Squarespace;
    }
    if raw_html.contains("wixstatic.com") || raw_html.contains("wix-warmup-data") {
        return CmsLabel::Wix;
    }
    if raw_html.contains("/sites/default/files/") || raw_html.contains("drupal-settings-json") {
        return CmsLabel::Drupal;
    }
    if raw_html.contains("cdn.shopify.com") {
        return CmsLabel::Shopify;
    }
    if raw_html.contains("__NEXT_DATA__") || raw_html.contains("/_next/static/") {
        return CmsLabel::NextJs;
    }

    CmsLabel::Unknown
}

fn generator_meta(html: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name=\"generator\"]").expect("static selector");
    html.select(&selector)
        .next()
        .and_then(|e| e.value().attr("content"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_meta_wins() {
        let html = Html::parse_document(
            r#"<head><meta name="generator" content="WordPress 6.4" /></head>"#,
        );
        assert_eq!(fingerprint(&html, ""), CmsLabel::Wordpress);
    }

    #[test]
    fn test_asset_path_fingerprints() {
        let raw = r#"<link href="https://example.nl/wp-content/themes/x/style.css">"#;
        assert_eq!(fingerprint(&Html::parse_document(raw), raw), CmsLabel::Wordpress);

        let raw = r#"<script src="https://example.nl/_next/static/chunks/main.js"></script>"#;
        assert_eq!(fingerprint(&Html::parse_document(raw), raw), CmsLabel::NextJs);

        let raw = r#"<img src="https://static1.squarespace.com/x.jpg">"#;
        assert_eq!(fingerprint(&Html::parse_document(raw), raw), CmsLabel::Squarespace);
    }

    #[test]
    fn test_unknown_fingerprint() {
        let raw = "<html><body>plain site</body></html>";
        assert_eq!(fingerprint(&Html::parse_document(raw), raw), CmsLabel::Unknown);
    }

    #[test]
    fn test_recommendations_reorder_never_skip() {
        use std::collections::BTreeSet;
        let baseline: BTreeSet<&str> = CmsLabel::Unknown
            .recommended_order()
            .iter()
            .map(|m| m.as_str())
            .collect();
        for label in [
            CmsLabel::Wordpress,
            CmsLabel::Squarespace,
            CmsLabel::Wix,
            CmsLabel::Drupal,
            CmsLabel::Joomla,
            CmsLabel::Shopify,
            CmsLabel::NextJs,
        ] {
            let order: BTreeSet<&str> = label.recommended_order().iter().map(|m| m.as_str()).collect();
            assert_eq!(order, baseline, "{:?} must reorder, not skip", label);
        }
    }

    #[test]
    fn test_wordpress_prefers_feed() {
        let order = CmsLabel::Wordpress.recommended_order();
        let feed_pos = order.iter().position(|m| *m == ParsingMethod::Feed).unwrap();
        let dom_pos = order.iter().position(|m| *m == ParsingMethod::Dom).unwrap();
        assert!(feed_pos < dom_pos);
        assert_eq!(order[0], ParsingMethod::Recipe);
    }
}
