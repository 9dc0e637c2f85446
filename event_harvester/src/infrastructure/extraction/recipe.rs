// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recipe-Driven Extraction
//!
//! The trusted fast path: a stored `ExtractionRecipe` names the container,
//! item, and field selectors for one site, so extraction is a direct
//! lookup instead of a guessing ladder. Recipes come from operators or
//! from the self-healing engine, which validates them before they land.

use scraper::{ElementRef, Html, Selector};

use event_harvester_domain::entities::ExtractionRecipe;
use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::extraction::support::{element_text, resolve_url, snippet};

/// Applies a recipe to a document.
pub fn extract(html: &Html, base_url: &str, recipe: &ExtractionRecipe) -> Vec<RawEventCard> {
    let Ok(container_selector) = Selector::parse(recipe.container_selector()) else {
        tracing::warn!(selector = recipe.container_selector(), "recipe container selector unparseable");
        return Vec::new();
    };
    let Ok(item_selector) = Selector::parse(recipe.item_selector()) else {
        tracing::warn!(selector = recipe.item_selector(), "recipe item selector unparseable");
        return Vec::new();
    };

    let mut cards = Vec::new();
    for container in html.select(&container_selector) {
        for item in container.select(&item_selector) {
            if let Some(card) = item_to_card(&item, base_url, recipe) {
                cards.push(card);
            }
        }
    }
    cards
}

/// Counts matches of an arbitrary item selector; the healing validator
/// compares old and proposed recipes with this.
pub fn count_item_matches(html: &Html, container: &str, item: &str) -> usize {
    let Ok(container_selector) = Selector::parse(container) else {
        return 0;
    };
    let Ok(item_selector) = Selector::parse(item) else {
        return 0;
    };
    html.select(&container_selector)
        .map(|c| c.select(&item_selector).count())
        .sum()
}

fn item_to_card(item: &ElementRef<'_>, base_url: &str, recipe: &ExtractionRecipe) -> Option<RawEventCard> {
    let title = select_text(item, Some(recipe.title_selector()))?;
    if title.is_empty() {
        return None;
    }

    let mut card = RawEventCard::new(title, ParsingMethod::Recipe);
    card.date_text = select_date(item, recipe.date_selector.as_deref());
    card.description = select_text(item, recipe.description_selector.as_deref());
    card.location_text = select_text(item, recipe.location_selector.as_deref());
    card.detail_url = select_attr(item, recipe.link_selector.as_deref(), &["href"])
        .and_then(|href| resolve_url(base_url, &href));
    card.image_url = select_attr(item, recipe.image_selector.as_deref(), &["src", "data-src", "content"])
        .and_then(|src| resolve_url(base_url, &src));
    if let Some(time_selector) = recipe.time_selector.as_deref() {
        // Time text folds into the date text so the normalizer's time
        // ladder sees it.
        if let Some(time) = select_text(item, Some(time_selector)) {
            let combined = match &card.date_text {
                Some(date) => format!("{} {}", date, time),
                None => time,
            };
            card.date_text = Some(combined);
        }
    }
    card.raw_html = Some(snippet(item));
    Some(card)
}

fn select_text(item: &ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let parsed = Selector::parse(selector?).ok()?;
    let found = item.select(&parsed).next()?;
    let text = element_text(&found);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn select_date(item: &ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let parsed = Selector::parse(selector?).ok()?;
    let found = item.select(&parsed).next()?;
    if let Some(datetime) = found.value().attr("datetime") {
        if !datetime.trim().is_empty() {
            return Some(datetime.trim().to_string());
        }
    }
    let text = element_text(&found);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn select_attr(item: &ElementRef<'_>, selector: Option<&str>, attrs: &[&str]) -> Option<String> {
    let parsed = Selector::parse(selector?).ok()?;
    let found = item.select(&parsed).next()?;
    for attr in attrs {
        if let Some(value) = found.value().attr(attr) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> ExtractionRecipe {
        let mut recipe = ExtractionRecipe::new(".agenda", "article.show", "h2").unwrap();
        recipe.date_selector = Some("time".into());
        recipe.link_selector = Some("a.more".into());
        recipe.location_selector = Some(".zaal".into());
        recipe.time_selector = Some(".aanvang".into());
        recipe
    }

    const PAGE: &str = r#"
        <div class="agenda">
          <article class="show">
            <h2>Voorjaarsconcert</h2>
            <time datetime="2026-04-12">12 april</time>
            <span class="zaal">Grote Zaal</span>
            <span class="aanvang">aanvang 20:00</span>
            <a class="more" href="/shows/voorjaarsconcert">info</a>
          </article>
          <article class="show">
            <h2>Jazznacht</h2>
            <time>9 mei 2026</time>
          </article>
        </div>"#;

    #[test]
    fn test_recipe_extraction() {
        let html = Html::parse_document(PAGE);
        let cards = extract(&html, "https://example.nl", &recipe());
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, "Voorjaarsconcert");
        assert_eq!(cards[0].date_text.as_deref(), Some("2026-04-12 aanvang 20:00"));
        assert_eq!(cards[0].location_text.as_deref(), Some("Grote Zaal"));
        assert_eq!(cards[0].detail_url.as_deref(), Some("https://example.nl/shows/voorjaarsconcert"));
        assert_eq!(cards[0].method, ParsingMethod::Recipe);
    }

    #[test]
    fn test_count_item_matches() {
        let html = Html::parse_document(PAGE);
        assert_eq!(count_item_matches(&html, ".agenda", "article.show"), 2);
        assert_eq!(count_item_matches(&html, ".agenda", ".does-not-exist"), 0);
        assert_eq!(count_item_matches(&html, "[[[", "article"), 0);
    }

    #[test]
    fn test_recipe_misses_cleanly() {
        let html = Html::parse_document("<div class='other'><p>niets</p></div>");
        assert!(extract(&html, "https://example.nl", &recipe()).is_empty());
    }
}
