// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Card Normalizer
//!
//! Turns a `RawEventCard` into a `NormalizedEvent`: whitespace collapse,
//! date and time parsing, category classification, venue splitting, price
//! extraction, fingerprinting, quality scoring, and the probable-event
//! noise check. Pure and synchronous; all I/O happened upstream.

use chrono::NaiveDate;

use crate::entities::{NormalizedEvent, TIME_TBD};
use crate::error::HarvestError;
use crate::services::{category_classifier, date_parser::DateParser, noise_filter, price_parser, quality, time_parser};
use crate::value_objects::{content_hash, event_fingerprint, RawEventCard, SourceId};

/// Normalizer with a configured date window.
#[derive(Debug, Clone)]
pub struct Normalizer {
    date_parser: DateParser,
}

impl Normalizer {
    pub fn new(date_parser: DateParser) -> Self {
        Self { date_parser }
    }

    /// Default window: current year plus one.
    pub fn for_today(today: NaiveDate) -> Self {
        Self::new(DateParser::for_today(today))
    }

    /// Normalizes one card.
    ///
    /// # Errors
    ///
    /// `ValidationError` when the card fails the probable-event check or no
    /// usable date can be derived.
    pub fn normalize(
        &self,
        card: &RawEventCard,
        source_id: SourceId,
        today: NaiveDate,
    ) -> Result<NormalizedEvent, HarvestError> {
        let title = collapse_whitespace(&card.title);
        let description = card
            .description
            .as_deref()
            .map(collapse_whitespace)
            .filter(|d| !d.is_empty());

        if !noise_filter::is_probable_event(&title, description.as_deref()) {
            return Err(HarvestError::validation(format!(
                "'{}' does not look like a single event",
                title
            )));
        }

        let event_date = self.parse_date(card, today).ok_or_else(|| {
            HarvestError::validation(format!(
                "no usable date for '{}' (raw: {:?})",
                title, card.date_text
            ))
        })?;

        let event_time = self.extract_time(card, description.as_deref());
        let time_known = event_time != TIME_TBD;

        let category = category_classifier::classify(
            &title,
            description.as_deref(),
            card.category_hint.as_deref(),
        );

        let (venue_name, venue_address) = split_location(card.location_text.as_deref());

        let price_haystack = [
            description.as_deref().unwrap_or(""),
            card.raw_html.as_deref().unwrap_or(""),
        ]
        .join(" ");
        let price = price_parser::extract_price(&price_haystack);

        let date_string = event_date.to_string();
        let content_hash = content_hash(&title, &date_string);
        let fingerprint = event_fingerprint(&title, &date_string, source_id);

        let quality_score = quality::score(
            quality::QualitySignals {
                description: description.as_deref(),
                image_url: card.image_url.as_deref(),
                venue_name: venue_name.as_deref(),
                coordinates: None,
                event_date: Some(event_date),
            },
            today,
        );

        Ok(NormalizedEvent {
            source_id,
            title,
            description,
            category,
            event_date,
            event_time,
            time_known,
            venue_name,
            venue_address,
            image_url: card.image_url.clone(),
            tags: hint_tags(card.category_hint.as_deref()),
            persona_tags: vec![],
            price,
            organizer: None,
            performer: None,
            tickets_url: None,
            detail_url: card.detail_url.clone(),
            content_hash,
            fingerprint,
            quality_score,
            method: card.method,
        })
    }

    fn parse_date(&self, card: &RawEventCard, today: NaiveDate) -> Option<NaiveDate> {
        if let Some(date_text) = &card.date_text {
            if let Some(date) = self.date_parser.parse(date_text, today) {
                return Some(date);
            }
        }
        // Fall back to the card's own markup; dates often live in a sibling
        // node the strategy did not map to a field.
        if let Some(raw_html) = &card.raw_html {
            return self.date_parser.parse(raw_html, today);
        }
        None
    }

    fn extract_time(&self, card: &RawEventCard, description: Option<&str>) -> String {
        for haystack in [
            card.date_text.as_deref(),
            description,
            card.raw_html.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if let Some(time) = time_parser::extract_time(haystack) {
                return time;
            }
        }
        TIME_TBD.to_string()
    }
}

/// Collapses all whitespace runs to single spaces and trims.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits raw location text into venue and address at the first comma:
/// "Paradiso, Weteringschans 6-8, Amsterdam" → ("Paradiso",
/// "Weteringschans 6-8, Amsterdam").
fn split_location(location: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(location) = location.map(collapse_whitespace).filter(|l| !l.is_empty()) else {
        return (None, None);
    };
    match location.split_once(',') {
        Some((venue, address)) => (
            Some(venue.trim().to_string()),
            Some(address.trim().to_string()).filter(|a| !a.is_empty()),
        ),
        None => (Some(location), None),
    }
}

/// Turns a free-text category hint into lowercase tags.
fn hint_tags(hint: Option<&str>) -> Vec<String> {
    let Some(hint) = hint else {
        return vec![];
    };
    let mut tags: Vec<String> = hint
        .split(|c: char| c == ',' || c == '/' || c == '|')
        .map(|t| collapse_whitespace(t).to_lowercase())
        .filter(|t| !t.is_empty() && t.len() <= 40)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{Category, ParsingMethod};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn card() -> RawEventCard {
        RawEventCard {
            title: "  Voorjaarsconcert  \n ".into(),
            date_text: Some("za 12 april 2026".into()),
            location_text: Some("Paradiso, Weteringschans 6-8, Amsterdam".into()),
            description: Some("Het   orkest speelt  werken van Mahler. Aanvang 20:00.".into()),
            detail_url: Some("https://www.paradiso.nl/agenda/voorjaarsconcert".into()),
            image_url: Some("https://cdn.paradiso.nl/flyer.jpg".into()),
            category_hint: None,
            method: ParsingMethod::JsonLd,
            raw_html: None,
        }
    }

    #[test]
    fn test_full_normalization() {
        let source_id = SourceId::new();
        let normalizer = Normalizer::for_today(today());
        let event = normalizer.normalize(&card(), source_id, today()).unwrap();

        assert_eq!(event.title, "Voorjaarsconcert");
        assert_eq!(event.event_date.to_string(), "2026-04-12");
        assert_eq!(event.event_time, "20:00");
        assert!(event.time_known);
        assert_eq!(event.category, Category::Music);
        assert_eq!(event.venue_name.as_deref(), Some("Paradiso"));
        assert_eq!(event.venue_address.as_deref(), Some("Weteringschans 6-8, Amsterdam"));
        assert_eq!(
            event.description.as_deref(),
            Some("Het orkest speelt werken van Mahler. Aanvang 20:00.")
        );
        assert_eq!(event.fingerprint, event_fingerprint("Voorjaarsconcert", "2026-04-12", source_id));
    }

    #[test]
    fn test_noise_rejected() {
        let mut noise = card();
        noise.title = "Concerten in Amsterdam".into();
        let result = Normalizer::for_today(today()).normalize(&noise, SourceId::new(), today());
        assert!(matches!(result, Err(HarvestError::ValidationError(_))));
    }

    #[test]
    fn test_missing_date_rejected() {
        let mut undated = card();
        undated.date_text = None;
        undated.raw_html = None;
        let result = Normalizer::for_today(today()).normalize(&undated, SourceId::new(), today());
        assert!(matches!(result, Err(HarvestError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_time_becomes_tbd() {
        let mut card = card();
        card.date_text = Some("12 april 2026".into());
        card.description = Some("Een hele dag lang feest".into());
        let event = Normalizer::for_today(today())
            .normalize(&card, SourceId::new(), today())
            .unwrap();
        assert_eq!(event.event_time, TIME_TBD);
        assert!(!event.time_known);
    }

    #[test]
    fn test_date_salvaged_from_raw_html() {
        let mut card = card();
        card.date_text = None;
        card.raw_html = Some("<div class=\"meta\"><span>12 april 2026</span></div>".into());
        let event = Normalizer::for_today(today())
            .normalize(&card, SourceId::new(), today())
            .unwrap();
        assert_eq!(event.event_date.to_string(), "2026-04-12");
    }

    #[test]
    fn test_venue_without_address() {
        let mut card = card();
        card.location_text = Some("Paradiso".into());
        let event = Normalizer::for_today(today())
            .normalize(&card, SourceId::new(), today())
            .unwrap();
        assert_eq!(event.venue_name.as_deref(), Some("Paradiso"));
        assert!(event.venue_address.is_none());
    }

    #[test]
    fn test_price_extracted_from_description() {
        let mut card = card();
        card.description = Some("Entree € 12,50. Aanvang 20:00 uur.".into());
        let event = Normalizer::for_today(today())
            .normalize(&card, SourceId::new(), today())
            .unwrap();
        assert_eq!(event.price.min, Some(12.5));
        assert_eq!(event.price.currency.as_deref(), Some("EUR"));
    }
}
