// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quality Scoring
//!
//! Weighted completeness score over an event's descriptive signals:
//!
//! | Signal | Weight |
//! |---|---|
//! | Description ≥ 50 chars | 0.3 (else 0.15) |
//! | Non-placeholder image URL | 0.2 |
//! | Venue present | 0.2 |
//! | Usable coordinates | 0.2 |
//! | Date within [now, now + 2 years] | 0.1 |
//!
//! The enrichment stage recomputes the score after geocoding so the
//! coordinate weight reflects the final state.

use chrono::{Duration, NaiveDate};

use crate::value_objects::{Coordinates, QualityScore};

/// Substrings that mark an image URL as a stock placeholder.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "placeholder",
    "no-image",
    "noimage",
    "default.jpg",
    "default.png",
    "missing.",
    "blank.",
    "spacer.",
    "1x1.",
];

/// Inputs the score is computed from.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualitySignals<'a> {
    pub description: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub venue_name: Option<&'a str>,
    pub coordinates: Option<Coordinates>,
    pub event_date: Option<NaiveDate>,
}

/// Computes the weighted quality score.
pub fn score(signals: QualitySignals<'_>, today: NaiveDate) -> QualityScore {
    let mut total = 0.0;

    total += match signals.description {
        Some(d) if d.chars().count() >= 50 => 0.3,
        _ => 0.15,
    };

    if signals.image_url.map(is_usable_image_url).unwrap_or(false) {
        total += 0.2;
    }

    if signals.venue_name.map(|v| !v.trim().is_empty()).unwrap_or(false) {
        total += 0.2;
    }

    // Coordinates is a validated type: presence alone is the signal, since
    // (0,0) cannot be constructed.
    if signals.coordinates.is_some() {
        total += 0.2;
    }

    if let Some(date) = signals.event_date {
        if date >= today && date <= today + Duration::days(365 * 2) {
            total += 0.1;
        }
    }

    QualityScore::new(total)
}

/// An image URL that is present, http(s), and not a known placeholder.
pub fn is_usable_image_url(url: &str) -> bool {
    let lowered = url.trim().to_lowercase();
    if !lowered.starts_with("http://") && !lowered.starts_with("https://") {
        return false;
    }
    !PLACEHOLDER_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn test_full_score() {
        let description = "x".repeat(60);
        let signals = QualitySignals {
            description: Some(&description),
            image_url: Some("https://cdn.example.nl/flyer.jpg"),
            venue_name: Some("Paradiso"),
            coordinates: Some(Coordinates::new(52.36, 4.88).unwrap()),
            event_date: Some(NaiveDate::from_ymd_opt(2026, 4, 12).unwrap()),
        };
        let score = score(signals, today());
        assert!((score.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bare_minimum_score() {
        let score = score(QualitySignals::default(), today());
        assert!((score.value() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_short_description_half_weight() {
        let with_short = score(
            QualitySignals {
                description: Some("Kort"),
                ..Default::default()
            },
            today(),
        );
        assert!((with_short.value() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_image_not_counted() {
        let signals = QualitySignals {
            image_url: Some("https://cdn.example.nl/img/placeholder.png"),
            ..Default::default()
        };
        assert!((score(signals, today()).value() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_far_future_date_not_counted() {
        let signals = QualitySignals {
            event_date: Some(NaiveDate::from_ymd_opt(2031, 1, 1).unwrap()),
            ..Default::default()
        };
        assert!((score(signals, today()).value() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_past_date_not_counted() {
        let signals = QualitySignals {
            event_date: Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
            ..Default::default()
        };
        assert!((score(signals, today()).value() - 0.15).abs() < 1e-9);
    }
}
