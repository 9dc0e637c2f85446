// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Property-based invariant checks over the domain: identity-hash purity,
//! date-parser round trips, merge commutativity on union-fill fields, and
//! score bounds.

use chrono::{Datelike, NaiveDate, Utc};
use proptest::prelude::*;

use event_harvester_domain::entities::{EnrichedEvent, EventRecord, NormalizedEvent, TIME_TBD};
use event_harvester_domain::services::{merge_policy, DateParser};
use event_harvester_domain::value_objects::{
    content_hash, event_fingerprint, Category, Coordinates, ParsingMethod, PriceInfo,
    QualityScore, SourceId,
};

fn normalized(title: &str, source_id: SourceId) -> NormalizedEvent {
    let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
    NormalizedEvent {
        source_id,
        title: title.to_string(),
        description: None,
        category: Category::Community,
        event_date: date,
        event_time: TIME_TBD.into(),
        time_known: false,
        venue_name: None,
        venue_address: None,
        image_url: None,
        tags: vec![],
        persona_tags: vec![],
        price: PriceInfo::default(),
        organizer: None,
        performer: None,
        tickets_url: None,
        detail_url: None,
        content_hash: content_hash(title, "2026-08-01"),
        fingerprint: event_fingerprint(title, "2026-08-01", source_id),
        quality_score: QualityScore::new(0.4),
        method: ParsingMethod::Dom,
    }
}

proptest! {
    #[test]
    fn prop_fingerprint_pure_and_source_scoped(
        title in "[a-zA-Z ]{1,40}",
        date in "20[23][0-9]-0[1-9]-1[0-9]",
    ) {
        let source = SourceId::new();
        prop_assert_eq!(
            event_fingerprint(&title, &date, source),
            event_fingerprint(&title, &date, source)
        );
        prop_assert_eq!(content_hash(&title, &date), content_hash(&title, &date));
        // Content hash never depends on the source.
        let other = SourceId::new();
        prop_assert_ne!(
            event_fingerprint(&title, &date, source),
            event_fingerprint(&title, &date, other)
        );
    }

    #[test]
    fn prop_date_round_trip_iso(year in 2026i32..=2027, month in 1u32..=12, day in 1u32..=28) {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let parser = DateParser::new(2026, 2027);
        let canonical = NaiveDate::from_ymd_opt(year, month, day).unwrap().to_string();
        let parsed = parser.parse(&canonical, today).unwrap();
        prop_assert_eq!(parsed.to_string(), canonical);
    }

    #[test]
    fn prop_date_round_trip_european(year in 2026i32..=2027, month in 1u32..=12, day in 1u32..=28) {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let parser = DateParser::new(2026, 2027);
        let expected = NaiveDate::from_ymd_opt(year, month, day).unwrap();
        let european = format!("{}/{}/{}", day, month, year);
        prop_assert_eq!(parser.parse(&european, today), Some(expected));
    }

    #[test]
    fn prop_merge_union_fill_commutative(
        tags_a in proptest::collection::vec("[a-z]{1,10}", 0..6),
        tags_b in proptest::collection::vec("[a-z]{1,10}", 0..6),
    ) {
        let base = EventRecord::from_enriched(
            EnrichedEvent::new(normalized("Pride Walk", SourceId::new())),
            Utc::now(),
        );
        let mut ab = base.clone();
        let mut ba = base.clone();

        let mut incoming_a = EnrichedEvent::new(normalized("Pride Walk", SourceId::new()));
        incoming_a.event.persona_tags = tags_a;
        let mut incoming_b = EnrichedEvent::new(normalized("Pride Walk", SourceId::new()));
        incoming_b.event.persona_tags = tags_b;

        let now = Utc::now();
        merge_policy::merge_into(&mut ab, &incoming_a, now, false);
        merge_policy::merge_into(&mut ab, &incoming_b, now, false);
        merge_policy::merge_into(&mut ba, &incoming_b, now, false);
        merge_policy::merge_into(&mut ba, &incoming_a, now, false);

        prop_assert_eq!(ab.persona_tags, ba.persona_tags);
    }

    #[test]
    fn prop_quality_score_bounded(value in -10.0f64..10.0) {
        let score = QualityScore::new(value);
        prop_assert!(score.value() >= 0.0);
        prop_assert!(score.value() <= 1.0);
    }

    #[test]
    fn prop_coordinates_never_null_island(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
        match Coordinates::new(lat, lng) {
            Ok(c) => prop_assert!(!(c.lat() == 0.0 && c.lng() == 0.0)),
            Err(_) => prop_assert!(lat == 0.0 && lng == 0.0),
        }
    }
}

#[test]
fn test_reliability_and_category_invariants_survive_storage_shape() {
    // Categories parsed from storage are always members of the closed set;
    // an unknown key is an error, never a silent new category.
    for key in ["MUSIC", "COMMUNITY", "NIGHTLIFE"] {
        assert!(Category::parse(key).is_ok());
    }
    assert!(Category::parse("GARBAGE").is_err());
}

#[test]
fn test_date_window_default_is_current_plus_one() {
    let today = Utc::now().date_naive();
    let parser = DateParser::for_today(today);
    let inside = format!("{}-06-15", today.year());
    let outside = format!("{}-06-15", today.year() + 2);
    assert!(parser.parse(&inside, today).is_some());
    assert!(parser.parse(&outside, today).is_none());
}
