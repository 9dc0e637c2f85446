// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Records
//!
//! The typed progression of an extracted event: a `RawEventCard` (value
//! object, strategy output) becomes a `NormalizedEvent` after cleaning and
//! validation, an `EnrichedEvent` once geocoding and image relocation have
//! run, and finally a canonical `EventRecord` owned by the persister. Each
//! step is its own type with explicit optional fields - there is no
//! free-form payload map anywhere in the flow.
//!
//! ## Time Semantics
//!
//! `event_date` plus `event_time` assemble a UTC timestamp that *preserves
//! the wall-clock local time*: "20:00 in Amsterdam" is stored as 20:00 UTC,
//! deliberately, so stored times never drift across DST boundaries. When the
//! time is unknown (`event_time = "TBD"`), the timestamp is date-only
//! midnight and `time_known` is false - no fabricated noon placeholder.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    Category, Coordinates, Digest256, EventId, ParsingMethod, PriceInfo, QualityScore, SourceId,
};

/// Cap on the text composed for the embedding provider.
pub const EMBEDDING_INPUT_MAX_CHARS: usize = 8000;
/// Fixed embedding dimension; shorter provider vectors are zero-padded.
pub const EMBEDDING_DIM: usize = 1536;

/// Sentinel for an unknown event time.
pub const TIME_TBD: &str = "TBD";

/// A raw card after normalization: cleaned, dated, categorized, hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub source_id: SourceId,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    /// Canonical `YYYY-MM-DD` event date.
    pub event_date: NaiveDate,
    /// `HH:MM` (24-hour) or `TBD`.
    pub event_time: String,
    pub time_known: bool,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub persona_tags: Vec<String>,
    pub price: PriceInfo,
    pub organizer: Option<String>,
    pub performer: Option<String>,
    pub tickets_url: Option<String>,
    pub detail_url: Option<String>,
    pub content_hash: Digest256,
    pub fingerprint: Digest256,
    pub quality_score: QualityScore,
    pub method: ParsingMethod,
}

/// A normalized event plus enrichment output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event: NormalizedEvent,
    pub coordinates: Option<Coordinates>,
}

impl EnrichedEvent {
    pub fn new(event: NormalizedEvent) -> Self {
        Self {
            event,
            coordinates: None,
        }
    }
}

/// The canonical golden record, owned by the persister. Duplicate queue
/// items across sources all point at one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub source_id: SourceId,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub event_date: NaiveDate,
    pub event_time: String,
    pub time_known: bool,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub persona_tags: Vec<String>,
    pub price: PriceInfo,
    pub organizer: Option<String>,
    pub performer: Option<String>,
    pub tickets_url: Option<String>,
    pub content_hash: Digest256,
    pub fingerprint: Digest256,
    /// 1536-dim vector, or `None` until the re-embed sweep catches up.
    pub embedding: Option<Vec<f32>>,
    pub quality_score: QualityScore,
    pub last_healed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// Materializes a canonical record from an enriched event.
    pub fn from_enriched(enriched: EnrichedEvent, now: DateTime<Utc>) -> Self {
        let EnrichedEvent { event, coordinates } = enriched;
        Self {
            id: EventId::new(),
            source_id: event.source_id,
            title: event.title,
            description: event.description,
            category: event.category,
            event_date: event.event_date,
            event_time: event.event_time,
            time_known: event.time_known,
            venue_name: event.venue_name,
            venue_address: event.venue_address,
            coordinates,
            image_url: event.image_url,
            tags: event.tags,
            persona_tags: event.persona_tags,
            price: event.price,
            organizer: event.organizer,
            performer: event.performer,
            tickets_url: event.tickets_url,
            content_hash: event.content_hash,
            fingerprint: event.fingerprint,
            embedding: None,
            quality_score: event.quality_score,
            last_healed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// UTC timestamp preserving the wall-clock local time; midnight when
    /// the time is unknown.
    pub fn event_timestamp(&self) -> DateTime<Utc> {
        let time = if self.time_known {
            NaiveTime::parse_from_str(&self.event_time, "%H:%M").unwrap_or(NaiveTime::MIN)
        } else {
            NaiveTime::MIN
        };
        Utc.from_utc_datetime(&self.event_date.and_time(time))
    }

    /// Text composed for the embedding provider, capped at 8000 chars.
    pub fn embedding_input(&self) -> String {
        let mut parts: Vec<&str> = vec![self.title.as_str()];
        if let Some(description) = &self.description {
            parts.push(description);
        }
        if let Some(venue) = &self.venue_name {
            parts.push(venue);
        }
        if let Some(address) = &self.venue_address {
            parts.push(address);
        }
        parts.push(self.category.as_key());
        let tags = self.tags.join(" ");
        if !tags.is_empty() {
            parts.push(&tags);
        }
        let mut composed = parts.join(" | ");
        if composed.chars().count() > EMBEDDING_INPUT_MAX_CHARS {
            composed = composed.chars().take(EMBEDDING_INPUT_MAX_CHARS).collect();
        }
        composed
    }

    /// Digest over the fields whose change warrants re-embedding.
    pub fn descriptive_digest(&self) -> Digest256 {
        crate::value_objects::fingerprint::digest_of(&format!(
            "{}|{}|{}|{}|{}",
            self.title,
            self.description.as_deref().unwrap_or(""),
            self.venue_name.as_deref().unwrap_or(""),
            self.category.as_key(),
            self.tags.join(",")
        ))
    }

    /// Wire form for downstream consumers: ISO event date, uppercase
    /// category key, `POINT(lng lat)` location string.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "source_id": self.source_id,
            "title": self.title,
            "description": self.description,
            "category": self.category.as_key(),
            "event_date": self.event_timestamp().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "event_time": self.event_time,
            "time_known": self.time_known,
            "venue_name": self.venue_name,
            "venue_address": self.venue_address,
            "location": self.coordinates.map(|c| c.to_point()),
            "image_url": self.image_url,
            "tags": self.tags,
            "persona_tags": self.persona_tags,
            "price": self.price,
            "organizer": self.organizer,
            "performer": self.performer,
            "tickets_url": self.tickets_url,
            "content_hash": self.content_hash,
            "event_fingerprint": self.fingerprint,
            "quality_score": self.quality_score,
            "last_healed_at": self.last_healed_at,
            "updated_at": self.updated_at,
        })
    }

    /// Invariant check: category is structurally closed already; the
    /// embedding, when present, must be exactly 1536 wide.
    pub fn check_invariants(&self) -> Result<(), crate::error::HarvestError> {
        if let Some(embedding) = &self.embedding {
            if embedding.len() != EMBEDDING_DIM {
                return Err(crate::error::HarvestError::internal_error(format!(
                    "event {} embedding has {} dims, expected {}",
                    self.id,
                    embedding.len(),
                    EMBEDDING_DIM
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn normalized(title: &str, date: NaiveDate, source_id: SourceId) -> NormalizedEvent {
        NormalizedEvent {
            source_id,
            title: title.to_string(),
            description: None,
            category: Category::Community,
            event_date: date,
            event_time: TIME_TBD.to_string(),
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
            content_hash: crate::value_objects::content_hash(title, &date.to_string()),
            fingerprint: crate::value_objects::event_fingerprint(title, &date.to_string(), source_id),
            quality_score: QualityScore::new(0.5),
            method: ParsingMethod::JsonLd,
        }
    }

    #[test]
    fn test_wall_clock_preserved() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();
        let mut event = normalized("Voorjaarsconcert", date, SourceId::new());
        event.event_time = "20:00".to_string();
        event.time_known = true;
        let record = EventRecord::from_enriched(EnrichedEvent::new(event), Utc::now());

        let ts = record.event_timestamp();
        assert_eq!(ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true), "2026-04-12T20:00:00Z");
    }

    #[test]
    fn test_tbd_time_stores_date_only() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let event = normalized("Pride Walk", date, SourceId::new());
        let record = EventRecord::from_enriched(EnrichedEvent::new(event), Utc::now());

        assert!(!record.time_known);
        assert_eq!(
            record.event_timestamp().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "2026-08-01T00:00:00Z"
        );
    }

    #[test]
    fn test_embedding_input_shape_and_cap() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();
        let mut event = normalized("Voorjaarsconcert", date, SourceId::new());
        event.description = Some("d".repeat(10_000));
        event.venue_name = Some("Paradiso".to_string());
        let record = EventRecord::from_enriched(EnrichedEvent::new(event), Utc::now());

        let input = record.embedding_input();
        assert!(input.starts_with("Voorjaarsconcert | "));
        assert!(input.chars().count() <= EMBEDDING_INPUT_MAX_CHARS);
    }

    #[test]
    fn test_wire_format() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();
        let mut event = normalized("Voorjaarsconcert", date, SourceId::new());
        event.category = Category::Music;
        let mut enriched = EnrichedEvent::new(event);
        enriched.coordinates = Some(Coordinates::new(52.3622, 4.8832).unwrap());
        let record = EventRecord::from_enriched(enriched, Utc::now());

        let wire = record.to_wire();
        assert_eq!(wire["category"], "MUSIC");
        assert_eq!(wire["location"], "POINT(4.8832 52.3622)");
        assert_eq!(wire["event_date"], "2026-04-12T00:00:00Z");
    }

    #[test]
    fn test_embedding_invariant() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();
        let event = normalized("Voorjaarsconcert", date, SourceId::new());
        let mut record = EventRecord::from_enriched(EnrichedEvent::new(event), Utc::now());
        assert!(record.check_invariants().is_ok());

        record.embedding = Some(vec![0.0; 768]);
        assert!(record.check_invariants().is_err());

        record.embedding = Some(vec![0.0; EMBEDDING_DIM]);
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn test_descriptive_digest_tracks_material_change() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 12).unwrap();
        let event = normalized("Voorjaarsconcert", date, SourceId::new());
        let mut record = EventRecord::from_enriched(EnrichedEvent::new(event), Utc::now());
        let before = record.descriptive_digest();

        record.updated_at = Utc::now(); // non-descriptive change
        assert_eq!(record.descriptive_digest(), before);

        record.description = Some("Jubileumeditie met gastoptredens".to_string());
        assert_ne!(record.descriptive_digest(), before);
    }
}
