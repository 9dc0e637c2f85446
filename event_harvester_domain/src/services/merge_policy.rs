// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Golden-Record Merge Policy
//!
//! When an incoming event matches an existing canonical record (by content
//! hash or fingerprint), the existing record absorbs the incoming one
//! field-by-field under these rules:
//!
//! | Field | Rule |
//! |---|---|
//! | description | longer non-null wins; comparable lengths keep existing |
//! | image URL | replace only if current is null or a tracking URL |
//! | venue name / address | fill if empty |
//! | tickets URL / organizer / performer / price | fill if empty, never overwrite |
//! | tags / persona tags | set union, deduplicated (commutative) |
//! | coordinates | replace only if absent ((0,0) cannot be stored) |
//! | embedding | invalidated when descriptive fields changed materially |
//! | updated_at | always refreshed |
//! | last_healed_at | stamped when merging via the healing path |
//!
//! The merge is additive: a populated field on the golden record is never
//! degraded by a later, sparser duplicate.

use chrono::{DateTime, Utc};

use crate::entities::{EnrichedEvent, EventRecord};

/// Description lengths within this ratio are "comparable" and keep the
/// existing text.
const COMPARABLE_RATIO: f64 = 1.2;

/// What the merge did, for logging and re-embed decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    /// Any descriptive field changed; the embedding should be recomputed.
    pub descriptive_changed: bool,
    /// Any field at all changed beyond the timestamp refresh.
    pub changed: bool,
}

/// Substring markers of tracking/ad/pixel image URLs; these are never worth
/// keeping and never worth rehosting.
const TRACKING_MARKERS: &[&str] = &[
    "facebook.com/tr",
    "doubleclick",
    "googletagmanager",
    "google-analytics",
    "analytics.",
    "/pixel",
    "pixel.gif",
    "pixel.png",
    "tracking",
    "adservice",
    "scorecardresearch",
];

/// Whether a URL is a tracking/ad/pixel endpoint rather than an image.
pub fn is_tracking_url(url: &str) -> bool {
    let lowered = url.to_lowercase();
    TRACKING_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Merges an incoming enriched event into the existing golden record.
pub fn merge_into(
    existing: &mut EventRecord,
    incoming: &EnrichedEvent,
    now: DateTime<Utc>,
    via_healing: bool,
) -> MergeReport {
    let mut report = MergeReport::default();
    let event = &incoming.event;

    // Description: longer non-null wins; comparable keeps existing.
    if let Some(new_description) = &event.description {
        let new_len = new_description.chars().count();
        let old_len = existing
            .description
            .as_ref()
            .map(|d| d.chars().count())
            .unwrap_or(0);
        let clearly_longer = new_len as f64 > old_len as f64 * COMPARABLE_RATIO;
        if old_len == 0 || clearly_longer {
            existing.description = Some(new_description.clone());
            report.descriptive_changed = true;
            report.changed = true;
        }
    }

    // Image: replace only a missing or tracking-URL image.
    if let Some(new_image) = &event.image_url {
        let replace = match &existing.image_url {
            None => true,
            Some(current) => is_tracking_url(current) && !is_tracking_url(new_image),
        };
        if replace {
            existing.image_url = Some(new_image.clone());
            report.changed = true;
        }
    }

    // Venue fields: fill if empty.
    if existing.venue_name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        if let Some(venue) = &event.venue_name {
            existing.venue_name = Some(venue.clone());
            report.descriptive_changed = true;
            report.changed = true;
        }
    }
    if existing.venue_address.as_deref().map(str::trim).unwrap_or("").is_empty() {
        if let Some(address) = &event.venue_address {
            existing.venue_address = Some(address.clone());
            report.descriptive_changed = true;
            report.changed = true;
        }
    }

    // Additive single-value fields.
    if existing.tickets_url.is_none() && event.tickets_url.is_some() {
        existing.tickets_url = event.tickets_url.clone();
        report.changed = true;
    }
    if existing.organizer.is_none() && event.organizer.is_some() {
        existing.organizer = event.organizer.clone();
        report.changed = true;
    }
    if existing.performer.is_none() && event.performer.is_some() {
        existing.performer = event.performer.clone();
        report.changed = true;
    }
    if existing.price.is_empty() && !event.price.is_empty() {
        existing.price = event.price.clone();
        report.changed = true;
    }

    // Tag unions; sorted dedup gives set semantics and commutativity.
    if union_tags(&mut existing.tags, &event.tags) {
        report.descriptive_changed = true;
        report.changed = true;
    }
    if union_tags(&mut existing.persona_tags, &event.persona_tags) {
        report.changed = true;
    }

    // Coordinates: the type system already forbids (0,0); only fill.
    if existing.coordinates.is_none() {
        if let Some(coordinates) = incoming.coordinates {
            existing.coordinates = Some(coordinates);
            report.changed = true;
        }
    }

    // Quality: keep the better score.
    if event.quality_score.value() > existing.quality_score.value() {
        existing.quality_score = event.quality_score;
        report.changed = true;
    }

    if report.descriptive_changed {
        existing.embedding = None;
    }
    if via_healing {
        existing.last_healed_at = Some(now);
    }
    existing.updated_at = now;

    report
}

/// Unions `incoming` into `target` with set semantics. Returns whether the
/// target changed.
fn union_tags(target: &mut Vec<String>, incoming: &[String]) -> bool {
    let before = target.len();
    for tag in incoming {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if !target.iter().any(|existing| existing == tag) {
            target.push(tag.to_string());
        }
    }
    let changed = target.len() != before;
    if changed {
        target.sort();
        target.dedup();
    }
    changed
}
