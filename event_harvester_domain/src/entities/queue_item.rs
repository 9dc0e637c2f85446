// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Item Entity
//!
//! One candidate event URL in flight through the pipeline. The queue table
//! is the broker: workers claim items, do bounded work, and advance or
//! record failure; the item accumulates payload fields as it moves.
//!
//! ## Invariants
//!
//! - Exactly one stage at any time (structural: single `stage` field).
//! - Claimed ⇒ owner and claim timestamp both set; unclaimed ⇒ both absent.
//!   Structural here too: the claim is a single `Option<Claim>`.
//! - Stage transitions are monotone except the sanctioned retry/lateral
//!   edges; `Stage::check_transition` is consulted on every advance.
//! - Raw HTML is capped at 100 kB and cleaned markdown at 50 kB; oversized
//!   payloads are truncated at a char boundary, never rejected.
//! - An `indexed` item must reference its persisted event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;
use crate::value_objects::{Coordinates, EventId, ItemId, SourceId, Stage};

use crate::entities::event_record::EMBEDDING_DIM;

/// Storage cap for raw page HTML.
pub const RAW_HTML_MAX_BYTES: usize = 100 * 1024;
/// Storage cap for cleaned markdown.
pub const MARKDOWN_MAX_BYTES: usize = 50 * 1024;

/// An active claim on a queue item. Owner and timestamp travel together so
/// the both-or-neither invariant cannot be violated by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub owner: String,
    pub claimed_at: DateTime<Utc>,
}

/// One URL in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    id: ItemId,
    source_id: SourceId,
    /// Listing URL of the source run that spawned this item.
    source_url: String,
    /// Specific page for this item; `None` means the listing itself.
    detail_url: Option<String>,
    stage: Stage,
    claim: Option<Claim>,
    attempts: u32,
    priority: i32,
    /// Earliest instant a claim may pick this item up again.
    not_before: Option<DateTime<Utc>>,
    raw_html: Option<String>,
    cleaned_markdown: Option<String>,
    /// Extracted card payload (JSON), written by the extraction stage.
    extracted_data: Option<serde_json::Value>,
    content_hash: Option<String>,
    coordinates: Option<Coordinates>,
    duplicate_of: Option<EventId>,
    /// Persisted canonical event, set when the item reaches `indexed`.
    event_id: Option<EventId>,
    embedding: Option<Vec<f32>>,
    last_failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Mints a `discovered` item for a source's listing URL.
    pub fn discovered(source_id: SourceId, source_url: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: ItemId::new(),
            source_id,
            source_url: source_url.into(),
            detail_url: None,
            stage: Stage::Discovered,
            claim: None,
            attempts: 0,
            priority,
            not_before: None,
            raw_html: None,
            cleaned_markdown: None,
            extracted_data: None,
            content_hash: None,
            coordinates: None,
            duplicate_of: None,
            event_id: None,
            embedding: None,
            last_failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mints an `awaiting_fetch` item for a detail or pagination URL found
    /// mid-run.
    pub fn awaiting_fetch(
        source_id: SourceId,
        source_url: impl Into<String>,
        detail_url: impl Into<String>,
        priority: i32,
    ) -> Self {
        let mut item = Self::discovered(source_id, source_url, priority);
        item.detail_url = Some(detail_url.into());
        item.stage = Stage::AwaitingFetch;
        item
    }

    // Accessors

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn detail_url(&self) -> Option<&str> {
        self.detail_url.as_deref()
    }

    /// The URL the fetch stage should actually request.
    pub fn target_url(&self) -> &str {
        self.detail_url.as_deref().unwrap_or(&self.source_url)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn claim(&self) -> Option<&Claim> {
        self.claim.as_ref()
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    pub fn raw_html(&self) -> Option<&str> {
        self.raw_html.as_deref()
    }

    pub fn cleaned_markdown(&self) -> Option<&str> {
        self.cleaned_markdown.as_deref()
    }

    pub fn extracted_data(&self) -> Option<&serde_json::Value> {
        self.extracted_data.as_ref()
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    pub fn duplicate_of(&self) -> Option<EventId> {
        self.duplicate_of
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn last_failure_reason(&self) -> Option<&str> {
        self.last_failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Claim protocol

    /// Stamps a claim. The worker is the sole writer of the claim timestamp;
    /// attempts increment at claim time so abandoned work still counts.
    pub fn take_claim(&mut self, worker_id: impl Into<String>, now: DateTime<Utc>) -> Result<(), HarvestError> {
        if let Some(existing) = &self.claim {
            return Err(HarvestError::internal_error(format!(
                "item {} already claimed by {}",
                self.id, existing.owner
            )));
        }
        self.claim = Some(Claim {
            owner: worker_id.into(),
            claimed_at: now,
        });
        self.attempts += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Releases the claim without advancing (transient failure, reap).
    pub fn release_claim(&mut self) {
        self.claim = None;
        self.touch();
    }

    // Stage protocol

    /// Advances to `next` after validating the transition, clearing the
    /// claim. Attempts reset on advance: the retry budget is per stage,
    /// not per lifetime, so progressing through the pipeline never eats
    /// into a later stage's retries.
    pub fn advance(&mut self, next: Stage) -> Result<(), HarvestError> {
        self.stage.check_transition(next)?;
        self.stage = next;
        self.claim = None;
        self.not_before = None;
        self.attempts = 0;
        self.touch();
        Ok(())
    }

    /// Records a transient failure: claim released, stage kept (the claim
    /// never changed it), retry gated by an exponential not-before delay.
    pub fn fail_transient(&mut self, reason: impl Into<String>, retry_at: DateTime<Utc>) {
        self.last_failure_reason = Some(reason.into());
        self.claim = None;
        self.not_before = Some(retry_at);
        self.touch();
    }

    /// Records a permanent failure: item moves to the terminal stage.
    pub fn fail_permanent(&mut self, reason: impl Into<String>) -> Result<(), HarvestError> {
        self.stage.check_transition(Stage::Failed)?;
        self.last_failure_reason = Some(reason.into());
        self.stage = Stage::Failed;
        self.claim = None;
        self.touch();
        Ok(())
    }

    /// The explicit `failed → discovered` retry edge.
    pub fn retry_from_failed(&mut self) -> Result<(), HarvestError> {
        self.stage.check_transition(Stage::Discovered)?;
        self.stage = Stage::Discovered;
        self.attempts = 0;
        self.not_before = None;
        self.last_failure_reason = None;
        self.touch();
        Ok(())
    }

    // Payload writers

    /// Stores raw HTML, truncated to the 100 kB cap at a char boundary.
    pub fn set_raw_html(&mut self, html: impl Into<String>) {
        self.raw_html = Some(truncate_to_boundary(html.into(), RAW_HTML_MAX_BYTES));
        self.touch();
    }

    /// Stores cleaned markdown, truncated to the 50 kB cap.
    pub fn set_cleaned_markdown(&mut self, markdown: impl Into<String>) {
        self.cleaned_markdown = Some(truncate_to_boundary(markdown.into(), MARKDOWN_MAX_BYTES));
        self.touch();
    }

    pub fn set_extracted_data(&mut self, data: serde_json::Value) {
        self.extracted_data = Some(data);
        self.touch();
    }

    pub fn set_content_hash(&mut self, hash: impl Into<String>) {
        self.content_hash = Some(hash.into());
        self.touch();
    }

    pub fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.coordinates = Some(coordinates);
        self.touch();
    }

    /// Marks this item as a duplicate of an existing canonical event.
    pub fn mark_duplicate_of(&mut self, event_id: EventId) {
        self.duplicate_of = Some(event_id);
        self.event_id = Some(event_id);
        self.touch();
    }

    /// Records the persisted canonical event reference.
    pub fn set_event_id(&mut self, event_id: EventId) {
        self.event_id = Some(event_id);
        self.touch();
    }

    /// Stores an embedding; the vector must already be padded to 1536.
    pub fn set_embedding(&mut self, embedding: Vec<f32>) -> Result<(), HarvestError> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(HarvestError::validation(format!(
                "embedding must have {} dimensions, got {}",
                EMBEDDING_DIM,
                embedding.len()
            )));
        }
        self.embedding = Some(embedding);
        self.touch();
        Ok(())
    }

    /// Checks the indexed-item invariant.
    pub fn check_invariants(&self) -> Result<(), HarvestError> {
        if self.stage == Stage::Indexed && self.event_id.is_none() {
            return Err(HarvestError::internal_error(format!(
                "indexed item {} has no persisted event reference",
                self.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Rehydrates from storage, re-checking the claim both-or-neither
    /// invariant that a raw row representation can violate.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: ItemId,
        source_id: SourceId,
        source_url: String,
        detail_url: Option<String>,
        stage: Stage,
        claim_owner: Option<String>,
        claimed_at: Option<DateTime<Utc>>,
        attempts: u32,
        priority: i32,
        not_before: Option<DateTime<Utc>>,
        raw_html: Option<String>,
        cleaned_markdown: Option<String>,
        extracted_data: Option<serde_json::Value>,
        content_hash: Option<String>,
        coordinates: Option<Coordinates>,
        duplicate_of: Option<EventId>,
        event_id: Option<EventId>,
        embedding: Option<Vec<f32>>,
        last_failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, HarvestError> {
        let claim = match (claim_owner, claimed_at) {
            (Some(owner), Some(claimed_at)) => Some(Claim { owner, claimed_at }),
            (None, None) => None,
            _ => {
                return Err(HarvestError::internal_error(format!(
                    "item {} violates the claim invariant: owner and timestamp must be set together",
                    id
                )))
            }
        };
        Ok(Self {
            id,
            source_id,
            source_url,
            detail_url,
            stage,
            claim,
            attempts,
            priority,
            not_before,
            raw_html,
            cleaned_markdown,
            extracted_data,
            content_hash,
            coordinates,
            duplicate_of,
            event_id,
            embedding,
            last_failure_reason,
            created_at,
            updated_at,
        })
    }
}

/// Truncates to at most `max` bytes without splitting a UTF-8 char.
fn truncate_to_boundary(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s
}
