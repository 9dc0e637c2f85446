// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Repository Port
//!
//! Storage contract for canonical golden records. The insert outcome is an
//! explicit value, not exception control flow: a concurrent insert that
//! trips the fingerprint uniqueness constraint is a successful duplicate
//! (`DuplicateRace`), and callers merge into the winner.

use async_trait::async_trait;

use crate::entities::EventRecord;
use crate::error::HarvestError;
use crate::value_objects::EventId;

/// Result of attempting to insert a canonical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No matching record existed; a new row was written.
    Inserted(EventId),
    /// A concurrent writer inserted the same fingerprint first; the
    /// returned id is the winner's.
    DuplicateRace(EventId),
}

impl InsertOutcome {
    pub fn event_id(&self) -> EventId {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::DuplicateRace(id) => *id,
        }
    }
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Finds an existing record this event should merge into: fingerprint
    /// match (same-source re-run) or content-hash match (cross-source
    /// duplicate).
    async fn find_matching(
        &self,
        content_hash: &str,
        fingerprint: &str,
    ) -> Result<Option<EventRecord>, HarvestError>;

    /// Inserts a new record. A fingerprint-uniqueness conflict is reported
    /// as `DuplicateRace` with the surviving row's id, never as an error.
    async fn insert(&self, record: &EventRecord) -> Result<InsertOutcome, HarvestError>;

    /// Persists a merged golden record (full-row update by id).
    async fn update(&self, record: &EventRecord) -> Result<(), HarvestError>;

    async fn find_by_id(&self, id: EventId) -> Result<Option<EventRecord>, HarvestError>;

    /// Records persisted without a vector, oldest first, for the re-embed
    /// sweep.
    async fn missing_embedding(&self, limit: u32) -> Result<Vec<EventRecord>, HarvestError>;

    /// Writes just the embedding column.
    async fn set_embedding(&self, id: EventId, embedding: &[f32]) -> Result<(), HarvestError>;
}
