// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stage Machine
//!
//! The closed, ordered set of lifecycle stages a queue item moves through,
//! plus the transition table that the queue manager enforces.
//!
//! ## Stage Progression
//!
//! ```text
//! discovered ──► awaiting_fetch ──► extracting ──► enriching ──► ready_to_persist ──► indexed
//!      ▲                                              │  ▲
//!      │                                              ▼  │
//!      │                                         geo_incomplete
//!      └───────────────── failed (retry edge) ◄── any stage
//! ```
//!
//! Progression is strictly monotone with two sanctioned exceptions:
//!
//! - `failed → discovered`: the explicit retry edge (manual or sweeper).
//! - `geo_incomplete ⇄ enriching`: geocode-incomplete items stay recoverable
//!   by a later geocoder sweep without re-fetching the page.
//!
//! Claiming an item never changes its stage; only `advance_stage` does.
//! A transient failure therefore "restores" the prior stage simply by
//! clearing the claim and leaving the stage untouched.

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Lifecycle position of a queue item in the pipeline.
///
/// The derived total order follows declaration order and exists for
/// stable map keys and reporting; transition legality is governed by
/// `can_advance_to`, not by comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Minted by the coordinator; URL not yet fetched.
    Discovered,
    /// Detail or pagination URL enqueued mid-run; awaiting its fetch.
    AwaitingFetch,
    /// Raw HTML captured; awaiting the extraction waterfall.
    Extracting,
    /// Cards extracted and normalized; awaiting geocoding and image work.
    Enriching,
    /// Fully enriched; awaiting dedup/merge, embedding, and upsert.
    ReadyToPersist,
    /// Persisted; the item references its canonical event.
    Indexed,
    /// No coordinates after the hybrid geocoder; recoverable laterally.
    GeoIncomplete,
    /// Terminal unless explicitly retried.
    Failed,
}

impl Stage {
    /// All stages, in pipeline order (lateral and terminal states last).
    pub const ALL: [Stage; 8] = [
        Stage::Discovered,
        Stage::AwaitingFetch,
        Stage::Extracting,
        Stage::Enriching,
        Stage::ReadyToPersist,
        Stage::Indexed,
        Stage::GeoIncomplete,
        Stage::Failed,
    ];

    /// Stable snake_case name, used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovered => "discovered",
            Stage::AwaitingFetch => "awaiting_fetch",
            Stage::Extracting => "extracting",
            Stage::Enriching => "enriching",
            Stage::ReadyToPersist => "ready_to_persist",
            Stage::Indexed => "indexed",
            Stage::GeoIncomplete => "geo_incomplete",
            Stage::Failed => "failed",
        }
    }

    /// Parses a stage from its stable name.
    pub fn parse(s: &str) -> Result<Self, HarvestError> {
        match s {
            "discovered" => Ok(Stage::Discovered),
            "awaiting_fetch" => Ok(Stage::AwaitingFetch),
            "extracting" => Ok(Stage::Extracting),
            "enriching" => Ok(Stage::Enriching),
            "ready_to_persist" => Ok(Stage::ReadyToPersist),
            "indexed" => Ok(Stage::Indexed),
            "geo_incomplete" => Ok(Stage::GeoIncomplete),
            "failed" => Ok(Stage::Failed),
            other => Err(HarvestError::validation(format!("unknown stage '{}'", other))),
        }
    }

    /// Position in the forward progression; lateral/terminal states share
    /// the position of the stage they branch from.
    pub fn order_index(&self) -> u8 {
        match self {
            Stage::Discovered => 0,
            Stage::AwaitingFetch => 1,
            Stage::Extracting => 2,
            Stage::Enriching => 3,
            Stage::GeoIncomplete => 3,
            Stage::ReadyToPersist => 4,
            Stage::Indexed => 5,
            Stage::Failed => 5,
        }
    }

    /// Whether no worker will pick the item up again without intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Indexed | Stage::Failed)
    }

    /// Stages a worker batch may be claimed from.
    pub fn is_claimable(&self) -> bool {
        !self.is_terminal()
    }

    /// Validates that `self → next` is a sanctioned transition.
    ///
    /// Any non-terminal stage may move to `Failed` (permanent failure); the
    /// forward edges, the lateral geocode edges, and the explicit
    /// `failed → discovered` retry edge are the only other legal moves.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        if next == Stage::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Stage::Discovered, Stage::AwaitingFetch)
                | (Stage::Discovered, Stage::Extracting)
                | (Stage::AwaitingFetch, Stage::Extracting)
                | (Stage::Extracting, Stage::Enriching)
                | (Stage::Enriching, Stage::ReadyToPersist)
                | (Stage::Enriching, Stage::GeoIncomplete)
                | (Stage::GeoIncomplete, Stage::Enriching)
                | (Stage::ReadyToPersist, Stage::Indexed)
                | (Stage::Failed, Stage::Discovered)
        )
    }

    /// Checks a transition, returning the invariant-violation error the
    /// queue manager propagates on an illegal move.
    pub fn check_transition(&self, next: Stage) -> Result<(), HarvestError> {
        if self.can_advance_to(next) {
            Ok(())
        } else {
            Err(HarvestError::InvalidStageTransition(format!(
                "{} -> {} is not a legal stage transition",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for stage in Stage::ALL {
            assert_eq!(Stage::parse(stage.as_str()).unwrap(), stage);
        }
    }

    #[test]
    fn test_forward_edges() {
        assert!(Stage::Discovered.can_advance_to(Stage::Extracting));
        assert!(Stage::AwaitingFetch.can_advance_to(Stage::Extracting));
        assert!(Stage::Extracting.can_advance_to(Stage::Enriching));
        assert!(Stage::Enriching.can_advance_to(Stage::ReadyToPersist));
        assert!(Stage::ReadyToPersist.can_advance_to(Stage::Indexed));
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!Stage::Discovered.can_advance_to(Stage::Enriching));
        assert!(!Stage::Extracting.can_advance_to(Stage::Indexed));
        assert!(!Stage::AwaitingFetch.can_advance_to(Stage::ReadyToPersist));
    }

    #[test]
    fn test_no_backwards_motion() {
        assert!(!Stage::Enriching.can_advance_to(Stage::Extracting));
        assert!(!Stage::Indexed.can_advance_to(Stage::Discovered));
        assert!(!Stage::ReadyToPersist.can_advance_to(Stage::Enriching));
    }

    #[test]
    fn test_lateral_geocode_edges() {
        assert!(Stage::Enriching.can_advance_to(Stage::GeoIncomplete));
        assert!(Stage::GeoIncomplete.can_advance_to(Stage::Enriching));
        assert!(!Stage::GeoIncomplete.can_advance_to(Stage::ReadyToPersist));
    }

    #[test]
    fn test_failure_edges() {
        assert!(Stage::Extracting.can_advance_to(Stage::Failed));
        assert!(Stage::GeoIncomplete.can_advance_to(Stage::Failed));
        // Terminal states cannot fail again.
        assert!(!Stage::Indexed.can_advance_to(Stage::Failed));
        assert!(!Stage::Failed.can_advance_to(Stage::Failed));
        // The explicit retry edge.
        assert!(Stage::Failed.can_advance_to(Stage::Discovered));
    }

    #[test]
    fn test_terminal_flags() {
        assert!(Stage::Indexed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::GeoIncomplete.is_terminal());
    }

    #[test]
    fn test_check_transition_error_kind() {
        let err = Stage::Indexed.check_transition(Stage::Discovered).unwrap_err();
        assert!(matches!(err, HarvestError::InvalidStageTransition(_)));
    }
}
