// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Insights & Healing Log
//!
//! Per-run observations that feed dashboards and the `auto` fetch-strategy
//! selector, plus the audit log the self-healing engine writes on every
//! repair attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value_objects::{ItemId, ParsingMethod, SourceId};

/// One extraction run's worth of observations for a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInsight {
    pub source_id: SourceId,
    pub item_id: ItemId,
    /// CMS label from the fingerprinter ("wordpress", "squarespace", …).
    pub cms_label: Option<String>,
    pub winning_strategy: Option<ParsingMethod>,
    /// Cards produced per attempted strategy, including the losers.
    pub per_strategy_counts: BTreeMap<String, usize>,
    pub fetch_ms: u64,
    pub parse_ms: u64,
    pub html_bytes: usize,
    pub events_extracted: usize,
    pub recorded_at: DateTime<Utc>,
}

impl SourceInsight {
    pub fn new(source_id: SourceId, item_id: ItemId) -> Self {
        Self {
            source_id,
            item_id,
            cms_label: None,
            winning_strategy: None,
            per_strategy_counts: BTreeMap::new(),
            fetch_ms: 0,
            parse_ms: 0,
            html_bytes: 0,
            events_extracted: 0,
            recorded_at: Utc::now(),
        }
    }
}

/// Outcome of one self-healing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingOutcome {
    /// New recipe validated and applied.
    Applied,
    /// Proposal rejected by selector-count validation.
    Rejected,
    /// LLM rate-limited; attempt queued for later at lower priority.
    Deferred,
}

/// Audit row for one healing attempt on one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub source_id: SourceId,
    pub trigger_failures: u32,
    /// Matches of the failing item selector against the snapshot.
    pub old_selector_matches: usize,
    /// Matches of the proposed item selector.
    pub new_selector_matches: usize,
    pub outcome: HealingOutcome,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl HealingAttempt {
    /// Validation rule from the healing procedure: accept only if the new
    /// selector strictly beats the old one and clears the floor of 3.
    pub fn proposal_acceptable(old_matches: usize, new_matches: usize) -> bool {
        new_matches > old_matches && new_matches >= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptance_rule() {
        assert!(HealingAttempt::proposal_acceptable(0, 7));
        assert!(HealingAttempt::proposal_acceptable(3, 4));
        // Must strictly exceed the old count.
        assert!(!HealingAttempt::proposal_acceptable(7, 7));
        assert!(!HealingAttempt::proposal_acceptable(7, 5));
        // Must clear the floor of 3 even against a dead selector.
        assert!(!HealingAttempt::proposal_acceptable(0, 2));
    }
}
