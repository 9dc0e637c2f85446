// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Queue Repository Port
//!
//! The staged queue's storage contract. The datastore is the broker: all
//! worker coordination happens through these four operations, each of which
//! must be individually serializable.
//!
//! ## Claim Contract
//!
//! `claim_for_stage` must be a *single-round-trip* compare-and-set: select
//! up to `limit` unclaimed, due items in the stage, stamp owner and claim
//! timestamp, bump attempts, and return the claimed rows - atomically, so
//! that two concurrent workers with `limit = N` over a queue of fewer than
//! 2N items never receive the same item. Select-then-update is explicitly
//! not an acceptable implementation.
//!
//! Selection order: oldest claim timestamp first (creation time for items
//! never claimed), then highest priority.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::entities::QueueItem;
use crate::error::{FailureLevel, HarvestError};
use crate::value_objects::{ItemId, SourceId, Stage};

/// Retry configuration for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts before a transient failure becomes terminal.
    pub max_attempts: u32,
    /// Base delay for the exponential not-before backoff.
    pub base_delay_secs: u64,
    /// Cap on the computed delay.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1,
            max_delay_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given (1-based) attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> chrono::Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_secs);
        chrono::Duration::seconds(secs as i64)
    }
}

/// Storage port for the staged queue.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Inserts a freshly minted item.
    async fn enqueue(&self, item: &QueueItem) -> Result<(), HarvestError>;

    /// Atomically claims up to `limit` due items in `stage` for `worker_id`.
    ///
    /// Claimed rows come back with owner and claim timestamp stamped and
    /// attempts already incremented. Items whose `not_before` lies in the
    /// future are skipped.
    async fn claim_for_stage(
        &self,
        stage: Stage,
        worker_id: &str,
        limit: u32,
    ) -> Result<Vec<QueueItem>, HarvestError>;

    /// Advances a claimed item to `next_stage`, persisting the payload
    /// fields accumulated on the entity and clearing the claim.
    ///
    /// The write is conditional on the stored stage still matching the
    /// entity's stage; a mismatch is an invariant violation
    /// (`InternalError`), not a silent no-op.
    async fn advance_stage(&self, item: &QueueItem, next_stage: Stage) -> Result<(), HarvestError>;

    /// Records a failure against an item.
    ///
    /// Transient failures under the attempt cap release the claim and gate
    /// the retry with an exponential `not_before`; at the cap, or for
    /// permanent failures, the item moves to the terminal `failed` stage.
    async fn record_failure(
        &self,
        item_id: ItemId,
        level: FailureLevel,
        reason: &str,
    ) -> Result<(), HarvestError>;

    /// Releases every claim older than `cutoff` as a transient failure.
    /// Returns the number of items reaped.
    async fn reap_stalled(&self, cutoff: DateTime<Utc>) -> Result<u64, HarvestError>;

    /// Looks up one item.
    async fn find_by_id(&self, id: ItemId) -> Result<Option<QueueItem>, HarvestError>;

    /// Item counts per stage; feeds backpressure and the queue-depth gauges.
    async fn stage_depths(&self) -> Result<BTreeMap<Stage, u64>, HarvestError>;

    /// Whether an item for this (source, url) pair is already in flight or
    /// done. Guards pagination from enqueueing the same page twice.
    async fn exists_for_url(&self, source_id: SourceId, url: &str) -> Result<bool, HarvestError>;

    /// Moves `failed` items of a source back to `discovered` (the explicit
    /// retry edge). Returns how many were retried.
    async fn retry_failed(&self, source_id: SourceId, limit: u32) -> Result<u64, HarvestError>;

    /// Most recent raw HTML snapshots captured for a source, newest first.
    /// The self-healing engine diffs the current snapshot against the
    /// previous one.
    async fn recent_snapshots(&self, source_id: SourceId, limit: u32) -> Result<Vec<String>, HarvestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_shape() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1).num_seconds(), 1);
        assert_eq!(policy.delay_for_attempt(2).num_seconds(), 2);
        assert_eq!(policy.delay_for_attempt(3).num_seconds(), 4);
        assert_eq!(policy.delay_for_attempt(4).num_seconds(), 8);
    }

    #[test]
    fn test_backoff_cap() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 1,
            max_delay_secs: 10,
        };
        assert_eq!(policy.delay_for_attempt(20).num_seconds(), 10);
    }
}
