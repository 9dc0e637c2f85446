// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Persist Stage Worker
//!
//! Claims `ready_to_persist` items and lands them in the canonical event
//! store:
//!
//! - A matching golden record (fingerprint or content hash) absorbs the
//!   incoming event under the merge policy; the item is marked
//!   `duplicate_of` the winner.
//! - Otherwise the event is inserted; a concurrent fingerprint race is a
//!   successful duplicate and takes the merge path against the winner.
//! - Embedding is computed on the composed text unless skipped; provider
//!   failure is non-blocking (the record persists vectorless and the
//!   re-embed sweep catches up later).
//!
//! The item always advances to `indexed` carrying its persisted event
//! reference - the queue's terminal invariant.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use event_harvester_domain::entities::{EnrichedEvent, EventRecord, NormalizedEvent};
use event_harvester_domain::error::FailureLevel;
use event_harvester_domain::repositories::{EventRepository, InsertOutcome, QueueRepository};
use event_harvester_domain::services::merge_policy;
use event_harvester_domain::value_objects::Stage;
use event_harvester_domain::HarvestError;

use crate::application::triggers::StageResponse;
use crate::infrastructure::ai::EmbeddingClient;
use crate::infrastructure::metrics::MetricsService;

pub struct PersistStageWorker {
    queue: Arc<dyn QueueRepository>,
    events: Arc<dyn EventRepository>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    metrics: MetricsService,
    soft_deadline: Duration,
}

impl PersistStageWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        events: Arc<dyn EventRepository>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
        metrics: MetricsService,
        soft_deadline: Duration,
    ) -> Self {
        Self {
            queue,
            events,
            embedder,
            metrics,
            soft_deadline,
        }
    }

    pub async fn run_batch(
        &self,
        worker_id: &str,
        limit: u32,
        skip_embedding: bool,
    ) -> Result<StageResponse, HarvestError> {
        let items = self
            .queue
            .claim_for_stage(Stage::ReadyToPersist, worker_id, limit)
            .await?;
        let mut response = StageResponse::processed(items.len() as u64);
        let mut persisted = 0u64;
        let mut failed = 0u64;
        let started = Instant::now();

        for mut item in items {
            if started.elapsed() > self.soft_deadline {
                debug!(worker_id, "soft deadline reached, releasing remaining items to the reaper");
                break;
            }

            match self.process_item(&mut item, skip_embedding).await {
                Ok(()) => {
                    persisted += 1;
                    self.metrics.record_advance(Stage::Indexed.as_str());
                }
                Err(e) => {
                    failed += 1;
                    self.metrics.record_item_failure(e.category());
                    let level = e.failure_level().unwrap_or(FailureLevel::Transient);
                    if let Err(record_err) =
                        self.queue.record_failure(item.id(), level, &e.to_string()).await
                    {
                        warn!(item_id = %item.id(), error = %record_err, "failed to record failure");
                    }
                    response.errors.push(format!("{}: {}", item.id(), e));
                }
            }
        }

        response.items_persisted = Some(persisted);
        response.items_failed = Some(failed);
        Ok(response)
    }

    /// Background sweep: re-embed events persisted without a vector.
    pub async fn run_embedding_sweep(&self, limit: u32) -> Result<u64, HarvestError> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };
        let records = self.events.missing_embedding(limit).await?;
        let mut embedded = 0u64;
        for record in records {
            match embedder.embed(&record.embedding_input()).await {
                Ok(vector) => {
                    self.events.set_embedding(record.id, &vector).await?;
                    embedded += 1;
                }
                Err(e) => {
                    debug!(event_id = %record.id, error = %e, "re-embed failed, will retry next sweep");
                }
            }
        }
        Ok(embedded)
    }

    async fn process_item(
        &self,
        item: &mut event_harvester_domain::entities::QueueItem,
        skip_embedding: bool,
    ) -> Result<(), HarvestError> {
        let normalized: NormalizedEvent = item
            .extracted_data()
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| {
                HarvestError::internal_error(format!(
                    "item {} in ready_to_persist without extracted payload",
                    item.id()
                ))
            })?;

        let mut enriched = EnrichedEvent::new(normalized);
        enriched.coordinates = item.coordinates();

        let content_hash = enriched.event.content_hash.clone();
        let fingerprint = enriched.event.fingerprint.clone();

        let existing = self
            .events
            .find_matching(content_hash.as_str(), fingerprint.as_str())
            .await?;

        let event_id = match existing {
            Some(mut golden) => {
                // Duplicate detected: not an error. Merge and point the
                // item at the winner.
                let report = merge_policy::merge_into(&mut golden, &enriched, Utc::now(), false);
                if report.descriptive_changed && !skip_embedding {
                    self.try_embed(&mut golden).await;
                }
                self.events.update(&golden).await?;
                self.metrics.record_merge();
                item.mark_duplicate_of(golden.id);
                debug!(event_id = %golden.id, item_id = %item.id(), "merged into existing golden record");
                golden.id
            }
            None => {
                let mut record = EventRecord::from_enriched(enriched.clone(), Utc::now());
                if !skip_embedding {
                    self.try_embed(&mut record).await;
                }
                match self.events.insert(&record).await? {
                    InsertOutcome::Inserted(id) => {
                        self.metrics.record_persisted();
                        id
                    }
                    InsertOutcome::DuplicateRace(winner_id) => {
                        // Someone beat us to the fingerprint; merge into
                        // the winner instead.
                        let Some(mut golden) = self.events.find_by_id(winner_id).await? else {
                            return Err(HarvestError::internal_error(
                                "duplicate race winner vanished before merge",
                            ));
                        };
                        merge_policy::merge_into(&mut golden, &enriched, Utc::now(), false);
                        self.events.update(&golden).await?;
                        self.metrics.record_merge();
                        item.mark_duplicate_of(winner_id);
                        winner_id
                    }
                }
            }
        };

        item.set_event_id(event_id);
        if let Some(embedding) = self.events.find_by_id(event_id).await?.and_then(|e| e.embedding) {
            // Mirror the vector onto the queue item for auditability.
            let _ = item.set_embedding(embedding);
        }
        self.queue.advance_stage(item, Stage::Indexed).await?;
        info!(item_id = %item.id(), event_id = %event_id, "item indexed");
        Ok(())
    }

    /// Embedding failure is logged, never propagated: the event persists
    /// without a vector and the sweep retries.
    async fn try_embed(&self, record: &mut EventRecord) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        match embedder.embed(&record.embedding_input()).await {
            Ok(vector) => record.embedding = Some(vector),
            Err(e) => {
                warn!(event_id = %record.id, error = %e, "embedding failed, persisting without vector");
                record.embedding = None;
            }
        }
    }
}
