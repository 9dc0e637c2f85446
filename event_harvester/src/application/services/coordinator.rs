// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Coordinator
//!
//! Periodic scheduling: picks sources that are due (enabled, not
//! quarantined, `next_scrape_at` in the past), ordered by tier then
//! staleness, and mints one `discovered` item per source at its root URL.
//!
//! Downstream workers are nudged through an in-process work signal
//! (`tokio::sync::Notify`) - the serverless-era HTTP self-chaining is
//! gone; a worker whose batch came back full re-signals itself.
//!
//! Backpressure: when `ready_to_persist` depth exceeds the configured
//! threshold, this tick's minting rate is halved. Each tick also reaps
//! stalled claims and refreshes the queue-depth gauges.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use event_harvester_domain::entities::QueueItem;
use event_harvester_domain::repositories::{QueueRepository, SourceRepository};
use event_harvester_domain::value_objects::Stage;
use event_harvester_domain::HarvestError;

use crate::application::triggers::{CoordinatorMode, CoordinatorRequest, StageResponse};
use crate::infrastructure::config::{CoordinatorConfig, QueueConfig};
use crate::infrastructure::metrics::MetricsService;

pub struct Coordinator {
    sources: Arc<dyn SourceRepository>,
    queue: Arc<dyn QueueRepository>,
    metrics: MetricsService,
    config: CoordinatorConfig,
    queue_config: QueueConfig,
    /// Work signal shared with the stage workers.
    work_signal: Arc<Notify>,
}

impl Coordinator {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        queue: Arc<dyn QueueRepository>,
        metrics: MetricsService,
        config: CoordinatorConfig,
        queue_config: QueueConfig,
        work_signal: Arc<Notify>,
    ) -> Self {
        Self {
            sources,
            queue,
            metrics,
            config,
            queue_config,
            work_signal,
        }
    }

    pub fn work_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.work_signal)
    }

    /// One coordinator tick.
    pub async fn run_once(&self, request: &CoordinatorRequest) -> Result<StageResponse, HarvestError> {
        let now = Utc::now();

        // Housekeeping first: stalled claims back into circulation.
        let cutoff = now - ChronoDuration::seconds(self.queue_config.claim_ttl_secs as i64);
        let reaped = self.queue.reap_stalled(cutoff).await?;
        if reaped > 0 {
            warn!(reaped, "stalled claims reaped");
        }

        // Depth gauges + backpressure reading.
        let depths = self.queue.stage_depths().await?;
        for (stage, depth) in &depths {
            self.metrics.set_queue_depth(stage.as_str(), *depth);
        }
        let persist_backlog = depths.get(&Stage::ReadyToPersist).copied().unwrap_or(0);
        let mut batch_size = self.config.batch_size;
        if persist_backlog > self.config.backpressure_threshold {
            batch_size = (batch_size / 2).max(1);
            warn!(
                persist_backlog,
                batch_size, "persist stage behind; halving coordinator minting rate"
            );
        }

        if request.mode == CoordinatorMode::Discovery {
            // Source discovery needs the external discovery provider; with
            // none wired the mode degrades to a no-op tick.
            debug!("discovery mode requested; no discovery provider configured");
            return Ok(StageResponse::processed(0));
        }

        let due = self.sources.due_sources(now, batch_size).await?;
        let mut minted = 0u64;

        for source in due {
            if !request.cities.is_empty() {
                let name = source.name().to_lowercase();
                if !request.cities.iter().any(|city| name.contains(&city.to_lowercase())) {
                    continue;
                }
            }

            // One listing item per source run; skip if the root URL is
            // already in flight.
            if self.queue.exists_for_url(source.id(), source.root_url()).await? {
                debug!(source = source.name(), "root URL already in flight, skipping");
                continue;
            }

            let priority = -(source.tier().priority_rank() as i32);
            let item = QueueItem::discovered(source.id(), source.root_url(), priority);
            self.queue.enqueue(&item).await?;
            minted += 1;

            // Push the next-scrape pointer forward immediately so a second
            // coordinator tick cannot double-mint the source.
            let mut source = source;
            source.schedule_next(now + ChronoDuration::hours(self.config.scrape_interval_hours));
            self.sources.save(&source).await?;
        }

        if minted > 0 {
            info!(minted, "coordinator minted queue items");
            self.work_signal.notify_waiters();
        }
        Ok(StageResponse::processed(minted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{schema, SqliteQueueRepository, SqliteSourceRepository};
    use event_harvester_domain::entities::source::SourceTier;
    use event_harvester_domain::entities::Source;
    use event_harvester_domain::repositories::RetryPolicy;

    async fn coordinator() -> (Coordinator, Arc<SqliteSourceRepository>, Arc<SqliteQueueRepository>) {
        let pool = schema::in_memory_database().await.unwrap();
        let sources = Arc::new(SqliteSourceRepository::new(pool.clone()));
        let queue = Arc::new(SqliteQueueRepository::new(pool, RetryPolicy::default()));
        let coordinator = Coordinator::new(
            sources.clone(),
            queue.clone(),
            MetricsService::new().unwrap(),
            CoordinatorConfig::default(),
            QueueConfig::default(),
            Arc::new(Notify::new()),
        );
        (coordinator, sources, queue)
    }

    #[tokio::test]
    async fn test_mints_due_sources_once() {
        let (coordinator, sources, queue) = coordinator().await;
        let mut source = Source::new("Paradiso Amsterdam", "https://paradiso.nl/agenda").unwrap();
        source.set_tier(SourceTier::Metropolis);
        sources.save(&source).await.unwrap();

        let response = coordinator.run_once(&CoordinatorRequest::default()).await.unwrap();
        assert_eq!(response.items_processed, 1);

        let depths = queue.stage_depths().await.unwrap();
        assert_eq!(depths[&Stage::Discovered], 1);

        // Rescheduled: an immediate second tick mints nothing.
        let response = coordinator.run_once(&CoordinatorRequest::default()).await.unwrap();
        assert_eq!(response.items_processed, 0);
    }

    #[tokio::test]
    async fn test_quarantined_source_not_minted() {
        let (coordinator, sources, _) = coordinator().await;
        let mut source = Source::new("Broken", "https://broken.nl").unwrap();
        source.quarantine();
        sources.save(&source).await.unwrap();

        let response = coordinator.run_once(&CoordinatorRequest::default()).await.unwrap();
        assert_eq!(response.items_processed, 0);
    }

    #[tokio::test]
    async fn test_city_filter() {
        let (coordinator, sources, _) = coordinator().await;
        sources
            .save(&Source::new("Agenda Amsterdam", "https://ams.nl").unwrap())
            .await
            .unwrap();
        sources
            .save(&Source::new("Agenda Utrecht", "https://utr.nl").unwrap())
            .await
            .unwrap();

        let request = CoordinatorRequest {
            cities: vec!["utrecht".to_string()],
            ..Default::default()
        };
        let response = coordinator.run_once(&request).await.unwrap();
        assert_eq!(response.items_processed, 1);
    }

    #[tokio::test]
    async fn test_discovery_mode_degrades_without_provider() {
        let (coordinator, sources, _) = coordinator().await;
        sources
            .save(&Source::new("Agenda", "https://x.nl").unwrap())
            .await
            .unwrap();
        let request = CoordinatorRequest {
            mode: CoordinatorMode::Discovery,
            ..Default::default()
        };
        let response = coordinator.run_once(&request).await.unwrap();
        assert_eq!(response.items_processed, 0);
        assert!(response.success);
    }
}
