// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Composition Root & Worker Runtime
//!
//! `HarvesterRuntime::build` wires the whole object graph from
//! configuration - repositories over one SQLite pool, the fetch service
//! with its shared host limiter, the waterfall with its injected feed
//! prober and LLM, the enrichment and persistence workers, the healer -
//! and `serve` runs the continuous worker loops under a shutdown token.
//!
//! Worker loops are pull-based: each waits on the shared work signal (or a
//! fallback tick), claims a batch, and re-signals itself when the batch
//! came back full - queue drain without any HTTP self-nudging.

use async_trait::async_trait;
use chrono::Datelike;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use event_harvester_bootstrap::CancellationToken;
use event_harvester_domain::repositories::{
    GeocodeCacheRepository, InsightRepository, QueueRepository, RetryPolicy, SourceRepository,
};
use event_harvester_domain::value_objects::Stage;
use event_harvester_domain::HarvestError;

use crate::application::services::coordinator::Coordinator;
use crate::application::services::enrich_stage::EnrichStageWorker;
use crate::application::services::extract_stage::ExtractStageWorker;
use crate::application::services::fetch_stage::FetchStageWorker;
use crate::application::services::persist_stage::PersistStageWorker;
use crate::application::services::source_health::SourceHealthService;
use crate::application::triggers::CoordinatorRequest;
use crate::infrastructure::ai::{HttpEmbeddingClient, HttpLlmClient};
use crate::infrastructure::config::HarvestConfig;
use crate::infrastructure::enrich::{
    GeocodeProviderPool, HttpBucketStore, HttpGeocodeBackend, HybridGeocoder, ImageRelocator,
};
use crate::infrastructure::extraction::{ExtractionWaterfall, FeedProber, TargetYears};
use crate::infrastructure::fetch::{
    host_key, FetchService, HostRateLimiter, RenderServiceFetcher, StaticFetcher,
};
use crate::infrastructure::healing::SelfHealingEngine;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::notify::SlackNotifier;
use crate::infrastructure::repositories::{
    schema, SqliteEventRepository, SqliteGeocodeCache, SqliteInsightRepository,
    SqliteQueueRepository, SqliteSourceRepository,
};

/// Fallback tick for worker loops when no signal arrives.
const WORKER_TICK: Duration = Duration::from_secs(5);
/// Coordinator cadence in serve mode.
const COORDINATOR_TICK: Duration = Duration::from_secs(60);
/// Geo sweep and re-embed cadence.
const SWEEP_TICK: Duration = Duration::from_secs(300);

/// Feed prober backed by the static fetcher and the shared host limiter.
struct FetchFeedProber {
    fetcher: Arc<StaticFetcher>,
    limiter: Arc<HostRateLimiter>,
    min_delay_ms: u64,
}

#[async_trait]
impl FeedProber for FetchFeedProber {
    async fn probe(&self, url: &str) -> Result<Option<String>, HarvestError> {
        self.limiter.acquire(&host_key(url), self.min_delay_ms).await;
        let page = self.fetcher.fetch(url, "nl").await?;
        if !page.is_success() {
            return Ok(None);
        }
        let body = page.html;
        let head: String = body.chars().take(256).collect();
        let looks_like_feed =
            head.contains("<rss") || head.contains("<feed") || head.contains("<?xml");
        Ok(looks_like_feed.then_some(body))
    }
}

/// The composed application.
pub struct HarvesterRuntime {
    pub config: HarvestConfig,
    pub queue: Arc<dyn QueueRepository>,
    pub sources: Arc<dyn SourceRepository>,
    pub insights: Arc<dyn InsightRepository>,
    pub geocode_cache: Arc<dyn GeocodeCacheRepository>,
    pub coordinator: Arc<Coordinator>,
    pub fetch_worker: Arc<FetchStageWorker>,
    pub extract_worker: Arc<ExtractStageWorker>,
    pub enrich_worker: Arc<EnrichStageWorker>,
    pub persist_worker: Arc<PersistStageWorker>,
    pub healer: Option<Arc<SelfHealingEngine>>,
    pub metrics: MetricsService,
    work_signal: Arc<Notify>,
}

impl HarvesterRuntime {
    /// Builds the full object graph. Fatal on a missing datastore URL;
    /// every optional provider degrades to a reduced capability.
    pub async fn build(config: HarvestConfig) -> Result<Self, HarvestError> {
        config.validate()?;

        let pool = schema::initialize_database(config.database_url())
            .await
            .map_err(|e| HarvestError::database_error(format!("datastore init failed: {}", e)))?;

        let retry = RetryPolicy {
            max_attempts: config.queue.max_attempts,
            base_delay_secs: config.queue.base_delay_secs,
            max_delay_secs: config.queue.max_delay_secs,
        };
        let queue: Arc<dyn QueueRepository> =
            Arc::new(SqliteQueueRepository::new(pool.clone(), retry));
        let sources: Arc<dyn SourceRepository> = Arc::new(SqliteSourceRepository::new(pool.clone()));
        let insights: Arc<dyn InsightRepository> =
            Arc::new(SqliteInsightRepository::new(pool.clone()));
        let geocode_cache: Arc<dyn GeocodeCacheRepository> =
            Arc::new(SqliteGeocodeCache::new(pool.clone()));
        let events = Arc::new(SqliteEventRepository::new(pool));

        let metrics = MetricsService::new()?;
        let notifier = SlackNotifier::new(config.slack_webhook.clone());
        let limiter = Arc::new(HostRateLimiter::new());

        // Fetch subsystem.
        let static_fetcher = Arc::new(StaticFetcher::new(&config.fetch)?);
        let dynamic = match &config.renderer {
            Some(renderer) => Some(Arc::new(RenderServiceFetcher::new(renderer, &config.fetch)?)
                as Arc<dyn crate::infrastructure::fetch::DynamicFetcher>),
            None => None,
        };
        let fetch_service = Arc::new(FetchService::new(
            static_fetcher.clone(),
            dynamic,
            Arc::clone(&limiter),
            config.fetch.clone(),
        ));

        // Extraction waterfall with injected collaborators.
        let llm = match &config.llm {
            Some(llm_config) => Some(Arc::new(HttpLlmClient::new(llm_config)?)
                as Arc<dyn crate::infrastructure::ai::LlmClient>),
            None => None,
        };
        let feed_prober: Arc<dyn FeedProber> = Arc::new(FetchFeedProber {
            fetcher: static_fetcher,
            limiter: Arc::clone(&limiter),
            min_delay_ms: config.fetch.min_host_delay_ms,
        });
        let current_year = chrono::Utc::now().date_naive().year();
        let target_years = TargetYears {
            min: current_year,
            max: current_year + config.extraction.target_year_window,
        };
        let waterfall = Arc::new(ExtractionWaterfall::new(
            Some(feed_prober),
            llm.clone(),
            config.extraction.min_cards,
            target_years,
            config.extraction.ai_html_max_chars,
        ));

        // Enrichment.
        let backends = config
            .geocoding
            .providers
            .iter()
            .map(|provider| {
                HttpGeocodeBackend::new(provider.clone()).map(|backend| {
                    (
                        Arc::new(backend) as Arc<dyn crate::infrastructure::enrich::GeocodeBackend>,
                        Duration::from_millis(provider.min_delay_ms),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let provider_pool = Arc::new(GeocodeProviderPool::new(backends));
        let geocoder = Arc::new(HybridGeocoder::new(
            Arc::clone(&geocode_cache),
            provider_pool,
        ));
        let object_store = match &config.image_store {
            Some(store_config) => Some(Arc::new(HttpBucketStore::new(store_config)?)
                as Arc<dyn crate::infrastructure::enrich::ObjectStore>),
            None => None,
        };
        let relocator = Arc::new(ImageRelocator::new(object_store)?);

        // Embedding.
        let embedder = match &config.embedding {
            Some(embedding_config) => Some(Arc::new(HttpEmbeddingClient::new(embedding_config)?)
                as Arc<dyn crate::infrastructure::ai::EmbeddingClient>),
            None => None,
        };

        let health = Arc::new(SourceHealthService::new(
            Arc::clone(&sources),
            notifier,
            config.healing.quarantine_threshold,
            config.coordinator.scrape_interval_hours,
        ));

        let soft_deadline = Duration::from_secs(config.queue.soft_deadline_secs);
        let work_signal = Arc::new(Notify::new());

        let fetch_worker = Arc::new(FetchStageWorker::new(
            Arc::clone(&queue),
            Arc::clone(&sources),
            Arc::clone(&insights),
            fetch_service,
            metrics.clone(),
            soft_deadline,
        ));
        let extract_worker = Arc::new(ExtractStageWorker::new(
            Arc::clone(&queue),
            Arc::clone(&sources),
            Arc::clone(&insights),
            Arc::clone(&health),
            waterfall,
            metrics.clone(),
            soft_deadline,
            config.extraction.pagination_depth,
        ));
        let enrich_worker = Arc::new(EnrichStageWorker::new(
            Arc::clone(&queue),
            geocoder,
            relocator,
            metrics.clone(),
            soft_deadline,
            "nl",
        ));
        let persist_worker = Arc::new(PersistStageWorker::new(
            Arc::clone(&queue),
            events,
            embedder,
            metrics.clone(),
            soft_deadline,
        ));

        let healer = llm.map(|llm| {
            Arc::new(SelfHealingEngine::new(
                llm,
                Arc::clone(&sources),
                Arc::clone(&queue),
                Arc::clone(&insights),
                config.healing.failure_threshold,
            ))
        });

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&sources),
            Arc::clone(&queue),
            metrics.clone(),
            config.coordinator.clone(),
            config.queue.clone(),
            Arc::clone(&work_signal),
        ));

        Ok(Self {
            config,
            queue,
            sources,
            insights,
            geocode_cache,
            coordinator,
            fetch_worker,
            extract_worker,
            enrich_worker,
            persist_worker,
            healer,
            metrics,
            work_signal,
        })
    }

    /// Runs coordinator and all stage workers until the token cancels.
    pub async fn serve(self: &Arc<Self>, workers_per_stage: u32, token: CancellationToken) {
        let mut handles = Vec::new();
        let limit = self.config.queue.batch_limit;

        // Coordinator tick.
        {
            let runtime = Arc::clone(self);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(COORDINATOR_TICK) => {}
                    }
                    if let Err(e) = runtime.coordinator.run_once(&CoordinatorRequest::default()).await {
                        warn!(error = %e, "coordinator tick failed");
                    }
                }
            }));
        }

        // Stage workers.
        for index in 0..workers_per_stage {
            for stage in [Stage::Discovered, Stage::AwaitingFetch, Stage::Extracting, Stage::Enriching, Stage::ReadyToPersist] {
                let runtime = Arc::clone(self);
                let token = token.clone();
                let worker_id = format!("{}-{}", stage.as_str(), index);
                handles.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = runtime.work_signal.notified() => {}
                            _ = tokio::time::sleep(WORKER_TICK) => {}
                        }
                        let processed = runtime.run_stage_batch(stage, &worker_id, limit).await;
                        // A full batch implies more work behind it.
                        if processed >= limit as u64 {
                            runtime.work_signal.notify_one();
                        }
                    }
                }));
            }
        }

        // Sweeps: geocode retries and missing embeddings.
        {
            let runtime = Arc::clone(self);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(SWEEP_TICK) => {}
                    }
                    if let Err(e) = runtime.enrich_worker.run_geo_sweep("geo-sweep", limit).await {
                        warn!(error = %e, "geo sweep failed");
                    }
                    match runtime.persist_worker.run_embedding_sweep(limit).await {
                        Ok(embedded) if embedded > 0 => info!(embedded, "re-embed sweep completed"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "re-embed sweep failed"),
                    }
                    runtime.run_healing_sweep().await;
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!("all worker loops drained");
    }

    /// One batch for a stage; absorbs errors into logs and returns the
    /// processed count.
    pub async fn run_stage_batch(&self, stage: Stage, worker_id: &str, limit: u32) -> u64 {
        let result = match stage {
            Stage::Discovered | Stage::AwaitingFetch => {
                self.fetch_worker.run_batch(stage, worker_id, limit).await
            }
            Stage::Extracting => self.extract_worker.run_batch(worker_id, limit).await,
            Stage::Enriching => self.enrich_worker.run_batch(worker_id, limit).await,
            Stage::ReadyToPersist => self.persist_worker.run_batch(worker_id, limit, false).await,
            _ => return 0,
        };
        match result {
            Ok(response) => response.items_processed,
            Err(e) => {
                warn!(stage = stage.as_str(), worker_id, error = %e, "stage batch failed");
                0
            }
        }
    }

    /// Out-of-band healing: any enabled source past the failure threshold
    /// (and not quarantined) gets one repair attempt. One in-flight
    /// attempt per source - the sweep is sequential.
    async fn run_healing_sweep(&self) {
        let Some(healer) = &self.healer else {
            return;
        };
        let sources = match self.sources.list_enabled().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "healing sweep could not list sources");
                return;
            }
        };
        for source in sources {
            if !source.needs_healing(self.config.healing.failure_threshold) {
                continue;
            }
            match healer.repair(source.id()).await {
                Ok(outcome) => {
                    self.metrics.record_healing(match outcome {
                        event_harvester_domain::entities::HealingOutcome::Applied => "applied",
                        event_harvester_domain::entities::HealingOutcome::Rejected => "rejected",
                        event_harvester_domain::entities::HealingOutcome::Deferred => "deferred",
                    });
                }
                Err(e) => warn!(source = source.name(), error = %e, "healing attempt errored"),
            }
        }
    }
}
