// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extraction Stage Worker
//!
//! Claims `extracting` items, runs the waterfall over the stored HTML, and
//! normalizes the result. The first viable card rides the claimed item to
//! `enriching`; additional cards with their own detail URLs spawn new
//! `awaiting_fetch` items (their detail pages carry richer data than the
//! listing row), deduplicated against URLs already in flight. Pagination
//! URLs enqueue the same way, bounded by the configured depth.
//!
//! Failure mapping:
//! - every strategy empty → `ExtractionEmpty`, a transient item failure
//!   that ticks the source counter and may arm healing
//! - cards found but all rejected by the probable-event filter →
//!   permanent (the page is a listing shell, refetching won't change it)
//! - cards found but none with a usable date → transient (one retry)
//!
//! Source health and per-run insights are written on every outcome.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use event_harvester_domain::entities::{QueueItem, Source, SourceInsight};
use event_harvester_domain::error::FailureLevel;
use event_harvester_domain::repositories::{InsightRepository, QueueRepository, SourceRepository};
use event_harvester_domain::services::Normalizer;
use event_harvester_domain::value_objects::Stage;
use event_harvester_domain::HarvestError;

use crate::application::services::source_health::SourceHealthService;
use crate::application::triggers::StageResponse;
use crate::infrastructure::extraction::{ExtractionWaterfall, WaterfallInput};
use crate::infrastructure::metrics::MetricsService;

/// Priority nudge so detail pages drain before new listing mints.
const DETAIL_PRIORITY_BOOST: i32 = 1;

pub struct ExtractStageWorker {
    queue: Arc<dyn QueueRepository>,
    sources: Arc<dyn SourceRepository>,
    insights: Arc<dyn InsightRepository>,
    health: Arc<SourceHealthService>,
    waterfall: Arc<ExtractionWaterfall>,
    metrics: MetricsService,
    soft_deadline: Duration,
    pagination_depth: u32,
}

impl ExtractStageWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        sources: Arc<dyn SourceRepository>,
        insights: Arc<dyn InsightRepository>,
        health: Arc<SourceHealthService>,
        waterfall: Arc<ExtractionWaterfall>,
        metrics: MetricsService,
        soft_deadline: Duration,
        pagination_depth: u32,
    ) -> Self {
        Self {
            queue,
            sources,
            insights,
            health,
            waterfall,
            metrics,
            soft_deadline,
            pagination_depth,
        }
    }

    pub async fn run_batch(&self, worker_id: &str, limit: u32) -> Result<StageResponse, HarvestError> {
        let items = self
            .queue
            .claim_for_stage(Stage::Extracting, worker_id, limit)
            .await?;
        let mut response = StageResponse::processed(items.len() as u64);
        let mut failed = 0u64;
        let started = Instant::now();

        for mut item in items {
            if started.elapsed() > self.soft_deadline {
                debug!(worker_id, "soft deadline reached, releasing remaining items to the reaper");
                break;
            }

            match self.process_item(&mut item).await {
                Ok(()) => self.metrics.record_advance(Stage::Enriching.as_str()),
                Err(e) => {
                    failed += 1;
                    self.metrics.record_item_failure(e.category());
                    let level = failure_level_for(&e);
                    if let Err(record_err) =
                        self.queue.record_failure(item.id(), level, &e.to_string()).await
                    {
                        warn!(item_id = %item.id(), error = %record_err, "failed to record failure");
                    }
                    if let Err(health_err) =
                        self.health.record_failure(item.source_id(), &e.to_string()).await
                    {
                        warn!(source_id = %item.source_id(), error = %health_err, "failed to record source failure");
                    }
                    response.errors.push(format!("{}: {}", item.id(), e));
                }
            }
        }

        response.items_failed = Some(failed);
        Ok(response)
    }

    async fn process_item(&self, item: &mut QueueItem) -> Result<(), HarvestError> {
        let source = self
            .sources
            .find_by_id(item.source_id())
            .await?
            .ok_or_else(|| HarvestError::SourceNotFound(item.source_id().to_string()))?;
        let html = item
            .raw_html()
            .ok_or_else(|| HarvestError::internal_error(format!("item {} in extracting without HTML", item.id())))?
            .to_string();

        let parse_started = Instant::now();
        let input = WaterfallInput {
            html: &html,
            base_url: item.target_url(),
            source_name: source.name(),
            preferred_method: source.preferred_method(),
            feed_discovery: source.feed_discovery(),
            dom_selectors: source.dom_selectors(),
            recipe: source.recipe(),
        };
        let outcome = self.waterfall.run(&input).await;
        let parse_ms = parse_started.elapsed().as_millis() as u64;
        self.metrics.observe_parse_seconds(parse_started.elapsed().as_secs_f64());

        // Insights are written regardless of how the run ends.
        let mut insight = SourceInsight::new(source.id(), item.id());
        insight.cms_label = Some(outcome.cms_label.as_str().to_string());
        insight.winning_strategy = outcome.winning_strategy;
        insight.per_strategy_counts = outcome.per_strategy_counts.clone();
        insight.parse_ms = parse_ms;
        insight.html_bytes = html.len();
        insight.events_extracted = outcome.cards.len();
        self.insights.record_insight(&insight).await?;

        if outcome.cards.is_empty() {
            self.metrics.record_extraction_empty();
            return Err(HarvestError::ExtractionEmpty(format!(
                "every strategy yielded zero cards for {}",
                item.target_url()
            )));
        }
        if let Some(strategy) = outcome.winning_strategy {
            self.metrics.record_extraction_win(strategy.as_str());
        }

        // Normalize; the first viable card rides this item.
        let normalizer = Normalizer::for_today(Utc::now().date_naive());
        let today = Utc::now().date_naive();
        let mut primary = None;
        let mut noise_rejections = 0usize;
        let mut spawned = 0u64;

        for card in &outcome.cards {
            match normalizer.normalize(card, source.id(), today) {
                Ok(normalized) => {
                    if primary.is_none() {
                        primary = Some(normalized);
                    } else if let Some(detail_url) = &card.detail_url {
                        if self.spawn_detail_item(item, &source, detail_url).await? {
                            spawned += 1;
                        }
                    }
                }
                Err(e) => {
                    if matches!(&e, HarvestError::ValidationError(m) if m.contains("does not look like")) {
                        noise_rejections += 1;
                    }
                    debug!(card_title = %card.title, error = %e, "card rejected by normalizer");
                }
            }
        }

        let Some(normalized) = primary else {
            // Everything the page offered was noise or undatable.
            if noise_rejections == outcome.cards.len() {
                return Err(HarvestError::validation(format!(
                    "all {} cards from {} look like listing-page noise",
                    outcome.cards.len(),
                    item.target_url()
                )));
            }
            return Err(HarvestError::ExtractionEmpty(format!(
                "no card from {} survived normalization",
                item.target_url()
            )));
        };

        // Pagination, bounded depth-first within the source run.
        if let Some(next_page) = &outcome.next_page {
            if self.pagination_depth > 0 && !self.queue.exists_for_url(source.id(), next_page).await? {
                let next_item = QueueItem::awaiting_fetch(
                    source.id(),
                    item.source_url(),
                    next_page.clone(),
                    item.priority(),
                );
                self.queue.enqueue(&next_item).await?;
                debug!(next_page, "pagination item enqueued");
            }
        }

        item.set_content_hash(normalized.content_hash.as_str());
        item.set_extracted_data(serde_json::to_value(&normalized)?);
        self.queue.advance_stage(item, Stage::Enriching).await?;

        // This is the success transition that resets the failure counter.
        self.health
            .record_success(source.id(), outcome.cards.len() as u64)
            .await?;

        info!(
            source = source.name(),
            cards = outcome.cards.len(),
            spawned,
            strategy = ?outcome.winning_strategy,
            "extraction complete"
        );
        Ok(())
    }

    async fn spawn_detail_item(
        &self,
        parent: &QueueItem,
        source: &Source,
        detail_url: &str,
    ) -> Result<bool, HarvestError> {
        if detail_url == parent.target_url() {
            return Ok(false);
        }
        if self.queue.exists_for_url(source.id(), detail_url).await? {
            return Ok(false);
        }
        let item = QueueItem::awaiting_fetch(
            source.id(),
            parent.source_url(),
            detail_url,
            parent.priority() + DETAIL_PRIORITY_BOOST,
        );
        self.queue.enqueue(&item).await?;
        Ok(true)
    }
}

/// S6 semantics: a page whose extraction is pure listing noise will not
/// improve on refetch; everything else gets the transient retry budget.
fn failure_level_for(error: &HarvestError) -> FailureLevel {
    match error {
        HarvestError::ValidationError(message) if message.contains("listing-page noise") => {
            FailureLevel::Permanent
        }
        _ => error.failure_level().unwrap_or(FailureLevel::Transient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_levels() {
        let noise = HarvestError::validation("all 3 cards from x look like listing-page noise");
        assert_eq!(failure_level_for(&noise), FailureLevel::Permanent);

        let empty = HarvestError::ExtractionEmpty("nothing".into());
        assert_eq!(failure_level_for(&empty), FailureLevel::Transient);

        let undated = HarvestError::validation("no usable date for 'x'");
        assert_eq!(failure_level_for(&undated), FailureLevel::Transient);
    }
}
