// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fetch Stage Worker
//!
//! Claims `discovered` and `awaiting_fetch` items, fetches their target
//! URLs through the failover machinery, and advances them to `extracting`
//! with the captured HTML. One fetch session per source per batch, so the
//! static→dynamic escalation carries across a source's pages the way it
//! carries across a run.
//!
//! Failure mapping at the item boundary:
//! - 404/410, or a non-markup content type on a detail URL → permanent
//! - 403/429/5xx surviving the retry ladder → transient
//! - transport errors → per their taxonomy level

use chrono::Utc;
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use event_harvester_domain::entities::{QueueItem, Source};
use event_harvester_domain::error::FailureLevel;
use event_harvester_domain::repositories::{InsightRepository, QueueRepository, SourceRepository};
use event_harvester_domain::value_objects::{fingerprint::digest_of, SourceId, Stage};
use event_harvester_domain::HarvestError;

use crate::application::triggers::StageResponse;
use crate::infrastructure::fetch::{FetchMode, FetchService, FetchSession};
use crate::infrastructure::metrics::MetricsService;

pub struct FetchStageWorker {
    queue: Arc<dyn QueueRepository>,
    sources: Arc<dyn SourceRepository>,
    insights: Arc<dyn InsightRepository>,
    fetch: Arc<FetchService>,
    metrics: MetricsService,
    soft_deadline: Duration,
}

impl FetchStageWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        sources: Arc<dyn SourceRepository>,
        insights: Arc<dyn InsightRepository>,
        fetch: Arc<FetchService>,
        metrics: MetricsService,
        soft_deadline: Duration,
    ) -> Self {
        Self {
            queue,
            sources,
            insights,
            fetch,
            metrics,
            soft_deadline,
        }
    }

    /// Runs one batch over a claimable fetch stage.
    pub async fn run_batch(
        &self,
        stage: Stage,
        worker_id: &str,
        limit: u32,
    ) -> Result<StageResponse, HarvestError> {
        let items = self.queue.claim_for_stage(stage, worker_id, limit).await?;
        let mut response = StageResponse::processed(items.len() as u64);
        let mut failed = 0u64;

        let started = Instant::now();
        let mut sessions: HashMap<SourceId, FetchSession> = HashMap::new();

        for mut item in items {
            if started.elapsed() > self.soft_deadline {
                debug!(worker_id, "soft deadline reached, releasing remaining items to the reaper");
                break;
            }

            // One bad item never fails the batch.
            match self.process_item(&mut item, &mut sessions).await {
                Ok(()) => {
                    self.metrics.record_advance(Stage::Extracting.as_str());
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

        response.items_failed = Some(failed);
        Ok(response)
    }

    async fn process_item(
        &self,
        item: &mut QueueItem,
        sessions: &mut HashMap<SourceId, FetchSession>,
    ) -> Result<(), HarvestError> {
        let source = self
            .sources
            .find_by_id(item.source_id())
            .await?
            .ok_or_else(|| HarvestError::SourceNotFound(item.source_id().to_string()))?;

        if !sessions.contains_key(&source.id()) {
            let mode = self.resolve_initial_mode(&source).await;
            sessions.insert(source.id(), self.fetch.session(mode));
        }
        let session = sessions
            .get_mut(&source.id())
            .ok_or_else(|| HarvestError::internal_error("fetch session missing after insert"))?;
        let mode_before = session.mode();

        let fetch_started = Instant::now();
        let page = session.fetch_page(item.target_url(), &source, false).await?;
        self.metrics
            .observe_fetch_seconds(fetch_started.elapsed().as_secs_f64());
        if mode_before == FetchMode::Static && session.mode() == FetchMode::Dynamic {
            self.metrics.record_failover();
        }

        let is_leaf = item.detail_url().is_some();
        match page.status_code {
            404 | 410 => {
                return Err(HarvestError::fetch_permanent(format!(
                    "{} from {}",
                    page.status_code,
                    item.target_url()
                )))
            }
            status if status >= 400 => {
                return Err(HarvestError::fetch_transient(format!(
                    "{} from {} after retries",
                    status,
                    item.target_url()
                )))
            }
            _ => {}
        }
        if is_leaf && !page.is_markup() {
            return Err(HarvestError::fetch_permanent(format!(
                "non-HTML content type {:?} on detail URL {}",
                page.content_type(),
                item.target_url()
            )));
        }

        // Payload hash on the source lets dashboards spot frozen pages.
        let mut source = source;
        source.set_payload_hash(digest_of(&page.html).as_str());
        self.sources.save(&source).await?;

        item.set_raw_html(page.html.clone());
        item.set_cleaned_markdown(clean_markdown(&page.html));
        self.queue.advance_stage(item, Stage::Extracting).await?;
        Ok(())
    }

    /// Resolves the starting rung for an `auto` source: static unless the
    /// source has been failing with nothing to show for it and a renderer
    /// exists - the usual signature of a JavaScript-only site.
    async fn resolve_initial_mode(&self, source: &Source) -> FetchMode {
        if source.fetch_strategy().is_dynamic() {
            return FetchMode::Dynamic;
        }
        if source.fetch_strategy() == event_harvester_domain::entities::FetchStrategyKind::Auto
            && source.consecutive_failures() > 0
            && self.fetch.has_dynamic()
        {
            let no_winner = self
                .insights
                .latest_winning_strategy(source.id())
                .await
                .ok()
                .flatten()
                .is_none();
            if no_winner {
                return FetchMode::Dynamic;
            }
        }
        FetchMode::Static
    }
}

/// Tag-stripped text rendition of a page: block elements become line
/// breaks, scripts and styles are dropped. Stored (capped) on the item for
/// AI prompting.
pub fn clean_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(body) = scraper::Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body).next() else {
        return String::new();
    };

    let mut lines: Vec<String> = Vec::new();
    for text in body.text() {
        let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_markdown_strips_markup() {
        let html = r#"<html><head><title>t</title><style>.x{}</style></head>
            <body><h1>Agenda</h1><p>Voorjaarsconcert  op <b>12 april</b></p></body></html>"#;
        let markdown = clean_markdown(html);
        assert!(markdown.contains("Agenda"));
        assert!(markdown.contains("Voorjaarsconcert op"));
        assert!(!markdown.contains("<p>"));
        assert!(!markdown.contains(".x{}"));
    }

    #[test]
    fn test_clean_markdown_empty_body() {
        assert_eq!(clean_markdown("<html></html>"), "");
    }
}
