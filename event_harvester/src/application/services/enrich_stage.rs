// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Stage Worker
//!
//! Claims `enriching` items and completes their geographic and image
//! enrichment:
//!
//! 1. Coordinates from the stored page HTML (JSON-LD geo, microdata, map
//!    embeds) - free and exact when present.
//! 2. The hybrid geocoder (fuzzy cache → provider pool → degradation).
//! 3. No coordinates → lateral `geo_incomplete`; the sweep retries later
//!    without refetching.
//!
//! Image relocation runs best-effort; quality is rescored with the final
//! coordinate state before the item advances to `ready_to_persist`.
//!
//! The geo sweep (`run_geo_sweep`) claims `geo_incomplete` items, retries
//! only the geocoding ladder, and moves resolved items back to `enriching`.

use chrono::Utc;
use scraper::Html;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use event_harvester_domain::entities::NormalizedEvent;
use event_harvester_domain::error::FailureLevel;
use event_harvester_domain::repositories::QueueRepository;
use event_harvester_domain::services::quality;
use event_harvester_domain::value_objects::{Coordinates, Stage};
use event_harvester_domain::HarvestError;

use crate::application::triggers::StageResponse;
use crate::infrastructure::enrich::{
    html_coords, GeocodeQuery, GeocodeSource, HybridGeocoder, ImageRelocator, RelocationOutcome,
};
use crate::infrastructure::metrics::MetricsService;

pub struct EnrichStageWorker {
    queue: Arc<dyn QueueRepository>,
    geocoder: Arc<HybridGeocoder>,
    relocator: Arc<ImageRelocator>,
    metrics: MetricsService,
    soft_deadline: Duration,
    default_country: String,
}

impl EnrichStageWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        geocoder: Arc<HybridGeocoder>,
        relocator: Arc<ImageRelocator>,
        metrics: MetricsService,
        soft_deadline: Duration,
        default_country: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            geocoder,
            relocator,
            metrics,
            soft_deadline,
            default_country: default_country.into(),
        }
    }

    pub async fn run_batch(&self, worker_id: &str, limit: u32) -> Result<StageResponse, HarvestError> {
        self.run_stage(Stage::Enriching, worker_id, limit).await
    }

    /// The geocoder retry sweep over `geo_incomplete` items.
    pub async fn run_geo_sweep(&self, worker_id: &str, limit: u32) -> Result<StageResponse, HarvestError> {
        let items = self
            .queue
            .claim_for_stage(Stage::GeoIncomplete, worker_id, limit)
            .await?;
        let mut response = StageResponse::processed(items.len() as u64);
        let mut recovered = 0u64;

        for mut item in items {
            let Some(normalized) = read_normalized(&item) else {
                self.queue
                    .record_failure(item.id(), FailureLevel::Permanent, "geo_incomplete item without payload")
                    .await?;
                continue;
            };

            match self.geocode(&item, &normalized).await? {
                Some(coordinates) => {
                    item.set_coordinates(coordinates);
                    self.queue.advance_stage(&item, Stage::Enriching).await?;
                    recovered += 1;
                }
                None => {
                    // Still unresolved; release for a later sweep.
                    self.queue
                        .record_failure(item.id(), FailureLevel::Transient, "geocoder still has no answer")
                        .await?;
                }
            }
        }

        response.items_enriched = Some(recovered);
        Ok(response)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        worker_id: &str,
        limit: u32,
    ) -> Result<StageResponse, HarvestError> {
        let items = self.queue.claim_for_stage(stage, worker_id, limit).await?;
        let mut response = StageResponse::processed(items.len() as u64);
        let mut enriched = 0u64;
        let mut geo_incomplete = 0u64;
        let mut failed = 0u64;
        let started = Instant::now();

        for mut item in items {
            if started.elapsed() > self.soft_deadline {
                debug!(worker_id, "soft deadline reached, releasing remaining items to the reaper");
                break;
            }

            match self.process_item(&mut item).await {
                Ok(true) => {
                    enriched += 1;
                    self.metrics.record_advance(Stage::ReadyToPersist.as_str());
                }
                Ok(false) => {
                    geo_incomplete += 1;
                    self.metrics.record_advance(Stage::GeoIncomplete.as_str());
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

        response.items_enriched = Some(enriched);
        response.geo_incomplete = Some(geo_incomplete);
        response.items_failed = Some(failed);
        Ok(response)
    }

    /// Returns `Ok(true)` when fully enriched, `Ok(false)` for the lateral
    /// geo_incomplete path.
    async fn process_item(&self, item: &mut event_harvester_domain::entities::QueueItem) -> Result<bool, HarvestError> {
        let mut normalized = read_normalized(item).ok_or_else(|| {
            HarvestError::internal_error(format!("item {} in enriching without extracted payload", item.id()))
        })?;

        // Rung 1: the page itself.
        let coordinates = match item.coordinates() {
            Some(existing) => Some(existing),
            None => self.coordinates_from_html(item),
        };

        // Rungs 2-4: cache, providers, degradation.
        let coordinates = match coordinates {
            Some(coordinates) => Some(coordinates),
            None => self.geocode(item, &normalized).await?,
        };

        // Image relocation, best-effort.
        if let Some(image_url) = normalized.image_url.clone() {
            match self.relocator.relocate(&image_url, &item.id().to_string()).await {
                RelocationOutcome::Relocated(hosted) => normalized.image_url = Some(hosted),
                RelocationOutcome::Discarded => normalized.image_url = None,
                RelocationOutcome::KeptOriginal => {}
            }
        }

        // Rescore with the final coordinate and image state.
        normalized.quality_score = quality::score(
            quality::QualitySignals {
                description: normalized.description.as_deref(),
                image_url: normalized.image_url.as_deref(),
                venue_name: normalized.venue_name.as_deref(),
                coordinates,
                event_date: Some(normalized.event_date),
            },
            Utc::now().date_naive(),
        );
        item.set_extracted_data(serde_json::to_value(&normalized)?);

        match coordinates {
            Some(coordinates) => {
                item.set_coordinates(coordinates);
                self.queue.advance_stage(item, Stage::ReadyToPersist).await?;
                Ok(true)
            }
            None => {
                debug!(item_id = %item.id(), "no coordinates after hybrid ladder, parking as geo_incomplete");
                self.queue.advance_stage(item, Stage::GeoIncomplete).await?;
                Ok(false)
            }
        }
    }

    fn coordinates_from_html(&self, item: &event_harvester_domain::entities::QueueItem) -> Option<Coordinates> {
        let raw_html = item.raw_html()?;
        let document = Html::parse_document(raw_html);
        html_coords::extract(&document, raw_html)
    }

    async fn geocode(
        &self,
        item: &event_harvester_domain::entities::QueueItem,
        normalized: &NormalizedEvent,
    ) -> Result<Option<Coordinates>, HarvestError> {
        let query = GeocodeQuery {
            venue: normalized.venue_name.clone(),
            city: city_from_address(normalized.venue_address.as_deref()),
            country: self.default_country.clone(),
        };
        if query.venue.is_none() && query.city.is_none() {
            debug!(item_id = %item.id(), "nothing to geocode with");
            return Ok(None);
        }
        match self.geocoder.resolve(&query).await? {
            Some((coordinates, source)) => {
                self.metrics.record_geocode_cache(source == GeocodeSource::Cache);
                Ok(Some(coordinates))
            }
            None => {
                self.metrics.record_geocode_cache(false);
                Ok(None)
            }
        }
    }
}

fn read_normalized(item: &event_harvester_domain::entities::QueueItem) -> Option<NormalizedEvent> {
    item.extracted_data()
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}

/// Guesses the city from an address line: the last comma-separated part
/// that isn't street-number or postal-code shaped.
fn city_from_address(address: Option<&str>) -> Option<String> {
    let address = address?;
    address
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| {
            let digits = part.chars().filter(|c| c.is_ascii_digit()).count();
            digits * 2 < part.len()
        })
        .next_back()
        .map(|part| {
            // "1017 PL Amsterdam" → "Amsterdam".
            part.split_whitespace()
                .filter(|word| !word.chars().any(|c| c.is_ascii_digit()))
                .filter(|word| !(word.len() == 2 && word.chars().all(|c| c.is_ascii_uppercase())))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|city| !city.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_from_address() {
        assert_eq!(
            city_from_address(Some("Weteringschans 6-8, Amsterdam")).as_deref(),
            Some("Amsterdam")
        );
        assert_eq!(
            city_from_address(Some("Weteringschans 6-8, 1017 SG Amsterdam")).as_deref(),
            Some("Amsterdam")
        );
        assert_eq!(city_from_address(Some("Amsterdam")).as_deref(), Some("Amsterdam"));
        assert_eq!(city_from_address(None), None);
        assert_eq!(city_from_address(Some("6-8")), None);
    }
}
