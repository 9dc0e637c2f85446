// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Prometheus Metrics Service
//!
//! Metrics collection and export for pipeline observability. One service
//! instance per process, injected into the workers; the registry is
//! exposable on a metrics endpoint for Prometheus scraping.
//!
//! # Metric Categories
//!
//! - **Throughput**: items per stage transition, events persisted, merges
//! - **Extraction**: wins per strategy, empty waterfalls
//! - **Fetch**: failovers to dynamic, durations
//! - **Geocoding**: cache hits/misses, provider calls
//! - **Healing**: attempts per outcome
//! - **Queue**: depth per stage (gauges, refreshed by the coordinator)

use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry,
};
use std::sync::Arc;

use event_harvester_domain::HarvestError;

/// Prometheus metrics service for pipeline observability.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Throughput
    items_advanced_total: IntCounterVec,
    items_failed_total: IntCounterVec,
    events_persisted_total: IntCounter,
    duplicates_merged_total: IntCounter,

    // Extraction
    extraction_wins_total: IntCounterVec,
    extraction_empty_total: IntCounter,

    // Fetch
    fetch_failovers_total: IntCounter,
    fetch_duration_seconds: Histogram,
    parse_duration_seconds: Histogram,

    // Geocoding
    geocode_cache_hits_total: IntCounter,
    geocode_cache_misses_total: IntCounter,

    // Healing
    healing_attempts_total: IntCounterVec,

    // Queue
    queue_depth: GaugeVec,

    // Sources
    sources_quarantined: Gauge,
}

impl MetricsService {
    /// Creates the service with a fresh registry.
    pub fn new() -> Result<Self, HarvestError> {
        let registry = Registry::new();
        let ns = "event_harvester";

        let items_advanced_total = IntCounterVec::new(
            Opts::new("items_advanced_total", "Queue items advanced, by target stage").namespace(ns),
            &["stage"],
        )
        .map_err(metrics_err)?;
        let items_failed_total = IntCounterVec::new(
            Opts::new("items_failed_total", "Per-item failures, by error category").namespace(ns),
            &["category"],
        )
        .map_err(metrics_err)?;
        let events_persisted_total = IntCounter::with_opts(
            Opts::new("events_persisted_total", "Canonical events inserted").namespace(ns),
        )
        .map_err(metrics_err)?;
        let duplicates_merged_total = IntCounter::with_opts(
            Opts::new("duplicates_merged_total", "Duplicate ingests merged into golden records")
                .namespace(ns),
        )
        .map_err(metrics_err)?;

        let extraction_wins_total = IntCounterVec::new(
            Opts::new("extraction_wins_total", "Waterfall wins, by strategy").namespace(ns),
            &["strategy"],
        )
        .map_err(metrics_err)?;
        let extraction_empty_total = IntCounter::with_opts(
            Opts::new("extraction_empty_total", "Pages where every strategy came up empty")
                .namespace(ns),
        )
        .map_err(metrics_err)?;

        let fetch_failovers_total = IntCounter::with_opts(
            Opts::new("fetch_failovers_total", "Sessions escalated from static to dynamic")
                .namespace(ns),
        )
        .map_err(metrics_err)?;
        let fetch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("fetch_duration_seconds", "Time fetching one page")
                .namespace(ns)
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0]),
        )
        .map_err(metrics_err)?;
        let parse_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("parse_duration_seconds", "Time in the extraction waterfall")
                .namespace(ns)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .map_err(metrics_err)?;

        let geocode_cache_hits_total = IntCounter::with_opts(
            Opts::new("geocode_cache_hits_total", "Geocode queries answered by cache").namespace(ns),
        )
        .map_err(metrics_err)?;
        let geocode_cache_misses_total = IntCounter::with_opts(
            Opts::new("geocode_cache_misses_total", "Geocode queries past the cache").namespace(ns),
        )
        .map_err(metrics_err)?;

        let healing_attempts_total = IntCounterVec::new(
            Opts::new("healing_attempts_total", "Self-healing attempts, by outcome").namespace(ns),
            &["outcome"],
        )
        .map_err(metrics_err)?;

        let queue_depth = GaugeVec::new(
            Opts::new("queue_depth", "Items currently in each stage").namespace(ns),
            &["stage"],
        )
        .map_err(metrics_err)?;

        let sources_quarantined = Gauge::with_opts(
            Opts::new("sources_quarantined", "Sources currently quarantined").namespace(ns),
        )
        .map_err(metrics_err)?;

        registry.register(Box::new(items_advanced_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(items_failed_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(events_persisted_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(duplicates_merged_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(extraction_wins_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(extraction_empty_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(fetch_failovers_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(fetch_duration_seconds.clone())).map_err(metrics_err)?;
        registry.register(Box::new(parse_duration_seconds.clone())).map_err(metrics_err)?;
        registry.register(Box::new(geocode_cache_hits_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(geocode_cache_misses_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(healing_attempts_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(queue_depth.clone())).map_err(metrics_err)?;
        registry.register(Box::new(sources_quarantined.clone())).map_err(metrics_err)?;

        Ok(Self {
            registry: Arc::new(registry),
            items_advanced_total,
            items_failed_total,
            events_persisted_total,
            duplicates_merged_total,
            extraction_wins_total,
            extraction_empty_total,
            fetch_failovers_total,
            fetch_duration_seconds,
            parse_duration_seconds,
            geocode_cache_hits_total,
            geocode_cache_misses_total,
            healing_attempts_total,
            queue_depth,
            sources_quarantined,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, HarvestError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_err)?;
        String::from_utf8(buffer).map_err(|e| HarvestError::metrics_error(e.to_string()))
    }

    pub fn record_advance(&self, stage: &str) {
        self.items_advanced_total.with_label_values(&[stage]).inc();
    }

    pub fn record_item_failure(&self, category: &str) {
        self.items_failed_total.with_label_values(&[category]).inc();
    }

    pub fn record_persisted(&self) {
        self.events_persisted_total.inc();
    }

    pub fn record_merge(&self) {
        self.duplicates_merged_total.inc();
    }

    pub fn record_extraction_win(&self, strategy: &str) {
        self.extraction_wins_total.with_label_values(&[strategy]).inc();
    }

    pub fn record_extraction_empty(&self) {
        self.extraction_empty_total.inc();
    }

    pub fn record_failover(&self) {
        self.fetch_failovers_total.inc();
    }

    pub fn observe_fetch_seconds(&self, seconds: f64) {
        self.fetch_duration_seconds.observe(seconds);
    }

    pub fn observe_parse_seconds(&self, seconds: f64) {
        self.parse_duration_seconds.observe(seconds);
    }

    pub fn record_geocode_cache(&self, hit: bool) {
        if hit {
            self.geocode_cache_hits_total.inc();
        } else {
            self.geocode_cache_misses_total.inc();
        }
    }

    pub fn record_healing(&self, outcome: &str) {
        self.healing_attempts_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_queue_depth(&self, stage: &str, depth: u64) {
        self.queue_depth.with_label_values(&[stage]).set(depth as f64);
    }

    pub fn set_sources_quarantined(&self, count: u64) {
        self.sources_quarantined.set(count as f64);
    }
}

fn metrics_err(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::metrics_error(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_construction_and_render() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_advance("extracting");
        metrics.record_extraction_win("json_ld");
        metrics.record_geocode_cache(true);
        metrics.set_queue_depth("discovered", 12);

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("event_harvester_items_advanced_total"));
        assert!(rendered.contains("event_harvester_queue_depth"));
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_persisted();
        metrics.record_persisted();
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("event_harvester_events_persisted_total 2"));
    }
}
