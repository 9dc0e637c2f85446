// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Entity
//!
//! A website to harvest events from. Sources are created by coordinator
//! discovery or an operator, mutated by source-health accounting and the
//! self-healing engine, and never deleted - a source that has failed beyond
//! the healing budget is quarantined instead, which excludes it from
//! scheduling until manually reinstated.
//!
//! ## Invariants
//!
//! - `consecutive_failures >= 0` (enforced by type)
//! - `reliability_score ∈ [0, 1]` (EMA, clamped)
//! - A quarantined source emits no new queue items (enforced by the
//!   coordinator's due-source query; `is_due` mirrors it here)
//! - `consecutive_failures` resets to zero on any successful extraction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::extraction_recipe::ExtractionRecipe;
use crate::error::HarvestError;
use crate::value_objects::{ParsingMethod, SourceId};

/// Smoothing factor for the reliability EMA.
const RELIABILITY_ALPHA: f64 = 0.2;

/// Priority tier of a source. Ordering drives coordinator scheduling:
/// metropolis > regional > general > local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Metropolis,
    Regional,
    #[default]
    General,
    Local,
}

impl SourceTier {
    /// Scheduling rank; lower is scheduled first.
    pub fn priority_rank(&self) -> u8 {
        match self {
            SourceTier::Metropolis => 0,
            SourceTier::Regional => 1,
            SourceTier::General => 2,
            SourceTier::Local => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Metropolis => "metropolis",
            SourceTier::Regional => "regional",
            SourceTier::General => "general",
            SourceTier::Local => "local",
        }
    }

    pub fn parse(s: &str) -> Result<Self, HarvestError> {
        match s {
            "metropolis" => Ok(SourceTier::Metropolis),
            "regional" => Ok(SourceTier::Regional),
            "general" => Ok(SourceTier::General),
            "local" => Ok(SourceTier::Local),
            other => Err(HarvestError::validation(format!("unknown source tier '{}'", other))),
        }
    }
}

/// Declared fetch strategy for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategyKind {
    /// Plain HTTP GET; the default and cheapest rung.
    Static,
    Puppeteer,
    Playwright,
    Scrapingbee,
    /// Resolved at fetch time from CMS fingerprint and insight history.
    #[default]
    Auto,
}

impl FetchStrategyKind {
    /// Whether this strategy renders JavaScript via an external service.
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            FetchStrategyKind::Puppeteer | FetchStrategyKind::Playwright | FetchStrategyKind::Scrapingbee
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategyKind::Static => "static",
            FetchStrategyKind::Puppeteer => "puppeteer",
            FetchStrategyKind::Playwright => "playwright",
            FetchStrategyKind::Scrapingbee => "scrapingbee",
            FetchStrategyKind::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Result<Self, HarvestError> {
        match s {
            "static" => Ok(FetchStrategyKind::Static),
            "puppeteer" => Ok(FetchStrategyKind::Puppeteer),
            "playwright" => Ok(FetchStrategyKind::Playwright),
            "scrapingbee" => Ok(FetchStrategyKind::Scrapingbee),
            "auto" => Ok(FetchStrategyKind::Auto),
            other => Err(HarvestError::validation(format!("unknown fetch strategy '{}'", other))),
        }
    }
}

/// A harvest source and its health accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    id: SourceId,
    name: String,
    root_url: String,
    enabled: bool,
    tier: SourceTier,
    /// Preferred extraction method; `None` lets the waterfall decide.
    preferred_method: Option<ParsingMethod>,
    fetch_strategy: FetchStrategyKind,
    /// Minimum inter-request delay for this host, in milliseconds.
    rate_limit_ms: u64,
    /// BCP47-ish language tag declared for the source ("nl", "de", "en").
    language: String,
    /// Whether the waterfall may probe for syndication feeds.
    feed_discovery: bool,
    /// Operator-configured DOM item selectors, tried before the built-in
    /// generic set.
    dom_selectors: Vec<String>,
    last_payload_hash: Option<String>,
    consecutive_failures: u32,
    total_events_extracted: u64,
    quarantined: bool,
    last_successful_scrape: Option<DateTime<Utc>>,
    next_scrape_at: Option<DateTime<Utc>>,
    reliability_score: f64,
    recipe: Option<ExtractionRecipe>,
    last_working_recipe: Option<ExtractionRecipe>,
    last_healed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Source {
    /// Creates a new enabled source with defaults and a fresh identity.
    pub fn new(name: impl Into<String>, root_url: impl Into<String>) -> Result<Self, HarvestError> {
        let name = name.into();
        let root_url = root_url.into();
        if name.trim().is_empty() {
            return Err(HarvestError::validation("source name cannot be empty"));
        }
        if !root_url.starts_with("http://") && !root_url.starts_with("https://") {
            return Err(HarvestError::validation(format!(
                "source root URL must be http(s): '{}'",
                root_url
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: SourceId::new(),
            name,
            root_url,
            enabled: true,
            tier: SourceTier::default(),
            preferred_method: None,
            fetch_strategy: FetchStrategyKind::default(),
            rate_limit_ms: 200,
            language: "nl".to_string(),
            feed_discovery: true,
            dom_selectors: Vec::new(),
            last_payload_hash: None,
            consecutive_failures: 0,
            total_events_extracted: 0,
            quarantined: false,
            last_successful_scrape: None,
            next_scrape_at: Some(now),
            reliability_score: 0.5,
            recipe: None,
            last_working_recipe: None,
            last_healed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    // Accessors

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn tier(&self) -> SourceTier {
        self.tier
    }

    pub fn preferred_method(&self) -> Option<ParsingMethod> {
        self.preferred_method
    }

    pub fn fetch_strategy(&self) -> FetchStrategyKind {
        self.fetch_strategy
    }

    pub fn rate_limit_ms(&self) -> u64 {
        self.rate_limit_ms
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn feed_discovery(&self) -> bool {
        self.feed_discovery
    }

    pub fn dom_selectors(&self) -> &[String] {
        &self.dom_selectors
    }

    pub fn last_payload_hash(&self) -> Option<&str> {
        self.last_payload_hash.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_events_extracted(&self) -> u64 {
        self.total_events_extracted
    }

    pub fn quarantined(&self) -> bool {
        self.quarantined
    }

    pub fn last_successful_scrape(&self) -> Option<DateTime<Utc>> {
        self.last_successful_scrape
    }

    pub fn next_scrape_at(&self) -> Option<DateTime<Utc>> {
        self.next_scrape_at
    }

    pub fn reliability_score(&self) -> f64 {
        self.reliability_score
    }

    pub fn recipe(&self) -> Option<&ExtractionRecipe> {
        self.recipe.as_ref()
    }

    pub fn last_working_recipe(&self) -> Option<&ExtractionRecipe> {
        self.last_working_recipe.as_ref()
    }

    pub fn last_healed_at(&self) -> Option<DateTime<Utc>> {
        self.last_healed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Configuration mutators (operator/coordinator surface)

    pub fn set_tier(&mut self, tier: SourceTier) {
        self.tier = tier;
        self.touch();
    }

    pub fn set_fetch_strategy(&mut self, strategy: FetchStrategyKind) {
        self.fetch_strategy = strategy;
        self.touch();
    }

    pub fn set_preferred_method(&mut self, method: Option<ParsingMethod>) {
        self.preferred_method = method;
        self.touch();
    }

    pub fn set_rate_limit_ms(&mut self, ms: u64) {
        self.rate_limit_ms = ms;
        self.touch();
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
        self.touch();
    }

    pub fn set_feed_discovery(&mut self, enabled: bool) {
        self.feed_discovery = enabled;
        self.touch();
    }

    pub fn set_dom_selectors(&mut self, selectors: Vec<String>) {
        self.dom_selectors = selectors;
        self.touch();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.touch();
    }

    pub fn set_payload_hash(&mut self, hash: impl Into<String>) {
        self.last_payload_hash = Some(hash.into());
        self.touch();
    }

    // Health accounting

    /// Records a successful extraction run: resets the consecutive-failure
    /// counter, moves the reliability EMA toward 1, and stamps the success.
    pub fn record_success(&mut self, events_extracted: u64, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.total_events_extracted += events_extracted;
        self.last_successful_scrape = Some(now);
        self.reliability_score = ema(self.reliability_score, 1.0);
        self.touch();
    }

    /// Records a failed run: bumps the counter and decays the EMA.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.reliability_score = ema(self.reliability_score, 0.0);
        self.updated_at = now;
    }

    /// Whether the healing engine should attempt a repair.
    pub fn needs_healing(&self, threshold: u32) -> bool {
        !self.quarantined && self.consecutive_failures >= threshold
    }

    /// Whether the coordinator may mint a queue item for this source.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && !self.quarantined
            && self.next_scrape_at.map(|at| at <= now).unwrap_or(true)
    }

    pub fn schedule_next(&mut self, at: DateTime<Utc>) {
        self.next_scrape_at = Some(at);
        self.touch();
    }

    /// Quarantines the source; it stops emitting queue items until
    /// `reinstate` is called by an operator.
    pub fn quarantine(&mut self) {
        self.quarantined = true;
        self.touch();
    }

    pub fn reinstate(&mut self) {
        self.quarantined = false;
        self.consecutive_failures = 0;
        self.touch();
    }

    // Healing surface

    /// Installs a healed recipe, archiving the current one as last-working
    /// and resetting the failure counter.
    pub fn apply_recipe(&mut self, recipe: ExtractionRecipe, now: DateTime<Utc>) {
        self.last_working_recipe = self.recipe.take();
        self.recipe = Some(recipe);
        self.consecutive_failures = 0;
        self.last_healed_at = Some(now);
        self.updated_at = now;
    }

    /// Manual revert: swaps current and last-working recipes.
    pub fn revert_recipe(&mut self) -> Result<(), HarvestError> {
        if self.last_working_recipe.is_none() {
            return Err(HarvestError::validation(format!(
                "source '{}' has no last-working recipe to revert to",
                self.name
            )));
        }
        std::mem::swap(&mut self.recipe, &mut self.last_working_recipe);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Rehydrates a source from storage without re-running creation
    /// validation. All invariant-carrying fields are clamped defensively.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: SourceId,
        name: String,
        root_url: String,
        enabled: bool,
        tier: SourceTier,
        preferred_method: Option<ParsingMethod>,
        fetch_strategy: FetchStrategyKind,
        rate_limit_ms: u64,
        language: String,
        feed_discovery: bool,
        dom_selectors: Vec<String>,
        last_payload_hash: Option<String>,
        consecutive_failures: u32,
        total_events_extracted: u64,
        quarantined: bool,
        last_successful_scrape: Option<DateTime<Utc>>,
        next_scrape_at: Option<DateTime<Utc>>,
        reliability_score: f64,
        recipe: Option<ExtractionRecipe>,
        last_working_recipe: Option<ExtractionRecipe>,
        last_healed_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            root_url,
            enabled,
            tier,
            preferred_method,
            fetch_strategy,
            rate_limit_ms,
            language,
            feed_discovery,
            dom_selectors,
            last_payload_hash,
            consecutive_failures,
            total_events_extracted,
            quarantined,
            last_successful_scrape,
            next_scrape_at,
            reliability_score: reliability_score.clamp(0.0, 1.0),
            recipe,
            last_working_recipe,
            last_healed_at,
            created_at,
            updated_at,
        }
    }
}

fn ema(current: f64, observation: f64) -> f64 {
    (RELIABILITY_ALPHA * observation + (1.0 - RELIABILITY_ALPHA) * current).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Source {
        Source::new("Paradiso", "https://www.paradiso.nl/agenda").unwrap()
    }

    #[test]
    fn test_new_source_defaults() {
        let s = source();
        assert!(s.enabled());
        assert!(!s.quarantined());
        assert_eq!(s.consecutive_failures(), 0);
        assert_eq!(s.reliability_score(), 0.5);
        assert_eq!(s.rate_limit_ms(), 200);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(Source::new("x", "ftp://nope").is_err());
        assert!(Source::new("x", "paradiso.nl").is_err());
        assert!(Source::new("", "https://ok.nl").is_err());
    }

    #[test]
    fn test_success_resets_failures_and_raises_reliability() {
        let mut s = source();
        s.record_failure(Utc::now());
        s.record_failure(Utc::now());
        assert_eq!(s.consecutive_failures(), 2);

        let before = s.reliability_score();
        s.record_success(7, Utc::now());
        assert_eq!(s.consecutive_failures(), 0);
        assert_eq!(s.total_events_extracted(), 7);
        assert!(s.reliability_score() > before);
        assert!(s.last_successful_scrape().is_some());
    }

    #[test]
    fn test_reliability_stays_in_unit_interval() {
        let mut s = source();
        for _ in 0..50 {
            s.record_failure(Utc::now());
        }
        assert!(s.reliability_score() >= 0.0);
        for _ in 0..50 {
            s.record_success(1, Utc::now());
        }
        assert!(s.reliability_score() <= 1.0);
    }

    #[test]
    fn test_healing_threshold() {
        let mut s = source();
        for _ in 0..3 {
            s.record_failure(Utc::now());
        }
        assert!(s.needs_healing(3));
        s.quarantine();
        assert!(!s.needs_healing(3));
    }

    #[test]
    fn test_quarantined_source_never_due() {
        let mut s = source();
        assert!(s.is_due(Utc::now()));
        s.quarantine();
        assert!(!s.is_due(Utc::now()));
        s.reinstate();
        assert!(s.is_due(Utc::now()));
        assert_eq!(s.consecutive_failures(), 0);
    }

    #[test]
    fn test_recipe_apply_and_revert() {
        let mut s = source();
        let old = ExtractionRecipe::new(".events", ".event-card", "h3").unwrap();
        let new = ExtractionRecipe::new(".agenda", "article.show", "h2 a").unwrap();

        s.apply_recipe(old.clone(), Utc::now());
        s.record_failure(Utc::now());
        s.apply_recipe(new.clone(), Utc::now());
        assert_eq!(s.recipe().unwrap().item_selector(), "article.show");
        assert_eq!(s.last_working_recipe().unwrap().item_selector(), ".event-card");
        assert_eq!(s.consecutive_failures(), 0);

        s.revert_recipe().unwrap();
        assert_eq!(s.recipe().unwrap().item_selector(), ".event-card");
        assert_eq!(s.last_working_recipe().unwrap().item_selector(), "article.show");
    }

    #[test]
    fn test_revert_without_archive_is_error() {
        let mut s = source();
        assert!(s.revert_recipe().is_err());
    }

    #[test]
    fn test_tier_priority_ordering() {
        // metropolis > regional > general > local
        assert!(SourceTier::Metropolis.priority_rank() < SourceTier::Regional.priority_rank());
        assert!(SourceTier::Regional.priority_rank() < SourceTier::General.priority_rank());
        assert!(SourceTier::General.priority_rank() < SourceTier::Local.priority_rank());
    }
}
