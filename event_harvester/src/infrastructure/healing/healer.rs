// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Self-Healing Selector Engine
//!
//! When a source crosses the consecutive-failure threshold, its extraction
//! recipe is presumed stale and the engine asks the LLM for a replacement:
//! current (truncated) HTML snapshot, the previous snapshot for diff
//! context, and the failing selectors go in; a structured recipe proposal
//! with confidence and reasoning comes out.
//!
//! Proposals are validated before anything changes: the new item selector
//! must match strictly more cards than the failing one AND at least 3.
//! Acceptance archives the old recipe as last-working and resets the
//! failure counter; rejection only logs. An LLM 429 defers the attempt -
//! healing never competes with extraction for provider budget.

use chrono::Utc;
use scraper::Html;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use event_harvester_domain::entities::{ExtractionRecipe, HealingAttempt, HealingOutcome};
use event_harvester_domain::repositories::{InsightRepository, QueueRepository, SourceRepository};
use event_harvester_domain::value_objects::SourceId;
use event_harvester_domain::HarvestError;

use crate::infrastructure::ai::{is_rate_limited, strip_code_fences, LlmClient};
use crate::infrastructure::extraction::recipe::count_item_matches;

/// HTML handed to the LLM is truncated to this many chars per snapshot.
const SNAPSHOT_MAX_CHARS: usize = 20_000;

/// The JSON shape demanded from the model.
#[derive(Debug, Deserialize)]
struct RecipeProposal {
    container: String,
    item: String,
    title: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    time: Option<String>,
    confidence: f64,
    reasoning: String,
}

pub struct SelfHealingEngine {
    llm: Arc<dyn LlmClient>,
    sources: Arc<dyn SourceRepository>,
    queue: Arc<dyn QueueRepository>,
    insights: Arc<dyn InsightRepository>,
    failure_threshold: u32,
}

impl SelfHealingEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        sources: Arc<dyn SourceRepository>,
        queue: Arc<dyn QueueRepository>,
        insights: Arc<dyn InsightRepository>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            llm,
            sources,
            queue,
            insights,
            failure_threshold,
        }
    }

    /// Attempts to repair a source's recipe. Returns the logged outcome.
    pub async fn repair(&self, source_id: SourceId) -> Result<HealingOutcome, HarvestError> {
        let mut source = self
            .sources
            .find_by_id(source_id)
            .await?
            .ok_or_else(|| HarvestError::SourceNotFound(source_id.to_string()))?;

        if !source.needs_healing(self.failure_threshold) {
            return Err(HarvestError::validation(format!(
                "source '{}' is not eligible for healing ({} consecutive failures, quarantined: {})",
                source.name(),
                source.consecutive_failures(),
                source.quarantined()
            )));
        }

        let snapshots = self.queue.recent_snapshots(source_id, 2).await?;
        let Some(current_html) = snapshots.first() else {
            return Err(HarvestError::validation(format!(
                "no HTML snapshots available for source '{}'",
                source.name()
            )));
        };
        let previous_html = snapshots.get(1);

        let proposal = match self.propose(&source.recipe(), current_html, previous_html).await {
            Ok(proposal) => proposal,
            Err(e) if is_rate_limited(&e) => {
                warn!(source = source.name(), "healing deferred: LLM rate limited");
                let attempt = HealingAttempt {
                    source_id,
                    trigger_failures: source.consecutive_failures(),
                    old_selector_matches: 0,
                    new_selector_matches: 0,
                    outcome: HealingOutcome::Deferred,
                    confidence: None,
                    reasoning: Some("LLM rate limited; retry scheduled at lower priority".into()),
                    attempted_at: Utc::now(),
                };
                self.insights.record_healing_attempt(&attempt).await?;
                return Ok(HealingOutcome::Deferred);
            }
            Err(e) => return Err(e),
        };

        // Validate against the current snapshot. The parsed document is
        // scoped: scraper's Html is not Send and this future runs on
        // spawned tasks.
        let (old_matches, new_matches) = {
            let document = Html::parse_document(current_html);
            let old = source
                .recipe()
                .map(|r| count_item_matches(&document, r.container_selector(), r.item_selector()))
                .unwrap_or(0);
            let new = count_item_matches(&document, &proposal.container, &proposal.item);
            (old, new)
        };

        let acceptable = HealingAttempt::proposal_acceptable(old_matches, new_matches);

        let attempt = HealingAttempt {
            source_id,
            trigger_failures: source.consecutive_failures(),
            old_selector_matches: old_matches,
            new_selector_matches: new_matches,
            outcome: if acceptable {
                HealingOutcome::Applied
            } else {
                HealingOutcome::Rejected
            },
            confidence: Some(proposal.confidence),
            reasoning: Some(proposal.reasoning.clone()),
            attempted_at: Utc::now(),
        };
        self.insights.record_healing_attempt(&attempt).await?;

        if !acceptable {
            warn!(
                source = source.name(),
                old_matches, new_matches, "healing proposal rejected"
            );
            return Ok(HealingOutcome::Rejected);
        }

        let mut recipe = ExtractionRecipe::new(proposal.container, proposal.item, proposal.title)?
            .with_healed_origin(proposal.confidence, proposal.reasoning);
        recipe.date_selector = proposal.date;
        recipe.link_selector = proposal.link;
        recipe.image_selector = proposal.image;
        recipe.description_selector = proposal.description;
        recipe.location_selector = proposal.location;
        recipe.time_selector = proposal.time;

        source.apply_recipe(recipe, Utc::now());
        self.sources.save(&source).await?;

        info!(
            source = source.name(),
            old_matches, new_matches, "healing applied: recipe replaced, failure counter reset"
        );
        Ok(HealingOutcome::Applied)
    }

    /// Manual revert: swaps current and last-working recipes.
    pub async fn revert(&self, source_id: SourceId) -> Result<(), HarvestError> {
        let mut source = self
            .sources
            .find_by_id(source_id)
            .await?
            .ok_or_else(|| HarvestError::SourceNotFound(source_id.to_string()))?;
        source.revert_recipe()?;
        self.sources.save(&source).await?;
        info!(source = source.name(), "recipe reverted to last working");
        Ok(())
    }

    async fn propose(
        &self,
        current_recipe: &Option<&ExtractionRecipe>,
        current_html: &str,
        previous_html: Option<&String>,
    ) -> Result<RecipeProposal, HarvestError> {
        let system = "You repair CSS selector recipes for event-listing scrapers. Respond with a \
                      single JSON object only, no prose, no markdown fences: {\"container\": \
                      string, \"item\": string, \"title\": string, \"date\": string or null, \
                      \"link\": string or null, \"image\": string or null, \"description\": \
                      string or null, \"location\": string or null, \"time\": string or null, \
                      \"confidence\": number 0..1, \"reasoning\": string}. Selectors must be \
                      valid CSS. The item selector must match each individual event card.";

        let current: String = current_html.chars().take(SNAPSHOT_MAX_CHARS).collect();
        let mut user = String::new();
        match current_recipe {
            Some(recipe) => {
                user.push_str(&format!(
                    "The current recipe stopped matching. container: {:?}, item: {:?}, title: {:?}\n\n",
                    recipe.container_selector(),
                    recipe.item_selector(),
                    recipe.title_selector()
                ));
            }
            None => user.push_str("There is no current recipe; propose one from scratch.\n\n"),
        }
        user.push_str(&format!("CURRENT PAGE HTML:\n{}\n", current));
        if let Some(previous) = previous_html {
            let previous: String = previous.chars().take(SNAPSHOT_MAX_CHARS).collect();
            user.push_str(&format!("\nPREVIOUS PAGE HTML (for diff context):\n{}\n", previous));
        }

        let response = self.llm.complete(system, &user).await?;
        let cleaned = strip_code_fences(&response);
        serde_json::from_str(cleaned)
            .map_err(|e| HarvestError::provider(format!("unparseable recipe proposal: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ai::llm_client::RATE_LIMIT_MARKER;
    use crate::infrastructure::repositories::{
        schema, SqliteInsightRepository, SqliteQueueRepository, SqliteSourceRepository,
    };
    use async_trait::async_trait;
    use event_harvester_domain::entities::{QueueItem, Source};
    use event_harvester_domain::repositories::RetryPolicy;
    use event_harvester_domain::value_objects::Stage;

    struct CannedLlm(Result<String, HarvestError>);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, HarvestError> {
            self.0.clone()
        }
    }

    /// Seven cards under a renamed container class; the old selector
    /// matches nothing.
    fn renamed_markup() -> String {
        let cards: String = (0..7)
            .map(|i| format!("<article class=\"evt\"><h3>Event {}</h3></article>", i))
            .collect();
        format!("<html><body><div class=\"agenda-v2\">{}</div></body></html>", cards)
    }

    async fn setup(llm: CannedLlm) -> (SelfHealingEngine, Arc<SqliteSourceRepository>, SourceId) {
        let pool = schema::in_memory_database().await.unwrap();
        let sources = Arc::new(SqliteSourceRepository::new(pool.clone()));
        let queue = Arc::new(SqliteQueueRepository::new(pool.clone(), RetryPolicy::default()));
        let insights = Arc::new(SqliteInsightRepository::new(pool));

        let mut source = Source::new("Drifted", "https://drifted.example.nl").unwrap();
        source.apply_recipe(
            ExtractionRecipe::new(".agenda", "article.show", "h2").unwrap(),
            Utc::now(),
        );
        for _ in 0..3 {
            source.record_failure(Utc::now());
        }
        sources.save(&source).await.unwrap();

        // A snapshot item carrying the drifted page.
        let mut item = QueueItem::discovered(source.id(), "https://drifted.example.nl", 0);
        item.set_raw_html(renamed_markup());
        item.advance(Stage::Extracting).unwrap();
        queue.enqueue(&item).await.unwrap();

        let engine = SelfHealingEngine::new(
            Arc::new(llm),
            sources.clone(),
            queue,
            insights,
            3,
        );
        (engine, sources, source.id())
    }

    fn good_proposal() -> String {
        r#"{"container":".agenda-v2","item":"article.evt","title":"h3",
            "confidence":0.9,"reasoning":"container class renamed to agenda-v2"}"#
            .to_string()
    }

    #[tokio::test]
    async fn test_successful_repair() {
        let (engine, sources, source_id) = setup(CannedLlm(Ok(good_proposal()))).await;

        let outcome = engine.repair(source_id).await.unwrap();
        assert_eq!(outcome, HealingOutcome::Applied);

        let healed = sources.find_by_id(source_id).await.unwrap().unwrap();
        assert_eq!(healed.consecutive_failures(), 0);
        assert_eq!(healed.recipe().unwrap().item_selector(), "article.evt");
        assert_eq!(healed.last_working_recipe().unwrap().item_selector(), "article.show");
        assert!(healed.last_healed_at().is_some());
    }

    #[tokio::test]
    async fn test_weak_proposal_rejected() {
        // Proposal matching nothing: fails the >=3 floor.
        let weak = r#"{"container":"body","item":".does-not-exist","title":"h3",
                       "confidence":0.4,"reasoning":"guess"}"#;
        let (engine, sources, source_id) = setup(CannedLlm(Ok(weak.to_string()))).await;

        let outcome = engine.repair(source_id).await.unwrap();
        assert_eq!(outcome, HealingOutcome::Rejected);

        // Selectors unchanged, failures kept.
        let unchanged = sources.find_by_id(source_id).await.unwrap().unwrap();
        assert_eq!(unchanged.recipe().unwrap().item_selector(), "article.show");
        assert_eq!(unchanged.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_defers() {
        let (engine, _, source_id) =
            setup(CannedLlm(Err(HarvestError::provider(RATE_LIMIT_MARKER)))).await;
        let outcome = engine.repair(source_id).await.unwrap();
        assert_eq!(outcome, HealingOutcome::Deferred);
    }

    #[tokio::test]
    async fn test_healthy_source_not_eligible() {
        let (engine, sources, source_id) = setup(CannedLlm(Ok(good_proposal()))).await;
        let mut source = sources.find_by_id(source_id).await.unwrap().unwrap();
        source.record_success(5, Utc::now());
        sources.save(&source).await.unwrap();

        assert!(engine.repair(source_id).await.is_err());
    }

    #[tokio::test]
    async fn test_revert_swaps_recipes() {
        let (engine, sources, source_id) = setup(CannedLlm(Ok(good_proposal()))).await;
        engine.repair(source_id).await.unwrap();

        engine.revert(source_id).await.unwrap();
        let reverted = sources.find_by_id(source_id).await.unwrap().unwrap();
        assert_eq!(reverted.recipe().unwrap().item_selector(), "article.show");
        assert_eq!(reverted.last_working_recipe().unwrap().item_selector(), "article.evt");
    }
}
