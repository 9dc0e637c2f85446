// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extraction Waterfall
//!
//! The ordered ladder of extraction strategies applied to a fetched page
//! until one produces enough cards:
//!
//! 1. Recipe (stored selectors; the trusted fast path)
//! 2. JSON-LD
//! 3. Microdata / Open Graph
//! 4. Hydration blobs
//! 5. Syndication feeds (when the source allows probing)
//! 6. DOM selectors (configured + generic)
//! 7. AI fallback (last resort, only when an LLM is configured)
//!
//! The CMS fingerprint may re-order 2-6 - never skip a rung - and the
//! source's preferred method is hoisted to the front of the deterministic
//! order. The first strategy reaching the configured minimum card count
//! wins; every earlier strategy's count is recorded for insights. Strategy
//! failures are absorbed as zero-count attempts: one broken rung never
//! fails the page.
//!
//! Dependencies (feed prober, LLM) arrive by constructor injection; the
//! strategies themselves are leaf modules with no knowledge of each other.

use scraper::Html;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use event_harvester_domain::entities::ExtractionRecipe;
use event_harvester_domain::value_objects::{ParsingMethod, RawEventCard};

use crate::infrastructure::ai::LlmClient;
use crate::infrastructure::extraction::ai_fallback::{self, TargetYears};
use crate::infrastructure::extraction::cms::{self, CmsLabel};
use crate::infrastructure::extraction::feeds::FeedProber;
use crate::infrastructure::extraction::{dom, feeds, hydration, json_ld, microdata, pagination, recipe};

/// Pages smaller than this are treated as empty (error pages, shells).
const MIN_HTML_BYTES: usize = 500;

/// Everything a waterfall run needs to know about the page and source.
pub struct WaterfallInput<'a> {
    pub html: &'a str,
    pub base_url: &'a str,
    pub source_name: &'a str,
    pub preferred_method: Option<ParsingMethod>,
    pub feed_discovery: bool,
    pub dom_selectors: &'a [String],
    pub recipe: Option<&'a ExtractionRecipe>,
}

/// Result of a waterfall run.
#[derive(Debug)]
pub struct WaterfallOutcome {
    pub cards: Vec<RawEventCard>,
    pub winning_strategy: Option<ParsingMethod>,
    /// Cards per attempted strategy, losers included.
    pub per_strategy_counts: BTreeMap<String, usize>,
    pub cms_label: CmsLabel,
    /// Next-page URL, when the page advertises one.
    pub next_page: Option<String>,
}

impl WaterfallOutcome {
    fn empty(cms_label: CmsLabel) -> Self {
        Self {
            cards: Vec::new(),
            winning_strategy: None,
            per_strategy_counts: BTreeMap::new(),
            cms_label,
            next_page: None,
        }
    }
}

/// The waterfall with its injected collaborators.
pub struct ExtractionWaterfall {
    feed_prober: Option<Arc<dyn FeedProber>>,
    llm: Option<Arc<dyn LlmClient>>,
    min_cards: usize,
    target_years: TargetYears,
    ai_html_max_chars: usize,
}

impl ExtractionWaterfall {
    pub fn new(
        feed_prober: Option<Arc<dyn FeedProber>>,
        llm: Option<Arc<dyn LlmClient>>,
        min_cards: usize,
        target_years: TargetYears,
        ai_html_max_chars: usize,
    ) -> Self {
        Self {
            feed_prober,
            llm,
            min_cards,
            target_years,
            ai_html_max_chars,
        }
    }

    /// Runs the ladder over one page.
    ///
    /// The parsed DOM is scoped to synchronous blocks throughout: a
    /// `scraper::Html` is not `Send`, and this future runs on spawned
    /// worker tasks. Each strategy parses and drops its own document.
    pub async fn run(&self, input: &WaterfallInput<'_>) -> WaterfallOutcome {
        if input.html.len() < MIN_HTML_BYTES {
            debug!(bytes = input.html.len(), "page below minimum size, treating as empty");
            return WaterfallOutcome::empty(CmsLabel::Unknown);
        }

        let (cms_label, next_page, feed_candidates) = {
            let document = Html::parse_document(input.html);
            (
                cms::fingerprint(&document, input.html),
                pagination::next_page_url(&document, input.base_url),
                feeds::candidate_urls(&document, input.base_url),
            )
        };
        let order = strategy_order(cms_label, input.preferred_method);

        let mut outcome = WaterfallOutcome::empty(cms_label);
        outcome.next_page = next_page;

        for method in order {
            let cards = if method == ParsingMethod::Feed {
                self.run_feed_strategy(input, &feed_candidates).await
            } else {
                run_sync_strategy(method, input)
            };
            outcome
                .per_strategy_counts
                .insert(method.as_str().to_string(), cards.len());

            if cards.len() >= self.min_cards {
                debug!(strategy = method.as_str(), cards = cards.len(), "waterfall winner");
                outcome.winning_strategy = Some(method);
                outcome.cards = cards;
                return outcome;
            }
        }

        // Deterministic ladder dry; the AI fallback is the last resort.
        if let Some(llm) = &self.llm {
            match ai_fallback::extract(
                llm.as_ref(),
                input.html,
                input.source_name,
                self.target_years,
                self.ai_html_max_chars,
            )
            .await
            {
                Ok(cards) => {
                    outcome
                        .per_strategy_counts
                        .insert(ParsingMethod::AiFallback.as_str().to_string(), cards.len());
                    if cards.len() >= self.min_cards {
                        outcome.winning_strategy = Some(ParsingMethod::AiFallback);
                        outcome.cards = cards;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "AI fallback failed");
                    outcome
                        .per_strategy_counts
                        .insert(ParsingMethod::AiFallback.as_str().to_string(), 0);
                }
            }
        }

        outcome
    }

    async fn run_feed_strategy(
        &self,
        input: &WaterfallInput<'_>,
        candidates: &[String],
    ) -> Vec<RawEventCard> {
        if !input.feed_discovery {
            return Vec::new();
        }
        let Some(prober) = &self.feed_prober else {
            return Vec::new();
        };
        match feeds::probe_candidates(prober.as_ref(), candidates, input.base_url).await {
            Ok(cards) => cards,
            Err(e) => {
                debug!(error = %e, "feed strategy failed");
                Vec::new()
            }
        }
    }
}

/// Runs one synchronous strategy, parsing (and dropping) its own document.
fn run_sync_strategy(method: ParsingMethod, input: &WaterfallInput<'_>) -> Vec<RawEventCard> {
    let document = Html::parse_document(input.html);
    match method {
        ParsingMethod::Recipe => match input.recipe {
            Some(stored) => recipe::extract(&document, input.base_url, stored),
            None => Vec::new(),
        },
        ParsingMethod::JsonLd => json_ld::extract(&document, input.base_url),
        ParsingMethod::Microdata => microdata::extract(&document, input.base_url),
        ParsingMethod::Hydration => hydration::extract(&document, input.base_url, input.html),
        ParsingMethod::Dom => dom::extract(&document, input.base_url, input.dom_selectors),
        // Feed is async; AI runs outside the deterministic loop; heuristic
        // is a card tag, not a ladder rung.
        ParsingMethod::Feed
        | ParsingMethod::Heuristic
        | ParsingMethod::Ai
        | ParsingMethod::AiFallback => Vec::new(),
    }
}

/// Deterministic strategy order: recipe first, then the CMS
/// recommendation, with the source's preferred method hoisted to the
/// front (after recipe, which is always the trusted fast path).
fn strategy_order(cms_label: CmsLabel, preferred: Option<ParsingMethod>) -> Vec<ParsingMethod> {
    let mut order = cms_label.recommended_order();

    // Recipe leads regardless of recommendation.
    order.retain(|m| *m != ParsingMethod::Recipe);
    order.insert(0, ParsingMethod::Recipe);

    if let Some(preferred) = preferred {
        if preferred != ParsingMethod::Recipe && order.contains(&preferred) {
            order.retain(|m| *m != preferred);
            order.insert(1, preferred);
        }
    }
    order
}
