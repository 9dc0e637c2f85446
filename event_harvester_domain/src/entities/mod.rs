// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Identity-bearing domain entities.

pub mod event_record;
pub mod extraction_recipe;
pub mod geocode_entry;
pub mod insight;
pub mod queue_item;
pub mod source;

pub use event_record::{EnrichedEvent, EventRecord, NormalizedEvent, EMBEDDING_DIM, TIME_TBD};
pub use extraction_recipe::{ExtractionRecipe, RecipeOrigin};
pub use geocode_entry::GeocodeCacheEntry;
pub use insight::{HealingAttempt, HealingOutcome, SourceInsight};
pub use queue_item::{Claim, QueueItem, MARKDOWN_MAX_BYTES, RAW_HTML_MAX_BYTES};
pub use source::{FetchStrategyKind, Source, SourceTier};
