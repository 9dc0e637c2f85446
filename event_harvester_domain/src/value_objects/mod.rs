// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Immutable, validated value objects shared across the domain.

pub mod category;
pub mod coordinates;
pub mod fingerprint;
pub mod ids;
pub mod price;
pub mod quality_score;
pub mod raw_card;
pub mod stage;

pub use category::Category;
pub use coordinates::Coordinates;
pub use fingerprint::{content_hash, event_fingerprint, Digest256};
pub use ids::{EventId, ItemId, SourceId};
pub use price::PriceInfo;
pub use quality_score::QualityScore;
pub use raw_card::{ParsingMethod, RawEventCard, TrustLevel};
pub use stage::Stage;
