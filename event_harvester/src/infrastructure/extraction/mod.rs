// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The extraction waterfall and its strategy modules. Strategies are leaf
//! modules wired together only by the waterfall orchestrator.

pub mod ai_fallback;
pub mod cms;
pub mod dom;
pub mod feeds;
pub mod hydration;
pub mod json_ld;
pub mod microdata;
pub mod pagination;
pub mod recipe;
pub mod support;
pub mod waterfall;

pub use ai_fallback::TargetYears;
pub use cms::CmsLabel;
pub use feeds::FeedProber;
pub use waterfall::{ExtractionWaterfall, WaterfallInput, WaterfallOutcome};
