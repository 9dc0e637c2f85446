// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Harvester Domain Layer
//!
//! Pure business logic for the event-ingestion pipeline: entities, value
//! objects, domain services, the error taxonomy, and the repository ports
//! the infrastructure layer implements.
//!
//! ## Layering Rules
//!
//! This crate has no tokio runtime, no database driver, and no HTTP client.
//! CPU-bound domain services (date parsing, classification, fingerprinting,
//! merging) are synchronous; only the repository ports are async, because
//! they describe I/O seams.
//!
//! ## Module Map
//!
//! - [`entities`] - identity-bearing aggregates: sources, queue items,
//!   event records, recipes, insights
//! - [`value_objects`] - validated immutable values: stages, categories,
//!   coordinates, identity hashes, typed IDs
//! - [`services`] - the normalizer family and the golden-record merge policy
//! - [`repositories`] - async storage ports
//! - [`error`] - the `HarvestError` taxonomy

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::{FailureLevel, HarvestError};
