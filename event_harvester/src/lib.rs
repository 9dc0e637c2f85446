// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Harvester
//!
//! A staged event-ingestion pipeline: discovers, fetches, extracts,
//! normalizes, deduplicates, enriches, embeds, and persists public-event
//! listings from heterogeneous city and venue websites.
//!
//! ## Architecture
//!
//! The pipeline is pull-based over a single durable queue table; the
//! datastore is the broker. Each queue item is one candidate event URL
//! moving monotonically through the stage machine; workers claim batches
//! with a single-statement CAS, do bounded work, and advance or record
//! failure.
//!
//! - **Application layer** ([`application`]): stage workers, coordinator,
//!   source health, trigger contracts, composition root
//! - **Infrastructure layer** ([`infrastructure`]): SQLite repositories,
//!   the fetch subsystem with static→dynamic failover, the extraction
//!   waterfall, the hybrid geocoder, provider clients, self-healing,
//!   Prometheus metrics
//! - **Domain layer** (`event-harvester-domain`): entities, value
//!   objects, the normalizer family, merge policy, repository ports
//! - **Bootstrap** (`event-harvester-bootstrap`): CLI, signals, shutdown,
//!   exit codes

pub mod application;
pub mod infrastructure;

pub use application::services::HarvesterRuntime;
pub use infrastructure::config::HarvestConfig;
