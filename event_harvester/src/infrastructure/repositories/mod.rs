// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! sqlx/SQLite implementations of the domain repository ports.

pub mod schema;
pub mod sqlite_event_repository;
pub mod sqlite_geocode_cache;
pub mod sqlite_insight_repository;
pub mod sqlite_queue_repository;
pub mod sqlite_source_repository;

pub use sqlite_event_repository::SqliteEventRepository;
pub use sqlite_geocode_cache::SqliteGeocodeCache;
pub use sqlite_insight_repository::SqliteInsightRepository;
pub use sqlite_queue_repository::SqliteQueueRepository;
pub use sqlite_source_repository::SqliteSourceRepository;
