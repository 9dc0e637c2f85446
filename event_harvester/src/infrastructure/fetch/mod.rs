// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Fetch subsystem: static client, dynamic render-service client, shared
//! per-host rate limiting, and the session-scoped failover state machine.

pub mod client;
pub mod dynamic;
pub mod failover;
pub mod rate_limiter;

pub use client::{FetchedPage, StaticFetcher};
pub use dynamic::{DynamicFetcher, RenderServiceFetcher};
pub use failover::{FetchMode, FetchService, FetchSession, PageSource};
pub use rate_limiter::{host_key, HostRateLimiter};
