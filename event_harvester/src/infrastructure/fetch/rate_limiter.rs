// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shared Per-Host Rate Limiter
//!
//! One limiter instance per process, injected into every fetching
//! component. Each host gets a minimum inter-request delay (source-
//! configured, default 200ms) with ±20% jitter so parallel workers don't
//! fall into lockstep against the same origin.
//!
//! The "last request" timestamps live behind a parking_lot mutex; the wait
//! itself happens outside the lock. Reserving the next slot under the lock
//! keeps concurrent waiters from all sleeping until the same instant.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Jitter applied to every delay: ±20%.
const JITTER_FRACTION: f64 = 0.2;

/// Process-wide per-host limiter.
pub struct HostRateLimiter {
    /// host → earliest instant the next request may start.
    next_allowed: Mutex<HashMap<String, Instant>>,
}

impl HostRateLimiter {
    pub fn new() -> Self {
        Self {
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until a request to `host` is allowed, then reserves the
    /// following slot `min_delay_ms` (jittered) later.
    pub async fn acquire(&self, host: &str, min_delay_ms: u64) {
        let wait = {
            let mut table = self.next_allowed.lock();
            let now = Instant::now();
            let start = table
                .get(host)
                .copied()
                .filter(|next| *next > now)
                .unwrap_or(now);
            let delay = jittered(min_delay_ms);
            table.insert(host.to_string(), start + delay);
            start.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Drops hosts whose reservation has long passed; bounded memory over
    /// thousands of sources.
    pub fn compact(&self) {
        let now = Instant::now();
        self.next_allowed
            .lock()
            .retain(|_, next| *next + Duration::from_secs(600) > now);
    }
}

impl Default for HostRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn jittered(min_delay_ms: u64) -> Duration {
    let jitter = rand::rng().random_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let ms = (min_delay_ms as f64 * (1.0 + jitter)).max(0.0);
    Duration::from_millis(ms as u64)
}

/// Extracts the host from a URL for limiter keying; falls back to the full
/// URL string when parsing fails so unparseable URLs still rate-limit.
pub fn host_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_within_bounds() {
        for _ in 0..100 {
            let d = jittered(200);
            assert!(d >= Duration::from_millis(160), "jitter below -20%: {:?}", d);
            assert!(d <= Duration::from_millis(240), "jitter above +20%: {:?}", d);
        }
    }

    #[test]
    fn test_host_key() {
        assert_eq!(host_key("https://www.paradiso.nl/agenda?page=2"), "www.paradiso.nl");
        assert_eq!(host_key("not a url"), "not a url");
    }

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = HostRateLimiter::new();
        let start = Instant::now();
        limiter.acquire("example.nl", 200).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let limiter = HostRateLimiter::new();
        limiter.acquire("example.nl", 100).await;
        let start = Instant::now();
        limiter.acquire("example.nl", 100).await;
        // At least the -20% jittered floor.
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new();
        limiter.acquire("a.example.nl", 500).await;
        let start = Instant::now();
        limiter.acquire("b.example.nl", 500).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
