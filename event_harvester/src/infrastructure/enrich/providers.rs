// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Geocoding Provider Pool
//!
//! Round-robin over the configured providers, each with its own minimum
//! inter-request delay and cool-down state. A provider in cool-down is
//! skipped; when every provider is cooling, the one with the shortest
//! remaining wait is used (after waiting it out). A 429 puts the provider
//! into cool-down for its `Retry-After`.
//!
//! One pool instance per process, injected - the round-robin cursor is the
//! only shared mutable state and lives behind the pool's own lock.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use event_harvester_domain::value_objects::Coordinates;
use event_harvester_domain::HarvestError;

use crate::infrastructure::config::GeocodeProviderConfig;

/// Attempts per query before the pool gives up.
const MAX_PROVIDER_ATTEMPTS: usize = 3;

/// Outcome of one provider call.
#[derive(Debug)]
pub enum GeocodeAttempt {
    Found(Coordinates),
    NotFound,
    /// Provider asked us to back off; honor `Retry-After`.
    RateLimited { retry_after: Duration },
    Failed(String),
}

/// Seam for one geocoding backend.
#[async_trait]
pub trait GeocodeBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn geocode(&self, query: &str) -> GeocodeAttempt;
}

/// Nominatim-style HTTP backend: `GET {endpoint}?q={query}&format=json&limit=1`.
pub struct HttpGeocodeBackend {
    client: reqwest::Client,
    config: GeocodeProviderConfig,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

impl HttpGeocodeBackend {
    pub fn new(config: GeocodeProviderConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("event-harvester/1.0")
            .build()
            .map_err(|e| {
                HarvestError::invalid_config(format!("failed to build geocode client: {}", e))
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl GeocodeBackend for HttpGeocodeBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn geocode(&self, query: &str) -> GeocodeAttempt {
        let mut url = format!(
            "{}?q={}&format=json&limit=1",
            self.config.endpoint,
            urlencoding::encode(query)
        );
        if let Some(key) = &self.config.api_key {
            url.push_str(&format!("&key={}", urlencoding::encode(key)));
        }

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return GeocodeAttempt::Failed(e.to_string()),
        };

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            return GeocodeAttempt::RateLimited { retry_after };
        }
        if !response.status().is_success() {
            return GeocodeAttempt::Failed(format!("status {}", response.status()));
        }

        let hits: Vec<GeocodeHit> = match response.json().await {
            Ok(hits) => hits,
            Err(e) => return GeocodeAttempt::Failed(format!("bad body: {}", e)),
        };
        let Some(hit) = hits.first() else {
            return GeocodeAttempt::NotFound;
        };
        let (Ok(lat), Ok(lng)) = (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) else {
            return GeocodeAttempt::Failed("unparseable coordinates".into());
        };
        match Coordinates::new(lat, lng) {
            Ok(coordinates) => GeocodeAttempt::Found(coordinates),
            Err(_) => GeocodeAttempt::NotFound,
        }
    }
}

struct ProviderState {
    backend: Arc<dyn GeocodeBackend>,
    min_delay: Duration,
    /// Earliest instant the provider may be called again.
    next_allowed: Mutex<Instant>,
}

impl ProviderState {
    fn remaining_wait(&self, now: Instant) -> Duration {
        self.next_allowed.lock().saturating_duration_since(now)
    }

    fn reserve(&self, now: Instant) {
        *self.next_allowed.lock() = now + self.min_delay;
    }

    fn cool_down(&self, duration: Duration) {
        let mut next = self.next_allowed.lock();
        let candidate = Instant::now() + duration;
        if candidate > *next {
            *next = candidate;
        }
    }
}

/// The round-robin pool.
pub struct GeocodeProviderPool {
    providers: Vec<ProviderState>,
    cursor: Mutex<usize>,
}

impl GeocodeProviderPool {
    pub fn new(backends: Vec<(Arc<dyn GeocodeBackend>, Duration)>) -> Self {
        let now = Instant::now();
        Self {
            providers: backends
                .into_iter()
                .map(|(backend, min_delay)| ProviderState {
                    backend,
                    min_delay,
                    next_allowed: Mutex::new(now),
                })
                .collect(),
            cursor: Mutex::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolves a query through the pool: up to three provider attempts,
    /// skipping cooling providers, waiting out the shortest cool-down when
    /// everyone is cooling.
    pub async fn resolve(&self, query: &str) -> Result<Option<(Coordinates, String)>, HarvestError> {
        if self.providers.is_empty() {
            return Ok(None);
        }

        for _ in 0..MAX_PROVIDER_ATTEMPTS.min(self.providers.len().max(1)) {
            let index = self.pick_provider();
            let provider = &self.providers[index];

            let wait = provider.remaining_wait(Instant::now());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            provider.reserve(Instant::now());

            match provider.backend.geocode(query).await {
                GeocodeAttempt::Found(coordinates) => {
                    debug!(provider = provider.backend.name(), query, "geocode hit");
                    return Ok(Some((coordinates, provider.backend.name().to_string())));
                }
                GeocodeAttempt::NotFound => {
                    debug!(provider = provider.backend.name(), query, "geocode miss");
                    return Ok(None);
                }
                GeocodeAttempt::RateLimited { retry_after } => {
                    warn!(
                        provider = provider.backend.name(),
                        ?retry_after,
                        "geocode provider rate limited"
                    );
                    provider.cool_down(retry_after);
                }
                GeocodeAttempt::Failed(reason) => {
                    debug!(provider = provider.backend.name(), reason, "geocode provider failed");
                }
            }
        }
        Ok(None)
    }

    /// Next provider round-robin, preferring one that is not cooling; when
    /// all cool, the shortest remaining wait wins.
    fn pick_provider(&self) -> usize {
        let mut cursor = self.cursor.lock();
        let now = Instant::now();
        let count = self.providers.len();

        for offset in 0..count {
            let index = (*cursor + offset) % count;
            if self.providers[index].remaining_wait(now).is_zero() {
                *cursor = (index + 1) % count;
                return index;
            }
        }

        let index = (0..count)
            .min_by_key(|i| self.providers[*i].remaining_wait(now))
            .unwrap_or(0);
        *cursor = (index + 1) % count;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        name: String,
        attempts: Mutex<Vec<GeocodeAttempt>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(name: &str, attempts: Vec<GeocodeAttempt>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                attempts: Mutex::new(attempts),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl GeocodeBackend for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn geocode(&self, _query: &str) -> GeocodeAttempt {
            *self.calls.lock() += 1;
            let mut attempts = self.attempts.lock();
            if attempts.is_empty() {
                GeocodeAttempt::NotFound
            } else {
                attempts.remove(0)
            }
        }
    }

    fn coords() -> Coordinates {
        Coordinates::new(52.3622, 4.8832).unwrap()
    }

    #[tokio::test]
    async fn test_first_provider_hit() {
        let a = Scripted::new("primary", vec![GeocodeAttempt::Found(coords())]);
        let pool = GeocodeProviderPool::new(vec![(a.clone(), Duration::ZERO)]);

        let (found, provider) = pool.resolve("paradiso amsterdam").await.unwrap().unwrap();
        assert!(found.approx_eq(&coords()));
        assert_eq!(provider, "primary");
    }

    #[tokio::test]
    async fn test_failed_provider_rotates_to_next() {
        let a = Scripted::new("flaky", vec![GeocodeAttempt::Failed("boom".into())]);
        let b = Scripted::new("backup", vec![GeocodeAttempt::Found(coords())]);
        let pool = GeocodeProviderPool::new(vec![
            (a.clone(), Duration::ZERO),
            (b.clone(), Duration::ZERO),
        ]);

        let result = pool.resolve("query").await.unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().1, "backup");
    }

    #[tokio::test]
    async fn test_rate_limited_provider_skipped() {
        let a = Scripted::new(
            "limited",
            vec![GeocodeAttempt::RateLimited {
                retry_after: Duration::from_secs(300),
            }],
        );
        let b = Scripted::new("open", vec![GeocodeAttempt::Found(coords())]);
        let pool = GeocodeProviderPool::new(vec![
            (a.clone(), Duration::ZERO),
            (b.clone(), Duration::ZERO),
        ]);

        // First attempt hits the limited provider, which cools down; the
        // second attempt must land on the open one.
        let result = pool.resolve("query").await.unwrap();
        assert_eq!(result.unwrap().1, "open");

        // A new query must not touch the cooling provider at all.
        let _ = pool.resolve("query2").await.unwrap();
        assert_eq!(*a.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_resolves_none() {
        let pool = GeocodeProviderPool::new(vec![]);
        assert!(pool.resolve("query").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_definitive() {
        // NotFound means the provider answered; rotating to another
        // provider for the same query would just re-ask the same question.
        let a = Scripted::new("answers", vec![GeocodeAttempt::NotFound]);
        let b = Scripted::new("untouched", vec![GeocodeAttempt::Found(coords())]);
        let pool = GeocodeProviderPool::new(vec![
            (a.clone(), Duration::ZERO),
            (b.clone(), Duration::ZERO),
        ]);

        assert!(pool.resolve("query").await.unwrap().is_none());
        assert_eq!(*b.calls.lock(), 0);
    }
}
