// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fetch Failover State Machine
//!
//! Per-source, session-scoped failover from static to dynamic fetching:
//!
//! - Start in the source's configured strategy (static unless declared
//!   dynamic; `auto` is resolved by the caller from CMS fingerprint and
//!   insight history before the session starts).
//! - Transient failures (timeout, 5xx, 429, 403) retry with exponential
//!   backoff (1s, 2s, 4s… capped, max 3 attempts).
//! - When the in-session failure counter reaches the switch threshold and a
//!   dynamic fetcher is configured, the session switches to dynamic and
//!   stays there - the switch is one-way within the session.
//! - `use_proxy = true` forces dynamic for the call, bypassing the ladder.
//!
//! HTTP error statuses that survive the retry budget are returned in the
//! page, not thrown; the extraction stage decides what a persistent 403
//! means for the item.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use event_harvester_domain::entities::Source;
use event_harvester_domain::HarvestError;

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::fetch::client::{FetchedPage, StaticFetcher};
use crate::infrastructure::fetch::dynamic::DynamicFetcher;
use crate::infrastructure::fetch::rate_limiter::{host_key, HostRateLimiter};

/// In-session failures before the one-way switch to dynamic.
const DYNAMIC_SWITCH_THRESHOLD: u32 = 3;

/// Seam over the static fetcher so the state machine is testable without a
/// network.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get(&self, url: &str, language: &str) -> Result<FetchedPage, HarvestError>;
}

#[async_trait]
impl PageSource for StaticFetcher {
    async fn get(&self, url: &str, language: &str) -> Result<FetchedPage, HarvestError> {
        self.fetch(url, language).await
    }
}

/// Which rung of the ladder a session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Static,
    Dynamic,
}

/// Process-wide fetch dependencies; sessions borrow these per source run.
pub struct FetchService {
    static_fetcher: Arc<dyn PageSource>,
    dynamic_fetcher: Option<Arc<dyn DynamicFetcher>>,
    limiter: Arc<HostRateLimiter>,
    config: FetchConfig,
}

impl FetchService {
    pub fn new(
        static_fetcher: Arc<dyn PageSource>,
        dynamic_fetcher: Option<Arc<dyn DynamicFetcher>>,
        limiter: Arc<HostRateLimiter>,
        config: FetchConfig,
    ) -> Self {
        Self {
            static_fetcher,
            dynamic_fetcher,
            limiter,
            config,
        }
    }

    pub fn has_dynamic(&self) -> bool {
        self.dynamic_fetcher.is_some()
    }

    /// Opens a session for one source run, starting on the given rung.
    /// A declared-dynamic source without a configured renderer degrades to
    /// static rather than failing outright.
    pub fn session(self: &Arc<Self>, initial_mode: FetchMode) -> FetchSession {
        let mode = match initial_mode {
            FetchMode::Dynamic if self.dynamic_fetcher.is_none() => {
                warn!("source declares a dynamic strategy but no renderer is configured; using static");
                FetchMode::Static
            }
            other => other,
        };
        FetchSession {
            service: Arc::clone(self),
            mode,
            session_failures: 0,
        }
    }
}

/// Session-scoped failover state for one source run.
pub struct FetchSession {
    service: Arc<FetchService>,
    mode: FetchMode,
    session_failures: u32,
}

impl FetchSession {
    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Fetches one page under the session's current mode, retrying
    /// transient failures and escalating to dynamic when the ladder says so.
    pub async fn fetch_page(
        &mut self,
        url: &str,
        source: &Source,
        use_proxy: bool,
    ) -> Result<FetchedPage, HarvestError> {
        if use_proxy {
            return self.fetch_dynamic_forced(url).await;
        }

        let mut last_result: Option<Result<FetchedPage, HarvestError>> = None;

        loop {
            let mode = self.mode;
            for attempt in 1..=self.service.config.max_attempts {
                self.service
                    .limiter
                    .acquire(&host_key(url), source.rate_limit_ms())
                    .await;

                let result = self.fetch_once(url, source).await;
                match &result {
                    Ok(page) if !is_transient_status(page.status_code) => return result,
                    Ok(page) => {
                        self.session_failures += 1;
                        debug!(
                            url,
                            status = page.status_code,
                            attempt,
                            session_failures = self.session_failures,
                            "transient HTTP status"
                        );
                    }
                    Err(e) if e.failure_level().map(|l| l == event_harvester_domain::FailureLevel::Permanent).unwrap_or(false) => {
                        return result;
                    }
                    Err(e) => {
                        self.session_failures += 1;
                        debug!(url, error = %e, attempt, "transient fetch failure");
                    }
                }
                last_result = Some(result);

                if attempt < self.service.config.max_attempts {
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
            }

            // Retry budget exhausted on this rung. Escalate once if the
            // ladder allows; otherwise surface what we have.
            if mode == FetchMode::Static
                && self.session_failures >= DYNAMIC_SWITCH_THRESHOLD
                && self.service.has_dynamic()
            {
                warn!(url, "switching session to dynamic fetching");
                self.mode = FetchMode::Dynamic;
                continue;
            }

            return match last_result {
                Some(result) => result,
                None => Err(HarvestError::internal_error("fetch loop ran zero attempts")),
            };
        }
    }

    async fn fetch_once(&self, url: &str, source: &Source) -> Result<FetchedPage, HarvestError> {
        match self.mode {
            FetchMode::Static => self.service.static_fetcher.get(url, source.language()).await,
            FetchMode::Dynamic => match &self.service.dynamic_fetcher {
                Some(dynamic) => dynamic.fetch_rendered(url).await,
                None => self.service.static_fetcher.get(url, source.language()).await,
            },
        }
    }

    async fn fetch_dynamic_forced(&mut self, url: &str) -> Result<FetchedPage, HarvestError> {
        let Some(dynamic) = self.service.dynamic_fetcher.clone() else {
            return Err(HarvestError::fetch_transient(
                "use_proxy requested but no render service is configured",
            ));
        };
        self.mode = FetchMode::Dynamic;
        dynamic.fetch_rendered(url).await
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let secs = 1u64 << attempt.saturating_sub(1).min(6);
        Duration::from_secs(secs.min(self.service.config.max_backoff_secs))
    }
}

/// Statuses the failover machinery retries: rate limits, auth walls that
/// often clear under a rendered fetch, and server errors.
fn is_transient_status(status: u16) -> bool {
    status == 403 || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    struct ScriptedStatic {
        statuses: Mutex<Vec<u16>>,
        calls: Mutex<u32>,
    }

    impl ScriptedStatic {
        fn new(statuses: Vec<u16>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedStatic {
        async fn get(&self, url: &str, _language: &str) -> Result<FetchedPage, HarvestError> {
            *self.calls.lock() += 1;
            let status = {
                let mut statuses = self.statuses.lock();
                if statuses.is_empty() {
                    200
                } else {
                    statuses.remove(0)
                }
            };
            Ok(FetchedPage {
                html: "<html>static</html>".into(),
                final_url: url.to_string(),
                status_code: status,
                headers: BTreeMap::new(),
            })
        }
    }

    struct StubDynamic;

    #[async_trait]
    impl DynamicFetcher for StubDynamic {
        async fn fetch_rendered(&self, url: &str) -> Result<FetchedPage, HarvestError> {
            Ok(FetchedPage {
                html: "<html>hydrated</html>".into(),
                final_url: url.to_string(),
                status_code: 200,
                headers: BTreeMap::new(),
            })
        }
    }

    fn config() -> FetchConfig {
        FetchConfig {
            max_backoff_secs: 0, // no real sleeping in tests
            ..FetchConfig::default()
        }
    }

    fn source() -> Source {
        let mut source = Source::new("Test", "https://example.nl").unwrap();
        source.set_rate_limit_ms(0);
        source
    }

    #[tokio::test]
    async fn test_clean_static_fetch_stays_static() {
        let service = Arc::new(FetchService::new(
            Arc::new(ScriptedStatic::new(vec![200])),
            Some(Arc::new(StubDynamic)),
            Arc::new(HostRateLimiter::new()),
            config(),
        ));
        let mut session = service.session(FetchMode::Static);
        let page = session.fetch_page("https://example.nl", &source(), false).await.unwrap();
        assert_eq!(page.status_code, 200);
        assert_eq!(session.mode(), FetchMode::Static);
    }

    #[tokio::test]
    async fn test_static_403s_escalate_to_dynamic() {
        // Three 403s exhaust the static budget; the fourth attempt is
        // rendered, and the session stays dynamic.
        let service = Arc::new(FetchService::new(
            Arc::new(ScriptedStatic::new(vec![403, 403, 403])),
            Some(Arc::new(StubDynamic)),
            Arc::new(HostRateLimiter::new()),
            config(),
        ));
        let mut session = service.session(FetchMode::Static);
        let page = session.fetch_page("https://example.nl", &source(), false).await.unwrap();
        assert_eq!(page.status_code, 200);
        assert!(page.html.contains("hydrated"));
        assert_eq!(session.mode(), FetchMode::Dynamic);

        // Subsequent fetches in the session go straight to dynamic.
        let page = session.fetch_page("https://example.nl/p2", &source(), false).await.unwrap();
        assert!(page.html.contains("hydrated"));
    }

    #[tokio::test]
    async fn test_no_dynamic_returns_final_error_page() {
        let service = Arc::new(FetchService::new(
            Arc::new(ScriptedStatic::new(vec![503, 503, 503])),
            None,
            Arc::new(HostRateLimiter::new()),
            config(),
        ));
        let mut session = service.session(FetchMode::Static);
        let page = session.fetch_page("https://example.nl", &source(), false).await.unwrap();
        // ≥400 is returned, not thrown; the caller decides.
        assert_eq!(page.status_code, 503);
        assert_eq!(session.mode(), FetchMode::Static);
    }

    #[tokio::test]
    async fn test_use_proxy_forces_dynamic() {
        let scripted = Arc::new(ScriptedStatic::new(vec![200]));
        let service = Arc::new(FetchService::new(
            scripted.clone(),
            Some(Arc::new(StubDynamic)),
            Arc::new(HostRateLimiter::new()),
            config(),
        ));
        let mut session = service.session(FetchMode::Static);
        let page = session.fetch_page("https://example.nl", &source(), true).await.unwrap();
        assert!(page.html.contains("hydrated"));
        assert_eq!(*scripted.calls.lock(), 0, "static fetcher must be bypassed");
    }

    #[tokio::test]
    async fn test_declared_dynamic_without_renderer_degrades() {
        let service = Arc::new(FetchService::new(
            Arc::new(ScriptedStatic::new(vec![200])),
            None,
            Arc::new(HostRateLimiter::new()),
            config(),
        ));
        let session = service.session(FetchMode::Dynamic);
        assert_eq!(session.mode(), FetchMode::Static);
    }
}
