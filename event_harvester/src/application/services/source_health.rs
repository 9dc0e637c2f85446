// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Health Accounting
//!
//! Central writer for per-source health: every terminal stage transition
//! routes through here. Success resets the consecutive-failure counter and
//! reschedules the source; failure decays reliability and, past the
//! quarantine budget, quarantines the source and fires an alert.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use event_harvester_domain::repositories::SourceRepository;
use event_harvester_domain::value_objects::SourceId;
use event_harvester_domain::HarvestError;

use crate::infrastructure::notify::SlackNotifier;

pub struct SourceHealthService {
    sources: Arc<dyn SourceRepository>,
    notifier: SlackNotifier,
    quarantine_threshold: u32,
    scrape_interval_hours: i64,
}

impl SourceHealthService {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        notifier: SlackNotifier,
        quarantine_threshold: u32,
        scrape_interval_hours: i64,
    ) -> Self {
        Self {
            sources,
            notifier,
            quarantine_threshold,
            scrape_interval_hours,
        }
    }

    /// Records a successful extraction run and reschedules the source.
    pub async fn record_success(&self, source_id: SourceId, events_extracted: u64) -> Result<(), HarvestError> {
        let Some(mut source) = self.sources.find_by_id(source_id).await? else {
            return Err(HarvestError::SourceNotFound(source_id.to_string()));
        };
        let now = Utc::now();
        source.record_success(events_extracted, now);
        source.schedule_next(now + Duration::hours(self.scrape_interval_hours));
        self.sources.save(&source).await?;
        Ok(())
    }

    /// Records a failed run. Returns the new consecutive-failure count so
    /// the caller can decide whether healing is due.
    pub async fn record_failure(&self, source_id: SourceId, reason: &str) -> Result<u32, HarvestError> {
        let Some(mut source) = self.sources.find_by_id(source_id).await? else {
            return Err(HarvestError::SourceNotFound(source_id.to_string()));
        };
        source.record_failure(Utc::now());
        let failures = source.consecutive_failures();

        if failures >= self.quarantine_threshold && !source.quarantined() {
            source.quarantine();
            warn!(
                source = source.name(),
                failures, "source quarantined after exceeding the healing budget"
            );
            self.notifier
                .alert(&format!(
                    "Source '{}' quarantined after {} consecutive failures (last: {})",
                    source.name(),
                    failures,
                    reason
                ))
                .await;
        } else {
            info!(source = source.name(), failures, reason, "source failure recorded");
        }

        self.sources.save(&source).await?;
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{schema, SqliteSourceRepository};
    use event_harvester_domain::entities::Source;

    async fn service() -> (SourceHealthService, Arc<SqliteSourceRepository>, SourceId) {
        let pool = schema::in_memory_database().await.unwrap();
        let sources = Arc::new(SqliteSourceRepository::new(pool));
        let source = Source::new("Test", "https://example.nl").unwrap();
        sources.save(&source).await.unwrap();
        let service = SourceHealthService::new(sources.clone(), SlackNotifier::new(None), 3, 24);
        (service, sources, source.id())
    }

    #[tokio::test]
    async fn test_success_resets_and_reschedules() {
        let (service, sources, id) = service().await;
        service.record_failure(id, "x").await.unwrap();
        service.record_success(id, 5).await.unwrap();

        let source = sources.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(source.consecutive_failures(), 0);
        assert_eq!(source.total_events_extracted(), 5);
        assert!(source.next_scrape_at().unwrap() > Utc::now() + Duration::hours(23));
    }

    #[tokio::test]
    async fn test_quarantine_at_threshold() {
        let (service, sources, id) = service().await;
        for _ in 0..2 {
            service.record_failure(id, "extraction empty").await.unwrap();
        }
        assert!(!sources.find_by_id(id).await.unwrap().unwrap().quarantined());

        let failures = service.record_failure(id, "extraction empty").await.unwrap();
        assert_eq!(failures, 3);
        assert!(sources.find_by_id(id).await.unwrap().unwrap().quarantined());
    }
}
