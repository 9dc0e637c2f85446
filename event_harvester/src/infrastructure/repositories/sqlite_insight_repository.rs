// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite insight and healing-log repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use event_harvester_domain::entities::{HealingAttempt, HealingOutcome, SourceInsight};
use event_harvester_domain::error::HarvestError;
use event_harvester_domain::repositories::InsightRepository;
use event_harvester_domain::value_objects::{ItemId, ParsingMethod, SourceId};

#[derive(Clone)]
pub struct SqliteInsightRepository {
    pool: SqlitePool,
}

impl SqliteInsightRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_err(e: sqlx::Error) -> HarvestError {
        HarvestError::database_error(e.to_string())
    }
}

fn parse_method(s: &str) -> Result<ParsingMethod, HarvestError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| HarvestError::validation(format!("unknown parsing method '{}'", s)))
}

#[async_trait]
impl InsightRepository for SqliteInsightRepository {
    async fn record_insight(&self, insight: &SourceInsight) -> Result<(), HarvestError> {
        let counts = serde_json::to_string(&insight.per_strategy_counts)?;
        sqlx::query(
            "INSERT INTO source_insights (source_id, item_id, cms_label, winning_strategy, \
             per_strategy_counts, fetch_ms, parse_ms, html_bytes, events_extracted, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(insight.source_id.to_string())
        .bind(insight.item_id.to_string())
        .bind(&insight.cms_label)
        .bind(insight.winning_strategy.map(|s| s.as_str().to_string()))
        .bind(counts)
        .bind(insight.fetch_ms as i64)
        .bind(insight.parse_ms as i64)
        .bind(insight.html_bytes as i64)
        .bind(insight.events_extracted as i64)
        .bind(insight.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn record_healing_attempt(&self, attempt: &HealingAttempt) -> Result<(), HarvestError> {
        let outcome = match attempt.outcome {
            HealingOutcome::Applied => "applied",
            HealingOutcome::Rejected => "rejected",
            HealingOutcome::Deferred => "deferred",
        };
        sqlx::query(
            "INSERT INTO healing_log (source_id, trigger_failures, old_selector_matches, \
             new_selector_matches, outcome, confidence, reasoning, attempted_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(attempt.source_id.to_string())
        .bind(attempt.trigger_failures as i64)
        .bind(attempt.old_selector_matches as i64)
        .bind(attempt.new_selector_matches as i64)
        .bind(outcome)
        .bind(attempt.confidence)
        .bind(&attempt.reasoning)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn latest_winning_strategy(
        &self,
        source_id: SourceId,
    ) -> Result<Option<ParsingMethod>, HarvestError> {
        let row = sqlx::query(
            "SELECT winning_strategy FROM source_insights \
             WHERE source_id = ? AND winning_strategy IS NOT NULL \
             ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(source_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_err)?;

        row.and_then(|r| r.get::<Option<String>, _>("winning_strategy"))
            .map(|s| parse_method(&s))
            .transpose()
    }

    async fn recent_insights(
        &self,
        source_id: SourceId,
        limit: u32,
    ) -> Result<Vec<SourceInsight>, HarvestError> {
        let rows = sqlx::query(
            "SELECT source_id, item_id, cms_label, winning_strategy, per_strategy_counts, \
             fetch_ms, parse_ms, html_bytes, events_extracted, recorded_at \
             FROM source_insights WHERE source_id = ? ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(source_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err)?;

        rows.into_iter()
            .map(|row| {
                let per_strategy_counts: BTreeMap<String, usize> =
                    serde_json::from_str(&row.get::<String, _>("per_strategy_counts"))?;
                let winning_strategy = row
                    .get::<Option<String>, _>("winning_strategy")
                    .map(|s| parse_method(&s))
                    .transpose()?;
                Ok(SourceInsight {
                    source_id: SourceId::from_string(&row.get::<String, _>("source_id"))?,
                    item_id: ItemId::from_string(&row.get::<String, _>("item_id"))?,
                    cms_label: row.get("cms_label"),
                    winning_strategy,
                    per_strategy_counts,
                    fetch_ms: row.get::<i64, _>("fetch_ms") as u64,
                    parse_ms: row.get::<i64, _>("parse_ms") as u64,
                    html_bytes: row.get::<i64, _>("html_bytes") as usize,
                    events_extracted: row.get::<i64, _>("events_extracted") as usize,
                    recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;

    #[tokio::test]
    async fn test_insight_round_trip_and_latest_strategy() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteInsightRepository::new(pool);
        let source_id = SourceId::new();

        let mut insight = SourceInsight::new(source_id, ItemId::new());
        insight.cms_label = Some("wordpress".into());
        insight.winning_strategy = Some(ParsingMethod::JsonLd);
        insight.per_strategy_counts.insert("json_ld".into(), 5);
        insight.per_strategy_counts.insert("dom".into(), 0);
        insight.events_extracted = 5;
        repo.record_insight(&insight).await.unwrap();

        let latest = repo.latest_winning_strategy(source_id).await.unwrap();
        assert_eq!(latest, Some(ParsingMethod::JsonLd));

        let recent = repo.recent_insights(source_id, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].per_strategy_counts["json_ld"], 5);
        assert_eq!(recent[0].cms_label.as_deref(), Some("wordpress"));
    }

    #[tokio::test]
    async fn test_healing_log_insert() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteInsightRepository::new(pool);

        let attempt = HealingAttempt {
            source_id: SourceId::new(),
            trigger_failures: 3,
            old_selector_matches: 0,
            new_selector_matches: 7,
            outcome: HealingOutcome::Applied,
            confidence: Some(0.9),
            reasoning: Some("container class renamed".into()),
            attempted_at: Utc::now(),
        };
        repo.record_healing_attempt(&attempt).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_strategy_when_no_insights() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteInsightRepository::new(pool);
        assert!(repo.latest_winning_strategy(SourceId::new()).await.unwrap().is_none());
    }
}
