// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Queue Repository
//!
//! Queue port implementation over sqlx/SQLite. The claim is one
//! `UPDATE … WHERE id IN (SELECT …) RETURNING` statement: selection,
//! stamping, and attempt accounting happen in a single round trip, so two
//! workers claiming the same stage concurrently can never receive the same
//! row. The select-then-update pattern is deliberately absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use event_harvester_domain::entities::QueueItem;
use event_harvester_domain::error::{FailureLevel, HarvestError};
use event_harvester_domain::repositories::{QueueRepository, RetryPolicy};
use event_harvester_domain::value_objects::{Coordinates, EventId, ItemId, SourceId, Stage};

/// sqlx-backed queue repository.
#[derive(Clone)]
pub struct SqliteQueueRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    fn db_err(e: sqlx::Error) -> HarvestError {
        HarvestError::database_error(e.to_string())
    }
}

const ITEM_COLUMNS: &str = "id, source_id, source_url, detail_url, stage, claim_owner, claim_at, \
     attempts, priority, not_before, raw_html, cleaned_markdown, extracted_data, content_hash, \
     lat, lng, duplicate_of, event_id, embedding, last_failure_reason, created_at, updated_at";

fn row_to_item(row: &SqliteRow) -> Result<QueueItem, HarvestError> {
    let id = ItemId::from_string(&row.get::<String, _>("id"))?;
    let source_id = SourceId::from_string(&row.get::<String, _>("source_id"))?;
    let stage = Stage::parse(&row.get::<String, _>("stage"))?;

    let coordinates = match (row.get::<Option<f64>, _>("lat"), row.get::<Option<f64>, _>("lng")) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)?),
        _ => None,
    };

    let duplicate_of = row
        .get::<Option<String>, _>("duplicate_of")
        .map(|s| EventId::from_string(&s))
        .transpose()?;
    let event_id = row
        .get::<Option<String>, _>("event_id")
        .map(|s| EventId::from_string(&s))
        .transpose()?;

    let extracted_data = row
        .get::<Option<String>, _>("extracted_data")
        .map(|s| serde_json::from_str(&s))
        .transpose()?;
    let embedding = row
        .get::<Option<String>, _>("embedding")
        .map(|s| serde_json::from_str::<Vec<f32>>(&s))
        .transpose()?;

    QueueItem::from_storage(
        id,
        source_id,
        row.get("source_url"),
        row.get("detail_url"),
        stage,
        row.get("claim_owner"),
        row.get::<Option<DateTime<Utc>>, _>("claim_at"),
        row.get::<i64, _>("attempts") as u32,
        row.get::<i64, _>("priority") as i32,
        row.get::<Option<DateTime<Utc>>, _>("not_before"),
        row.get("raw_html"),
        row.get("cleaned_markdown"),
        extracted_data,
        row.get("content_hash"),
        coordinates,
        duplicate_of,
        event_id,
        embedding,
        row.get("last_failure_reason"),
        row.get::<DateTime<Utc>, _>("created_at"),
        row.get::<DateTime<Utc>, _>("updated_at"),
    )
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), HarvestError> {
        let embedding_json = item
            .embedding()
            .map(serde_json::to_string)
            .transpose()?;
        let extracted_json = item
            .extracted_data()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO queue_items (id, source_id, source_url, detail_url, stage, claim_owner, \
             claim_at, attempts, priority, not_before, raw_html, cleaned_markdown, extracted_data, \
             content_hash, lat, lng, duplicate_of, event_id, embedding, last_failure_reason, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id().to_string())
        .bind(item.source_id().to_string())
        .bind(item.source_url())
        .bind(item.detail_url())
        .bind(item.stage().as_str())
        .bind(item.claim().map(|c| c.owner.clone()))
        .bind(item.claim().map(|c| c.claimed_at))
        .bind(item.attempts() as i64)
        .bind(item.priority() as i64)
        .bind(item.not_before())
        .bind(item.raw_html())
        .bind(item.cleaned_markdown())
        .bind(extracted_json)
        .bind(item.content_hash())
        .bind(item.coordinates().map(|c| c.lat()))
        .bind(item.coordinates().map(|c| c.lng()))
        .bind(item.duplicate_of().map(|id| id.to_string()))
        .bind(item.event_id().map(|id| id.to_string()))
        .bind(embedding_json)
        .bind(item.last_failure_reason())
        .bind(item.created_at())
        .bind(item.updated_at())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        debug!(item_id = %item.id(), stage = %item.stage(), "enqueued item");
        Ok(())
    }

    async fn claim_for_stage(
        &self,
        stage: Stage,
        worker_id: &str,
        limit: u32,
    ) -> Result<Vec<QueueItem>, HarvestError> {
        let now = Utc::now();
        let sql = format!(
            "UPDATE queue_items \
             SET claim_owner = ?, claim_at = ?, attempts = attempts + 1, updated_at = ? \
             WHERE claim_owner IS NULL AND id IN ( \
                 SELECT id FROM queue_items \
                 WHERE stage = ? AND claim_owner IS NULL \
                   AND (not_before IS NULL OR not_before <= ?) \
                 ORDER BY COALESCE(claim_at, created_at) ASC, priority DESC \
                 LIMIT ? \
             ) \
             RETURNING {ITEM_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(worker_id)
            .bind(now)
            .bind(now)
            .bind(stage.as_str())
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)?;

        let items = rows
            .iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(stage = %stage, worker_id, claimed = items.len(), "claimed batch");
        Ok(items)
    }

    async fn advance_stage(&self, item: &QueueItem, next_stage: Stage) -> Result<(), HarvestError> {
        item.stage().check_transition(next_stage)?;

        let embedding_json = item.embedding().map(serde_json::to_string).transpose()?;
        let extracted_json = item.extracted_data().map(serde_json::to_string).transpose()?;

        // Conditional on the stored stage still matching: a mismatch means
        // some other writer touched a claimed row, which is an invariant
        // breach, not a retry case.
        // Attempts reset on advance: the retry budget is per stage.
        let result = sqlx::query(
            "UPDATE queue_items \
             SET stage = ?, claim_owner = NULL, claim_at = NULL, not_before = NULL, attempts = 0, \
                 raw_html = ?, cleaned_markdown = ?, extracted_data = ?, content_hash = ?, \
                 lat = ?, lng = ?, duplicate_of = ?, event_id = ?, embedding = ?, updated_at = ? \
             WHERE id = ? AND stage = ?",
        )
        .bind(next_stage.as_str())
        .bind(item.raw_html())
        .bind(item.cleaned_markdown())
        .bind(extracted_json)
        .bind(item.content_hash())
        .bind(item.coordinates().map(|c| c.lat()))
        .bind(item.coordinates().map(|c| c.lng()))
        .bind(item.duplicate_of().map(|id| id.to_string()))
        .bind(item.event_id().map(|id| id.to_string()))
        .bind(embedding_json)
        .bind(Utc::now())
        .bind(item.id().to_string())
        .bind(item.stage().as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        if result.rows_affected() != 1 {
            return Err(HarvestError::internal_error(format!(
                "advance of item {} from {} to {} touched {} rows",
                item.id(),
                item.stage(),
                next_stage,
                result.rows_affected()
            )));
        }
        debug!(item_id = %item.id(), from = %item.stage(), to = %next_stage, "advanced stage");
        Ok(())
    }

    async fn record_failure(
        &self,
        item_id: ItemId,
        level: FailureLevel,
        reason: &str,
    ) -> Result<(), HarvestError> {
        let now = Utc::now();

        match level {
            FailureLevel::Permanent => {
                sqlx::query(
                    "UPDATE queue_items \
                     SET stage = 'failed', claim_owner = NULL, claim_at = NULL, \
                         not_before = NULL, last_failure_reason = ?, updated_at = ? \
                     WHERE id = ? AND stage NOT IN ('indexed', 'failed')",
                )
                .bind(reason)
                .bind(now)
                .bind(item_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(Self::db_err)?;
            }
            FailureLevel::Transient => {
                // The item is claimed by the calling worker; no other writer
                // contends for it, so reading attempts for the backoff is safe.
                let attempts: Option<(i64,)> =
                    sqlx::query_as("SELECT attempts FROM queue_items WHERE id = ?")
                        .bind(item_id.to_string())
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(Self::db_err)?;
                let Some((attempts,)) = attempts else {
                    return Err(HarvestError::ItemNotFound(item_id.to_string()));
                };

                if attempts as u32 >= self.retry.max_attempts {
                    warn!(item_id = %item_id, attempts, "transient failure cap reached, failing item");
                    sqlx::query(
                        "UPDATE queue_items \
                         SET stage = 'failed', claim_owner = NULL, claim_at = NULL, \
                             not_before = NULL, last_failure_reason = ?, updated_at = ? \
                         WHERE id = ? AND stage NOT IN ('indexed', 'failed')",
                    )
                    .bind(reason)
                    .bind(now)
                    .bind(item_id.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(Self::db_err)?;
                } else {
                    let retry_at = now + self.retry.delay_for_attempt(attempts as u32);
                    sqlx::query(
                        "UPDATE queue_items \
                         SET claim_owner = NULL, claim_at = NULL, not_before = ?, \
                             last_failure_reason = ?, updated_at = ? \
                         WHERE id = ?",
                    )
                    .bind(retry_at)
                    .bind(reason)
                    .bind(now)
                    .bind(item_id.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(Self::db_err)?;
                }
            }
        }
        Ok(())
    }

    async fn reap_stalled(&self, cutoff: DateTime<Utc>) -> Result<u64, HarvestError> {
        let now = Utc::now();
        let retry_at = now + self.retry.delay_for_attempt(1);
        // Stalled claims count as transient failures: items at the attempt
        // cap go terminal, the rest are released for retry.
        sqlx::query(
            "UPDATE queue_items \
             SET stage = 'failed', claim_owner = NULL, claim_at = NULL, not_before = NULL, \
                 last_failure_reason = 'stalled claim reaped', updated_at = ? \
             WHERE claim_at IS NOT NULL AND claim_at < ? AND attempts >= ?",
        )
        .bind(now)
        .bind(cutoff)
        .bind(self.retry.max_attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        let released = sqlx::query(
            "UPDATE queue_items \
             SET claim_owner = NULL, claim_at = NULL, not_before = ?, \
                 last_failure_reason = 'stalled claim reaped', updated_at = ? \
             WHERE claim_at IS NOT NULL AND claim_at < ?",
        )
        .bind(retry_at)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        let reaped = released.rows_affected();
        if reaped > 0 {
            warn!(reaped, "reaped stalled claims");
        }
        Ok(reaped)
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<QueueItem>, HarvestError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn stage_depths(&self) -> Result<BTreeMap<Stage, u64>, HarvestError> {
        let rows = sqlx::query("SELECT stage, COUNT(*) AS depth FROM queue_items GROUP BY stage")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)?;

        let mut depths = BTreeMap::new();
        for stage in Stage::ALL {
            depths.insert(stage, 0);
        }
        for row in rows {
            let stage = Stage::parse(&row.get::<String, _>("stage"))?;
            depths.insert(stage, row.get::<i64, _>("depth") as u64);
        }
        Ok(depths)
    }

    async fn exists_for_url(&self, source_id: SourceId, url: &str) -> Result<bool, HarvestError> {
        let row = sqlx::query(
            "SELECT 1 FROM queue_items \
             WHERE source_id = ? AND (detail_url = ? OR (detail_url IS NULL AND source_url = ?)) \
             LIMIT 1",
        )
        .bind(source_id.to_string())
        .bind(url)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(row.is_some())
    }

    async fn recent_snapshots(&self, source_id: SourceId, limit: u32) -> Result<Vec<String>, HarvestError> {
        let rows = sqlx::query(
            "SELECT raw_html FROM queue_items \
             WHERE source_id = ? AND raw_html IS NOT NULL \
             ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(source_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<Option<String>, _>("raw_html"))
            .collect())
    }

    async fn retry_failed(&self, source_id: SourceId, limit: u32) -> Result<u64, HarvestError> {
        let result = sqlx::query(
            "UPDATE queue_items \
             SET stage = 'discovered', attempts = 0, not_before = NULL, \
                 last_failure_reason = NULL, updated_at = ? \
             WHERE id IN ( \
                 SELECT id FROM queue_items WHERE source_id = ? AND stage = 'failed' \
                 ORDER BY updated_at ASC LIMIT ? \
             )",
        )
        .bind(Utc::now())
        .bind(source_id.to_string())
        .bind(limit as i64)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(result.rows_affected())
    }
}
