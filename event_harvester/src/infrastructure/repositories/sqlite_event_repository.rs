// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Event Repository
//!
//! Canonical-event storage. Inserts report a fingerprint-uniqueness
//! conflict as `InsertOutcome::DuplicateRace` with the winner's id - the
//! race is a successful duplicate, never an error surfaced to the worker.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use event_harvester_domain::entities::EventRecord;
use event_harvester_domain::error::HarvestError;
use event_harvester_domain::repositories::{EventRepository, InsertOutcome};
use event_harvester_domain::value_objects::{
    Category, Coordinates, Digest256, EventId, PriceInfo, QualityScore, SourceId,
};

#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_err(e: sqlx::Error) -> HarvestError {
        HarvestError::database_error(e.to_string())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<EventRecord>, HarvestError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_fingerprint = ?");
        let row = sqlx::query(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        row.as_ref().map(row_to_event).transpose()
    }
}

const EVENT_COLUMNS: &str = "id, source_id, title, description, category, event_date, event_time, \
     time_known, venue_name, venue_address, lat, lng, image_url, tags, persona_tags, price, \
     organizer, performer, tickets_url, content_hash, event_fingerprint, embedding, quality_score, \
     last_healed_at, created_at, updated_at";

fn row_to_event(row: &SqliteRow) -> Result<EventRecord, HarvestError> {
    let coordinates = match (row.get::<Option<f64>, _>("lat"), row.get::<Option<f64>, _>("lng")) {
        (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)?),
        _ => None,
    };
    let event_date = NaiveDate::parse_from_str(&row.get::<String, _>("event_date"), "%Y-%m-%d")
        .map_err(|e| HarvestError::database_error(format!("bad event_date in storage: {}", e)))?;

    Ok(EventRecord {
        id: EventId::from_string(&row.get::<String, _>("id"))?,
        source_id: SourceId::from_string(&row.get::<String, _>("source_id"))?,
        title: row.get("title"),
        description: row.get("description"),
        category: Category::parse(&row.get::<String, _>("category"))?,
        event_date,
        event_time: row.get("event_time"),
        time_known: row.get::<i64, _>("time_known") != 0,
        venue_name: row.get("venue_name"),
        venue_address: row.get("venue_address"),
        coordinates,
        image_url: row.get("image_url"),
        tags: serde_json::from_str(&row.get::<String, _>("tags"))?,
        persona_tags: serde_json::from_str(&row.get::<String, _>("persona_tags"))?,
        price: serde_json::from_str::<PriceInfo>(&row.get::<String, _>("price")).unwrap_or_default(),
        organizer: row.get("organizer"),
        performer: row.get("performer"),
        tickets_url: row.get("tickets_url"),
        content_hash: Digest256::from_hex(row.get::<String, _>("content_hash")),
        fingerprint: Digest256::from_hex(row.get::<String, _>("event_fingerprint")),
        embedding: row
            .get::<Option<String>, _>("embedding")
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        quality_score: QualityScore::new(row.get::<f64, _>("quality_score")),
        last_healed_at: row.get::<Option<DateTime<Utc>>, _>("last_healed_at"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn bind_event<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    record: &'q EventRecord,
    tags: &'q str,
    persona_tags: &'q str,
    price: &'q str,
    embedding: Option<&'q str>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(record.id.to_string())
        .bind(record.source_id.to_string())
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.category.as_key())
        .bind(record.event_date.to_string())
        .bind(&record.event_time)
        .bind(record.time_known as i64)
        .bind(&record.venue_name)
        .bind(&record.venue_address)
        .bind(record.coordinates.map(|c| c.lat()))
        .bind(record.coordinates.map(|c| c.lng()))
        .bind(&record.image_url)
        .bind(tags)
        .bind(persona_tags)
        .bind(price)
        .bind(&record.organizer)
        .bind(&record.performer)
        .bind(&record.tickets_url)
        .bind(record.content_hash.as_str())
        .bind(record.fingerprint.as_str())
        .bind(embedding)
        .bind(record.quality_score.value())
        .bind(record.last_healed_at)
        .bind(record.created_at)
        .bind(record.updated_at)
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn find_matching(
        &self,
        content_hash: &str,
        fingerprint: &str,
    ) -> Result<Option<EventRecord>, HarvestError> {
        // Fingerprint match (same-source re-run) takes priority; fall back
        // to the cross-source content-hash identity.
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE event_fingerprint = ? OR content_hash = ? \
             ORDER BY event_fingerprint = ? DESC, created_at ASC \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(fingerprint)
            .bind(content_hash)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn insert(&self, record: &EventRecord) -> Result<InsertOutcome, HarvestError> {
        record.check_invariants()?;
        let tags = serde_json::to_string(&record.tags)?;
        let persona_tags = serde_json::to_string(&record.persona_tags)?;
        let price = serde_json::to_string(&record.price)?;
        let embedding = record
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let sql = "INSERT INTO events (id, source_id, title, description, category, event_date, \
             event_time, time_known, venue_name, venue_address, lat, lng, image_url, tags, \
             persona_tags, price, organizer, performer, tickets_url, content_hash, \
             event_fingerprint, embedding, quality_score, last_healed_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let result = bind_event(
            sqlx::query(sql),
            record,
            &tags,
            &persona_tags,
            &price,
            embedding.as_deref(),
        )
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(event_id = %record.id, "inserted canonical event");
                Ok(InsertOutcome::Inserted(record.id))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                // A concurrent writer won the fingerprint race; hand the
                // caller the surviving row so it can merge instead.
                let winner = self
                    .find_by_fingerprint(record.fingerprint.as_str())
                    .await?
                    .ok_or_else(|| {
                        HarvestError::internal_error(
                            "fingerprint conflict reported but no winning row found",
                        )
                    })?;
                debug!(event_id = %winner.id, "duplicate insert race, merging into winner");
                Ok(InsertOutcome::DuplicateRace(winner.id))
            }
            Err(e) => Err(Self::db_err(e)),
        }
    }

    async fn update(&self, record: &EventRecord) -> Result<(), HarvestError> {
        record.check_invariants()?;
        let tags = serde_json::to_string(&record.tags)?;
        let persona_tags = serde_json::to_string(&record.persona_tags)?;
        let price = serde_json::to_string(&record.price)?;
        let embedding = record
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "UPDATE events SET title = ?, description = ?, category = ?, event_date = ?, \
             event_time = ?, time_known = ?, venue_name = ?, venue_address = ?, lat = ?, lng = ?, \
             image_url = ?, tags = ?, persona_tags = ?, price = ?, organizer = ?, performer = ?, \
             tickets_url = ?, embedding = ?, quality_score = ?, last_healed_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.category.as_key())
        .bind(record.event_date.to_string())
        .bind(&record.event_time)
        .bind(record.time_known as i64)
        .bind(&record.venue_name)
        .bind(&record.venue_address)
        .bind(record.coordinates.map(|c| c.lat()))
        .bind(record.coordinates.map(|c| c.lng()))
        .bind(&record.image_url)
        .bind(tags)
        .bind(persona_tags)
        .bind(price)
        .bind(&record.organizer)
        .bind(&record.performer)
        .bind(&record.tickets_url)
        .bind(embedding)
        .bind(record.quality_score.value())
        .bind(record.last_healed_at)
        .bind(record.updated_at)
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;

        if result.rows_affected() != 1 {
            return Err(HarvestError::internal_error(format!(
                "update of event {} touched {} rows",
                record.id,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<EventRecord>, HarvestError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn missing_embedding(&self, limit: u32) -> Result<Vec<EventRecord>, HarvestError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE embedding IS NULL \
             ORDER BY created_at ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn set_embedding(&self, id: EventId, embedding: &[f32]) -> Result<(), HarvestError> {
        let json = serde_json::to_string(embedding)?;
        sqlx::query("UPDATE events SET embedding = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;
    use event_harvester_domain::entities::{EnrichedEvent, NormalizedEvent, TIME_TBD};
    use event_harvester_domain::value_objects::{content_hash, event_fingerprint, ParsingMethod};

    fn record(title: &str, source_id: SourceId) -> EventRecord {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let normalized = NormalizedEvent {
            source_id,
            title: title.to_string(),
            description: Some("Jaarlijkse optocht".into()),
            category: Category::Community,
            event_date: date,
            event_time: TIME_TBD.into(),
            time_known: false,
            venue_name: None,
            venue_address: None,
            image_url: None,
            tags: vec!["pride".into()],
            persona_tags: vec![],
            price: PriceInfo::default(),
            organizer: None,
            performer: None,
            tickets_url: None,
            detail_url: None,
            content_hash: content_hash(title, "2026-08-01"),
            fingerprint: event_fingerprint(title, "2026-08-01", source_id),
            quality_score: QualityScore::new(0.45),
            method: ParsingMethod::JsonLd,
        };
        EventRecord::from_enriched(EnrichedEvent::new(normalized), Utc::now())
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteEventRepository::new(pool);
        let record = record("Pride Walk", SourceId::new());

        let outcome = repo.insert(&record).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(record.id));

        let fetched = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Pride Walk");
        assert_eq!(fetched.tags, vec!["pride".to_string()]);
        assert_eq!(fetched.fingerprint, record.fingerprint);
    }

    #[tokio::test]
    async fn test_duplicate_race_reports_winner() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteEventRepository::new(pool);
        let source_id = SourceId::new();

        let first = record("Pride Walk", source_id);
        repo.insert(&first).await.unwrap();

        // Same source, same title/date → same fingerprint, new row id.
        let second = record("Pride Walk", source_id);
        let outcome = repo.insert(&second).await.unwrap();
        assert_eq!(outcome, InsertOutcome::DuplicateRace(first.id));
    }

    #[tokio::test]
    async fn test_find_matching_by_content_hash_across_sources() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteEventRepository::new(pool);

        let first = record("Pride Walk", SourceId::new());
        repo.insert(&first).await.unwrap();

        // Different source: fingerprints differ, content hash matches.
        let second = record("Pride Walk", SourceId::new());
        let matched = repo
            .find_matching(second.content_hash.as_str(), second.fingerprint.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.id, first.id);
    }

    #[tokio::test]
    async fn test_missing_embedding_sweep() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteEventRepository::new(pool);
        let record = record("Pride Walk", SourceId::new());
        repo.insert(&record).await.unwrap();

        let missing = repo.missing_embedding(10).await.unwrap();
        assert_eq!(missing.len(), 1);

        repo.set_embedding(record.id, &vec![0.5_f32; 1536]).await.unwrap();
        let missing = repo.missing_embedding(10).await.unwrap();
        assert!(missing.is_empty());

        let fetched = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.embedding.unwrap().len(), 1536);
    }
}
