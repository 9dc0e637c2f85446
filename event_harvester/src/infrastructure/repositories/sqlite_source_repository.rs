// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite source repository. Sources are saved whole (INSERT OR REPLACE);
//! health accounting mutates the entity first and persists second.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use event_harvester_domain::entities::{ExtractionRecipe, Source};
use event_harvester_domain::entities::source::{FetchStrategyKind, SourceTier};
use event_harvester_domain::error::HarvestError;
use event_harvester_domain::repositories::SourceRepository;
use event_harvester_domain::value_objects::{ParsingMethod, SourceId};

#[derive(Clone)]
pub struct SqliteSourceRepository {
    pool: SqlitePool,
}

impl SqliteSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_err(e: sqlx::Error) -> HarvestError {
        HarvestError::database_error(e.to_string())
    }
}

const SOURCE_COLUMNS: &str = "id, name, root_url, enabled, tier, preferred_method, fetch_strategy, \
     rate_limit_ms, language, feed_discovery, dom_selectors, last_payload_hash, \
     consecutive_failures, total_events_extracted, quarantined, last_successful_scrape, \
     next_scrape_at, reliability_score, recipe, last_working_recipe, last_healed_at, created_at, \
     updated_at";

fn row_to_source(row: &SqliteRow) -> Result<Source, HarvestError> {
    let id = SourceId::from_string(&row.get::<String, _>("id"))?;
    let tier = SourceTier::parse(&row.get::<String, _>("tier"))?;
    let fetch_strategy = FetchStrategyKind::parse(&row.get::<String, _>("fetch_strategy"))?;
    let preferred_method = row
        .get::<Option<String>, _>("preferred_method")
        .map(|s| serde_json::from_value::<ParsingMethod>(serde_json::Value::String(s)))
        .transpose()?;
    let recipe = row
        .get::<Option<String>, _>("recipe")
        .map(|s| serde_json::from_str::<ExtractionRecipe>(&s))
        .transpose()?;
    let last_working_recipe = row
        .get::<Option<String>, _>("last_working_recipe")
        .map(|s| serde_json::from_str::<ExtractionRecipe>(&s))
        .transpose()?;

    Ok(Source::from_storage(
        id,
        row.get("name"),
        row.get("root_url"),
        row.get::<i64, _>("enabled") != 0,
        tier,
        preferred_method,
        fetch_strategy,
        row.get::<i64, _>("rate_limit_ms") as u64,
        row.get("language"),
        row.get::<i64, _>("feed_discovery") != 0,
        serde_json::from_str(&row.get::<String, _>("dom_selectors")).unwrap_or_default(),
        row.get("last_payload_hash"),
        row.get::<i64, _>("consecutive_failures") as u32,
        row.get::<i64, _>("total_events_extracted") as u64,
        row.get::<i64, _>("quarantined") != 0,
        row.get::<Option<DateTime<Utc>>, _>("last_successful_scrape"),
        row.get::<Option<DateTime<Utc>>, _>("next_scrape_at"),
        row.get::<f64, _>("reliability_score"),
        recipe,
        last_working_recipe,
        row.get::<Option<DateTime<Utc>>, _>("last_healed_at"),
        row.get::<DateTime<Utc>, _>("created_at"),
        row.get::<DateTime<Utc>, _>("updated_at"),
    ))
}

#[async_trait]
impl SourceRepository for SqliteSourceRepository {
    async fn save(&self, source: &Source) -> Result<(), HarvestError> {
        let preferred = source
            .preferred_method()
            .map(|m| m.as_str().to_string());
        let recipe = source.recipe().map(serde_json::to_string).transpose()?;
        let last_working = source
            .last_working_recipe()
            .map(serde_json::to_string)
            .transpose()?;

        let dom_selectors = serde_json::to_string(source.dom_selectors())?;
        sqlx::query(
            "INSERT OR REPLACE INTO sources (id, name, root_url, enabled, tier, preferred_method, \
             fetch_strategy, rate_limit_ms, language, feed_discovery, dom_selectors, \
             last_payload_hash, consecutive_failures, total_events_extracted, quarantined, \
             last_successful_scrape, next_scrape_at, reliability_score, recipe, \
             last_working_recipe, last_healed_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(source.id().to_string())
        .bind(source.name())
        .bind(source.root_url())
        .bind(source.enabled() as i64)
        .bind(source.tier().as_str())
        .bind(preferred)
        .bind(source.fetch_strategy().as_str())
        .bind(source.rate_limit_ms() as i64)
        .bind(source.language())
        .bind(source.feed_discovery() as i64)
        .bind(dom_selectors)
        .bind(source.last_payload_hash())
        .bind(source.consecutive_failures() as i64)
        .bind(source.total_events_extracted() as i64)
        .bind(source.quarantined() as i64)
        .bind(source.last_successful_scrape())
        .bind(source.next_scrape_at())
        .bind(source.reliability_score())
        .bind(recipe)
        .bind(last_working)
        .bind(source.last_healed_at())
        .bind(source.created_at())
        .bind(source.updated_at())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: SourceId) -> Result<Option<Source>, HarvestError> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn due_sources(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Source>, HarvestError> {
        // Tier order is metropolis > regional > general > local.
        let sql = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources \
             WHERE enabled = 1 AND quarantined = 0 \
               AND (next_scrape_at IS NULL OR next_scrape_at <= ?) \
             ORDER BY CASE tier \
                 WHEN 'metropolis' THEN 0 WHEN 'regional' THEN 1 \
                 WHEN 'general' THEN 2 ELSE 3 END ASC, \
               last_successful_scrape ASC NULLS FIRST \
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)?;
        rows.iter().map(row_to_source).collect()
    }

    async fn list_enabled(&self) -> Result<Vec<Source>, HarvestError> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled = 1 ORDER BY name");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::db_err)?;
        rows.iter().map(row_to_source).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;

    #[tokio::test]
    async fn test_save_and_find_round_trip() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteSourceRepository::new(pool);

        let mut source = Source::new("Paradiso", "https://www.paradiso.nl/agenda").unwrap();
        source.set_tier(SourceTier::Metropolis);
        source.apply_recipe(
            ExtractionRecipe::new(".agenda", "article.show", "h2 a").unwrap(),
            Utc::now(),
        );
        repo.save(&source).await.unwrap();

        let fetched = repo.find_by_id(source.id()).await.unwrap().unwrap();
        assert_eq!(fetched.name(), "Paradiso");
        assert_eq!(fetched.tier(), SourceTier::Metropolis);
        assert_eq!(fetched.recipe().unwrap().item_selector(), "article.show");
    }

    #[tokio::test]
    async fn test_due_sources_ordering_and_exclusions() {
        let pool = schema::in_memory_database().await.unwrap();
        let repo = SqliteSourceRepository::new(pool);
        let now = Utc::now();

        let mut local = Source::new("Local blog", "https://blog.example.nl").unwrap();
        local.set_tier(SourceTier::Local);
        repo.save(&local).await.unwrap();

        let mut metro = Source::new("City agenda", "https://city.example.nl").unwrap();
        metro.set_tier(SourceTier::Metropolis);
        repo.save(&metro).await.unwrap();

        let mut quarantined = Source::new("Broken site", "https://broken.example.nl").unwrap();
        quarantined.quarantine();
        repo.save(&quarantined).await.unwrap();

        let mut scheduled_later = Source::new("Future", "https://future.example.nl").unwrap();
        scheduled_later.schedule_next(now + chrono::Duration::hours(6));
        repo.save(&scheduled_later).await.unwrap();

        let due = repo.due_sources(now, 10).await.unwrap();
        let names: Vec<&str> = due.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["City agenda", "Local blog"]);
    }
}
