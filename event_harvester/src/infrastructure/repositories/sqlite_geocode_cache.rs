// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite geocode cache. A lookup that hits bumps the counter in the same
//! statement; expiry is enforced at read time and swept by `purge_expired`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use event_harvester_domain::entities::geocode_entry::{GeocodeCacheEntry, CACHE_TTL_DAYS};
use event_harvester_domain::error::HarvestError;
use event_harvester_domain::repositories::GeocodeCacheRepository;
use event_harvester_domain::value_objects::Coordinates;

#[derive(Clone)]
pub struct SqliteGeocodeCache {
    pool: SqlitePool,
}

impl SqliteGeocodeCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_err(e: sqlx::Error) -> HarvestError {
        HarvestError::database_error(e.to_string())
    }
}

#[async_trait]
impl GeocodeCacheRepository for SqliteGeocodeCache {
    async fn lookup(&self, key: &str, now: DateTime<Utc>) -> Result<Option<GeocodeCacheEntry>, HarvestError> {
        let oldest_usable = now - Duration::days(CACHE_TTL_DAYS);
        let row = sqlx::query(
            "UPDATE geocode_cache SET hit_count = hit_count + 1 \
             WHERE key = ? AND created_at > ? \
             RETURNING key, lat, lng, provider, hit_count, created_at",
        )
        .bind(key)
        .bind(oldest_usable)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let coordinates = Coordinates::new(row.get("lat"), row.get("lng"))?;
        Ok(Some(GeocodeCacheEntry {
            key: row.get("key"),
            coordinates,
            provider: row.get("provider"),
            hit_count: row.get::<i64, _>("hit_count") as u64,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }))
    }

    async fn upsert(&self, entry: &GeocodeCacheEntry) -> Result<(), HarvestError> {
        sqlx::query(
            "INSERT INTO geocode_cache (key, lat, lng, provider, hit_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
                 lat = excluded.lat, lng = excluded.lng, provider = excluded.provider, \
                 created_at = excluded.created_at",
        )
        .bind(&entry.key)
        .bind(entry.coordinates.lat())
        .bind(entry.coordinates.lng())
        .bind(&entry.provider)
        .bind(entry.hit_count as i64)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, HarvestError> {
        let oldest_usable = now - Duration::days(CACHE_TTL_DAYS);
        let result = sqlx::query("DELETE FROM geocode_cache WHERE created_at <= ?")
            .bind(oldest_usable)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;

    fn entry(key: &str) -> GeocodeCacheEntry {
        GeocodeCacheEntry::new(key, Coordinates::new(52.3622, 4.8832).unwrap(), "nominatim")
    }

    #[tokio::test]
    async fn test_lookup_hit_increments_counter() {
        let pool = schema::in_memory_database().await.unwrap();
        let cache = SqliteGeocodeCache::new(pool);
        cache.upsert(&entry("paradiso|amsterdam|nl")).await.unwrap();

        let hit = cache.lookup("paradiso|amsterdam|nl", Utc::now()).await.unwrap().unwrap();
        assert_eq!(hit.hit_count, 1);
        let hit = cache.lookup("paradiso|amsterdam|nl", Utc::now()).await.unwrap().unwrap();
        assert_eq!(hit.hit_count, 2);
    }

    #[tokio::test]
    async fn test_miss_and_expiry() {
        let pool = schema::in_memory_database().await.unwrap();
        let cache = SqliteGeocodeCache::new(pool);

        assert!(cache.lookup("unknown|key", Utc::now()).await.unwrap().is_none());

        let mut stale = entry("old|entry");
        stale.created_at = Utc::now() - Duration::days(CACHE_TTL_DAYS + 5);
        cache.upsert(&stale).await.unwrap();
        assert!(cache.lookup("old|entry", Utc::now()).await.unwrap().is_none());

        let purged = cache.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(purged, 1);
    }
}
