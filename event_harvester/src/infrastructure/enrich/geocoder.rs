// /////////////////////////////////////////////////////////////////////////////
// Event Harvester
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hybrid Geocoder
//!
//! The query side of the hybrid ladder (HTML extraction runs before this,
//! in the enrichment stage, because it needs the page):
//!
//! 1. **Fuzzy cache**: the venue/city/country triple is normalized
//!    (lowercase, diacritics stripped, punctuation to spaces, whitespace
//!    collapsed) and expanded into key variants - venue+city+country,
//!    venue+country, city+country, and venue-with-city-stripped - which
//!    are probed in order.
//! 2. **Provider pool**: round-robin across configured providers.
//! 3. **Query degradation**: venue+city, then city alone.
//! 4. Success is upserted back into the cache under the primary key.
//!
//! The geocoder can never produce `(0, 0)`: the `Coordinates` type refuses
//! to represent it.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use event_harvester_domain::entities::GeocodeCacheEntry;
use event_harvester_domain::repositories::GeocodeCacheRepository;
use event_harvester_domain::value_objects::Coordinates;
use event_harvester_domain::HarvestError;

use crate::infrastructure::enrich::providers::GeocodeProviderPool;

/// A geocoding request for one event's venue line.
#[derive(Debug, Clone)]
pub struct GeocodeQuery {
    pub venue: Option<String>,
    pub city: Option<String>,
    pub country: String,
}

/// Where a resolution came from, for insights and cache bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeSource {
    Cache,
    Provider(String),
}

pub struct HybridGeocoder {
    cache: Arc<dyn GeocodeCacheRepository>,
    providers: Arc<GeocodeProviderPool>,
}

impl HybridGeocoder {
    pub fn new(cache: Arc<dyn GeocodeCacheRepository>, providers: Arc<GeocodeProviderPool>) -> Self {
        Self { cache, providers }
    }

    /// Resolves a query through cache, providers, and degradation.
    pub async fn resolve(
        &self,
        query: &GeocodeQuery,
    ) -> Result<Option<(Coordinates, GeocodeSource)>, HarvestError> {
        let variants = cache_key_variants(query);

        for key in &variants {
            if let Some(entry) = self.cache.lookup(key, Utc::now()).await? {
                debug!(key, "geocode cache hit");
                return Ok(Some((entry.coordinates, GeocodeSource::Cache)));
            }
        }

        // Provider ladder with query degradation.
        for provider_query in provider_queries(query) {
            if let Some((coordinates, provider)) = self.providers.resolve(&provider_query).await? {
                if let Some(primary_key) = variants.first() {
                    let entry = GeocodeCacheEntry::new(primary_key.clone(), coordinates, &provider);
                    self.cache.upsert(&entry).await?;
                }
                return Ok(Some((coordinates, GeocodeSource::Provider(provider))));
            }
        }

        Ok(None)
    }
}

/// Normalizes one component: lowercase, diacritics stripped, punctuation
/// to spaces, whitespace collapsed.
pub fn normalize_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let c = c.to_lowercase().next().unwrap_or(c);
        let mapped = strip_diacritic(c);
        if mapped.is_alphanumeric() {
            out.push(mapped);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Common Latin-1/Latin-2 diacritics found in Dutch, German, and French
/// venue names.
fn strip_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        'ß' => 's',
        other => other,
    }
}

/// Cache key variants, most specific first.
pub fn cache_key_variants(query: &GeocodeQuery) -> Vec<String> {
    let country = normalize_component(&query.country);
    let venue = query.venue.as_deref().map(normalize_component).filter(|v| !v.is_empty());
    let city = query.city.as_deref().map(normalize_component).filter(|c| !c.is_empty());

    let mut variants = Vec::new();
    match (&venue, &city) {
        (Some(venue), Some(city)) => {
            // Venue text often repeats the city ("Paradiso Amsterdam");
            // the stripped variant catches cache entries keyed without it.
            let stripped = venue
                .split_whitespace()
                .filter(|word| word != city)
                .collect::<Vec<_>>()
                .join(" ");
            if !stripped.is_empty() && stripped != *venue {
                variants.push(format!("{}|{}|{}", stripped, city, country));
            }
            variants.push(format!("{}|{}|{}", venue, city, country));
            variants.push(format!("{}|{}", venue, country));
            variants.push(format!("{}|{}", city, country));
        }
        (Some(venue), None) => {
            variants.push(format!("{}|{}", venue, country));
        }
        (None, Some(city)) => {
            variants.push(format!("{}|{}", city, country));
        }
        (None, None) => {}
    }
    variants
}

/// Provider query strings, full first, degraded after.
fn provider_queries(query: &GeocodeQuery) -> Vec<String> {
    let mut queries = Vec::new();
    match (&query.venue, &query.city) {
        (Some(venue), Some(city)) => {
            queries.push(format!("{}, {}, {}", venue, city, query.country));
            queries.push(format!("{}, {}", venue, city));
            queries.push(city.clone());
        }
        (Some(venue), None) => {
            queries.push(format!("{}, {}", venue, query.country));
        }
        (None, Some(city)) => {
            queries.push(format!("{}, {}", city, query.country));
        }
        (None, None) => {}
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::enrich::providers::{GeocodeAttempt, GeocodeBackend};
    use crate::infrastructure::repositories::{schema, SqliteGeocodeCache};
    use async_trait::async_trait;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_component("Café Olympique!"), "cafe olympique");
        assert_eq!(normalize_component("  Paradiso,  Amsterdam "), "paradiso amsterdam");
        assert_eq!(normalize_component("Körperwelten"), "korperwelten");
    }

    #[test]
    fn test_variant_generation_strips_city_from_venue() {
        let query = GeocodeQuery {
            venue: Some("Paradiso Amsterdam".into()),
            city: Some("Amsterdam".into()),
            country: "nl".into(),
        };
        let variants = cache_key_variants(&query);
        assert_eq!(variants[0], "paradiso|amsterdam|nl");
        assert!(variants.contains(&"paradiso amsterdam|amsterdam|nl".to_string()));
        assert!(variants.contains(&"amsterdam|nl".to_string()));
    }

    struct NeverCalled;

    #[async_trait]
    impl GeocodeBackend for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }
        async fn geocode(&self, _query: &str) -> GeocodeAttempt {
            panic!("provider must not be called on a cache hit");
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let pool = schema::in_memory_database().await.unwrap();
        let cache = Arc::new(SqliteGeocodeCache::new(pool));
        let coordinates = Coordinates::new(52.3622, 4.8832).unwrap();
        cache
            .upsert(&GeocodeCacheEntry::new("paradiso|amsterdam|nl", coordinates, "nominatim"))
            .await
            .unwrap();

        let providers = Arc::new(GeocodeProviderPool::new(vec![(
            Arc::new(NeverCalled),
            std::time::Duration::ZERO,
        )]));
        let geocoder = HybridGeocoder::new(cache.clone(), providers);

        let query = GeocodeQuery {
            venue: Some("Paradiso Amsterdam".into()),
            city: Some("Amsterdam".into()),
            country: "nl".into(),
        };
        let (found, source) = geocoder.resolve(&query).await.unwrap().unwrap();
        assert!(found.approx_eq(&coordinates));
        assert_eq!(source, GeocodeSource::Cache);

        // Hit count bumped on the fuzzy-matched entry.
        let entry = cache.lookup("paradiso|amsterdam|nl", Utc::now()).await.unwrap().unwrap();
        assert_eq!(entry.hit_count, 2);
    }

    struct CityOnly;

    #[async_trait]
    impl GeocodeBackend for CityOnly {
        fn name(&self) -> &str {
            "cityonly"
        }
        async fn geocode(&self, query: &str) -> GeocodeAttempt {
            // Only the fully degraded city query resolves.
            if query == "Amsterdam" {
                GeocodeAttempt::Found(Coordinates::new(52.37, 4.89).unwrap())
            } else {
                GeocodeAttempt::NotFound
            }
        }
    }

    #[tokio::test]
    async fn test_provider_resolution_caches_result() {
        let pool = schema::in_memory_database().await.unwrap();
        let cache = Arc::new(SqliteGeocodeCache::new(pool));
        let providers = Arc::new(GeocodeProviderPool::new(vec![(
            Arc::new(CityOnly),
            std::time::Duration::ZERO,
        )]));
        let geocoder = HybridGeocoder::new(cache.clone(), providers);

        let query = GeocodeQuery {
            venue: Some("Onbekende Zaal".into()),
            city: Some("Amsterdam".into()),
            country: "nl".into(),
        };
        let (_, source) = geocoder.resolve(&query).await.unwrap().unwrap();
        assert_eq!(source, GeocodeSource::Provider("cityonly".into()));

        // Resolution landed in the cache under the primary key.
        let cached = cache
            .lookup("onbekende zaal|amsterdam|nl", Utc::now())
            .await
            .unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_query() {
        let pool = schema::in_memory_database().await.unwrap();
        let cache = Arc::new(SqliteGeocodeCache::new(pool));
        let providers = Arc::new(GeocodeProviderPool::new(vec![]));
        let geocoder = HybridGeocoder::new(cache, providers);

        let query = GeocodeQuery {
            venue: None,
            city: None,
            country: "nl".into(),
        };
        assert!(geocoder.resolve(&query).await.unwrap().is_none());
    }
}
