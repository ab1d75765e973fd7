//! Content-addressed decision cache over a pluggable entry store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::fingerprint::Fingerprint;
use crate::db::cache_repo::{self, CacheRow};
use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::hotels::HotelMatchResult;
use crate::store::StoreError;

/// A cached hotel recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key_hash: String,
    pub pattern_description: String,
    pub recommended_hotels: Vec<HotelMatchResult>,
    #[serde(default)]
    pub extra_metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Storage for cache entries keyed by `key_hash`. `put` fully replaces any
/// existing entry with the same key.
pub trait CacheStore: Send + Sync {
    fn get(&self, key_hash: &str) -> Result<Option<CacheEntry>, StoreError>;
    fn put(&self, entry: &CacheEntry) -> Result<(), StoreError>;
}

/// [`CacheStore`] backed by the `decision_cache` table.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    db: Database,
}

impl SqliteCacheStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key_hash: &str) -> Result<Option<CacheEntry>, StoreError> {
        let Some(row) = cache_repo::find(&self.db, key_hash)? else {
            return Ok(None);
        };
        let corrupt = |e: serde_json::Error| StoreError::Corrupt {
            id: row.key_hash.clone(),
            reason: e.to_string(),
        };
        let recommended_hotels = serde_json::from_str(&row.recommended_hotels).map_err(corrupt)?;
        let extra_metadata = serde_json::from_str(&row.extra_metadata).map_err(corrupt)?;
        Ok(Some(CacheEntry {
            created_at: parse_timestamp(&row.created_at),
            pattern_description: row.pattern_desc.clone(),
            recommended_hotels,
            extra_metadata,
            key_hash: row.key_hash.clone(),
        }))
    }

    fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let corrupt = |e: serde_json::Error| StoreError::Corrupt {
            id: entry.key_hash.clone(),
            reason: e.to_string(),
        };
        cache_repo::upsert(
            &self.db,
            &CacheRow {
                key_hash: entry.key_hash.clone(),
                pattern_desc: entry.pattern_description.clone(),
                recommended_hotels: serde_json::to_string(&entry.recommended_hotels)
                    .map_err(corrupt)?,
                extra_metadata: serde_json::to_string(&entry.extra_metadata).map_err(corrupt)?,
                created_at: format_timestamp(entry.created_at),
            },
        )?;
        Ok(())
    }
}

/// Outcome of a cache read that distinguishes a clean miss from a store
/// that could not be read.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss { key_hash: String },
    Unavailable { key_hash: String, error: StoreError },
}

/// Best-effort cache of hotel recommendations.
///
/// Reads that fail are misses and writes that fail are dropped; both are
/// logged at warning level. Nothing here can fail a job.
#[derive(Clone)]
pub struct DecisionCache {
    store: Arc<dyn CacheStore>,
}

impl DecisionCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn lookup_detailed(&self, context: &Value) -> CacheLookup {
        let fingerprint = Fingerprint::of(context);
        match self.store.get(&fingerprint.key_hash) {
            Ok(Some(entry)) => CacheLookup::Hit(entry),
            Ok(None) => CacheLookup::Miss {
                key_hash: fingerprint.key_hash,
            },
            Err(error) => {
                tracing::warn!(
                    key_hash = %fingerprint.key_hash,
                    "Decision cache unavailable, treating as miss: {}",
                    error
                );
                CacheLookup::Unavailable {
                    key_hash: fingerprint.key_hash,
                    error,
                }
            }
        }
    }

    pub fn lookup(&self, context: &Value) -> Option<CacheEntry> {
        match self.lookup_detailed(context) {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss { .. } | CacheLookup::Unavailable { .. } => None,
        }
    }

    /// Stores `hotels` under the context's fingerprint, replacing any
    /// previous entry. The description defaults to the canonical context.
    pub fn try_save(
        &self,
        context: &Value,
        hotels: &[HotelMatchResult],
        pattern_description: Option<&str>,
        extra_metadata: Value,
    ) -> Result<CacheEntry, StoreError> {
        let fingerprint = Fingerprint::of(context);
        let entry = CacheEntry {
            pattern_description: pattern_description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fingerprint.describe()),
            key_hash: fingerprint.key_hash,
            recommended_hotels: hotels.to_vec(),
            extra_metadata: if extra_metadata.is_null() {
                Value::Object(Default::default())
            } else {
                extra_metadata
            },
            created_at: Utc::now(),
        };
        self.store.put(&entry)?;
        Ok(entry)
    }

    pub fn save(
        &self,
        context: &Value,
        hotels: &[HotelMatchResult],
        pattern_description: Option<&str>,
        extra_metadata: Value,
    ) -> Option<CacheEntry> {
        match self.try_save(context, hotels, pattern_description, extra_metadata) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Decision cache save failed: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseError;
    use crate::hotels::Hotel;
    use serde_json::json;

    fn cache() -> DecisionCache {
        DecisionCache::new(Arc::new(SqliteCacheStore::new(
            Database::open_in_memory().unwrap(),
        )))
    }

    fn ranked(name: &str, score: f64) -> HotelMatchResult {
        HotelMatchResult {
            hotel: Hotel::new(name, "Denver", Some("CO")),
            score,
            price_total: None,
            price_currency: None,
            distance_miles: Some(1.0),
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<CacheEntry>, StoreError> {
            Err(StoreError::Database(DatabaseError::LockPoisoned))
        }
        fn put(&self, _: &CacheEntry) -> Result<(), StoreError> {
            Err(StoreError::Database(DatabaseError::LockPoisoned))
        }
    }

    #[test]
    fn test_save_then_lookup_returns_same_hotels() {
        let cache = cache();
        let ctx = json!({"location": "Denver, CO", "headcount": 40});
        let hotels = vec![ranked("Hyatt Regency", 0.9), ranked("Grand Hyatt", 0.5)];

        let saved = cache
            .save(&ctx, &hotels, Some("Denver spring conference"), Value::Null)
            .unwrap();
        let found = cache.lookup(&ctx).unwrap();

        assert_eq!(found.recommended_hotels, hotels);
        assert_eq!(found.key_hash, saved.key_hash);
        assert_eq!(found.pattern_description, "Denver spring conference");
        assert_eq!(found.extra_metadata, json!({}));
    }

    #[test]
    fn test_semantically_equal_context_hits() {
        let cache = cache();
        cache.save(
            &json!({"location": "Denver, CO", "headcount": 40}),
            &[ranked("Hyatt Regency", 0.9)],
            None,
            json!({"source": "test"}),
        );

        let found = cache
            .lookup(&json!({"LOCATION": " denver,  co", "headcount": 40}))
            .unwrap();
        assert_eq!(found.pattern_description, "headcount=40; location=denver, co");
        assert_eq!(found.extra_metadata, json!({"source": "test"}));
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = cache();
        let ctx = json!({"location": "Tampa, FL"});
        cache.save(&ctx, &[ranked("Old", 0.1)], None, Value::Null);
        cache.save(&ctx, &[ranked("New", 0.2)], None, Value::Null);

        let found = cache.lookup(&ctx).unwrap();
        assert_eq!(found.recommended_hotels.len(), 1);
        assert_eq!(found.recommended_hotels[0].hotel.name, "New");
    }

    #[test]
    fn test_miss_and_unavailable() {
        let cache = cache();
        assert!(matches!(
            cache.lookup_detailed(&json!({"location": "Nowhere"})),
            CacheLookup::Miss { .. }
        ));

        let broken = DecisionCache::new(Arc::new(BrokenStore));
        let ctx = json!({"location": "Denver, CO"});
        assert!(matches!(
            broken.lookup_detailed(&ctx),
            CacheLookup::Unavailable { .. }
        ));
        assert!(broken.lookup(&ctx).is_none());
        assert!(broken.save(&ctx, &[], None, Value::Null).is_none());
    }
}
