//! Decision cache repository: keyed access to the `decision_cache` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw decision cache row. `recommended_hotels` and `extra_metadata`
/// hold serialized JSON.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key_hash: String,
    pub pattern_desc: String,
    pub recommended_hotels: String,
    pub extra_metadata: String,
    pub created_at: String,
}

impl CacheRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            key_hash: row.get("key_hash")?,
            pattern_desc: row.get("pattern_desc")?,
            recommended_hotels: row.get("recommended_hotels")?,
            extra_metadata: row.get("extra_metadata")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Finds an entry by key hash.
pub fn find(db: &Database, key_hash: &str) -> Result<Option<CacheRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM decision_cache WHERE key_hash = ?1",
                params![key_hash],
                CacheRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Inserts or fully replaces the entry for `key_hash`.
pub fn upsert(db: &Database, row: &CacheRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO decision_cache (key_hash, pattern_desc, recommended_hotels,
             extra_metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key_hash) DO UPDATE SET
                 pattern_desc = excluded.pattern_desc,
                 recommended_hotels = excluded.recommended_hotels,
                 extra_metadata = excluded.extra_metadata,
                 created_at = excluded.created_at",
            params![
                row.key_hash,
                row.pattern_desc,
                row.recommended_hotels,
                row.extra_metadata,
                row.created_at
            ],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, hotels: &str) -> CacheRow {
        CacheRow {
            key_hash: key.to_string(),
            pattern_desc: "Denver, 3 nights".to_string(),
            recommended_hotels: hotels.to_string(),
            extra_metadata: "{}".to_string(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn test_find_missing_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(find(&db, "nope").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_entry() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &row("k", r#"[{"a":1}]"#)).unwrap();
        upsert(&db, &row("k", r#"[{"b":2}]"#)).unwrap();

        let found = find(&db, "k").unwrap().unwrap();
        assert_eq!(found.recommended_hotels, r#"[{"b":2}]"#);

        let count: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM decision_cache", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
