use rusqlite::Connection;

use crate::error::Result;

use super::sqlite::SqliteBucketStore;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS geo_buckets (
        cell_id TEXT PRIMARY KEY,
        centroid_lat REAL NOT NULL,
        centroid_lng REAL NOT NULL,
        canonical_name TEXT NOT NULL,
        variant_names TEXT NOT NULL,
        property_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_geo_buckets_canonical_name
    ON geo_buckets(canonical_name);

    CREATE INDEX IF NOT EXISTS idx_geo_buckets_property_count
    ON geo_buckets(property_count DESC);

    CREATE TABLE IF NOT EXISTS location_index (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        original_name TEXT NOT NULL,
        normalized_name TEXT NOT NULL,
        cell_id TEXT NOT NULL REFERENCES geo_buckets(cell_id) ON DELETE CASCADE,
        phonetic_code TEXT NOT NULL,
        trigrams TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(normalized_name, cell_id)
    );

    CREATE INDEX IF NOT EXISTS idx_location_index_normalized_name
    ON location_index(normalized_name);

    CREATE INDEX IF NOT EXISTS idx_location_index_phonetic_code
    ON location_index(phonetic_code);
";

impl SqliteBucketStore {
    pub(super) fn migrate(&self) -> Result<()> {
        self.with_conn(apply_schema)
    }
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
    Ok(())
}
