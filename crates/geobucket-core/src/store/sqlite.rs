use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::error::{BucketError, Result};
use crate::grid::CellId;
use crate::matcher::phonetic_code;
use crate::models::{BucketStats, GeoBucket, GeoPoint, LocationIndexEntry};

use super::memory::leading_trigram;
use super::{BucketStore, CreateOutcome, compute_stats};

const BUCKET_COLUMNS: &str = "cell_id, centroid_lat, centroid_lng, canonical_name, \
     variant_names, property_count, created_at, updated_at";

/// Durable store on SQLite. One connection behind a mutex; every mutation
/// that must be atomic per bucket runs inside a single transaction.
#[derive(Clone)]
pub struct SqliteBucketStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBucketStore").finish_non_exhaustive()
    }
}

impl SqliteBucketStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    pub(super) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| BucketError::lock_poisoned("sqlite"))?;
        f(&conn)
    }

    fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| BucketError::lock_poisoned("sqlite"))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        drop(conn);
        Ok(value)
    }
}

impl BucketStore for SqliteBucketStore {
    fn get_by_cell(&self, cell: &CellId) -> Result<Option<GeoBucket>> {
        self.with_conn(|conn| {
            let bucket = conn
                .query_row(
                    &format!("SELECT {BUCKET_COLUMNS} FROM geo_buckets WHERE cell_id = ?1"),
                    params![cell.to_string()],
                    bucket_from_row,
                )
                .optional()?;
            Ok(bucket)
        })
    }

    fn get_by_cells(&self, cells: &[CellId]) -> Result<Vec<GeoBucket>> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = (1..=cells.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {BUCKET_COLUMNS} FROM geo_buckets
                 WHERE cell_id IN ({placeholders})
                 ORDER BY property_count DESC, canonical_name ASC, cell_id ASC"
            ))?;
            let rows = stmt.query_map(
                params_from_iter(cells.iter().map(ToString::to_string)),
                bucket_from_row,
            )?;
            collect_rows(rows)
        })
    }

    fn create_if_absent(&self, bucket: GeoBucket) -> Result<CreateOutcome> {
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT INTO geo_buckets (cell_id, centroid_lat, centroid_lng, canonical_name,
                     variant_names, property_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(cell_id) DO NOTHING",
                params![
                    bucket.cell.to_string(),
                    bucket.centroid.lat,
                    bucket.centroid.lng,
                    bucket.canonical_name,
                    serde_json::to_string(&bucket.name_variants)?,
                    i64::try_from(bucket.property_count).unwrap_or(i64::MAX),
                    bucket.created_at.to_rfc3339(),
                    bucket.updated_at.to_rfc3339(),
                ],
            )?;
            let row = tx.query_row(
                &format!("SELECT {BUCKET_COLUMNS} FROM geo_buckets WHERE cell_id = ?1"),
                params![bucket.cell.to_string()],
                bucket_from_row,
            )?;
            Ok(CreateOutcome {
                bucket: row,
                created: inserted == 1,
            })
        })
    }

    fn record_assignment(
        &self,
        cell: &CellId,
        name: &str,
        variant_cap: usize,
    ) -> Result<GeoBucket> {
        self.with_tx(|tx| {
            let bucket = tx
                .query_row(
                    &format!("SELECT {BUCKET_COLUMNS} FROM geo_buckets WHERE cell_id = ?1"),
                    params![cell.to_string()],
                    bucket_from_row,
                )
                .optional()?;
            let Some(mut bucket) = bucket else {
                return Err(BucketError::StoreUnavailable(format!(
                    "assignment recorded against missing bucket {cell}"
                )));
            };

            bucket.property_count += 1;
            if !bucket.has_variant(name) && bucket.name_variants.len() < variant_cap {
                bucket.name_variants.push(name.to_string());
            }
            bucket.updated_at = Utc::now();

            tx.execute(
                "UPDATE geo_buckets
                 SET property_count = property_count + 1,
                     variant_names = ?2,
                     updated_at = ?3
                 WHERE cell_id = ?1",
                params![
                    cell.to_string(),
                    serde_json::to_string(&bucket.name_variants)?,
                    bucket.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(bucket)
        })
    }

    fn upsert_index_entry(&self, entry: LocationIndexEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO location_index (original_name, normalized_name, cell_id,
                     phonetic_code, trigrams, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(normalized_name, cell_id) DO NOTHING",
                params![
                    entry.original_name,
                    entry.normalized_name,
                    entry.cell.to_string(),
                    entry.phonetic_code,
                    join_trigrams(&entry.trigrams),
                    entry.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    fn find_name_candidates(&self, normalized_query: &str) -> Result<Vec<LocationIndexEntry>> {
        let probe = leading_trigram(normalized_query);
        let code = phonetic_code(normalized_query);
        if probe.is_empty() && code.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT original_name, normalized_name, cell_id, phonetic_code, trigrams,
                        created_at
                 FROM location_index
                 WHERE (?1 != '' AND instr(normalized_name, ?1) > 0)
                    OR (?2 != '' AND phonetic_code = ?2)
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![probe, code], entry_from_row)?;
            collect_rows(rows)
        })
    }

    fn list_buckets(&self) -> Result<Vec<GeoBucket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BUCKET_COLUMNS} FROM geo_buckets
                 ORDER BY property_count DESC, canonical_name ASC, cell_id ASC"
            ))?;
            let rows = stmt.query_map([], bucket_from_row)?;
            collect_rows(rows)
        })
    }

    fn stats(&self) -> Result<BucketStats> {
        Ok(compute_stats(&self.list_buckets()?))
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn bucket_from_row(row: &Row<'_>) -> rusqlite::Result<GeoBucket> {
    let cell_raw = row.get::<_, String>(0)?;
    let cell = parse_cell(0, &cell_raw)?;
    let variants_raw = row.get::<_, String>(4)?;
    let name_variants: Vec<String> = serde_json::from_str(&variants_raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err))
    })?;
    let property_count = row.get::<_, i64>(5)?;

    Ok(GeoBucket {
        cell,
        centroid: GeoPoint::new(row.get(1)?, row.get(2)?),
        canonical_name: row.get(3)?,
        name_variants,
        property_count: u64::try_from(property_count).unwrap_or(0),
        created_at: parse_required_rfc3339(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_required_rfc3339(7, &row.get::<_, String>(7)?)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LocationIndexEntry> {
    let cell_raw = row.get::<_, String>(2)?;
    Ok(LocationIndexEntry {
        original_name: row.get(0)?,
        normalized_name: row.get(1)?,
        cell: parse_cell(2, &cell_raw)?,
        phonetic_code: row.get(3)?,
        trigrams: split_trigrams(&row.get::<_, String>(4)?),
        created_at: parse_required_rfc3339(5, &row.get::<_, String>(5)?)?,
    })
}

fn parse_cell(idx: usize, raw: &str) -> rusqlite::Result<CellId> {
    CellId::from_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(std::io::Error::other(err.to_string())))
    })
}

fn parse_required_rfc3339(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|x| x.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn join_trigrams(trigrams: &BTreeSet<String>) -> String {
    trigrams.iter().cloned().collect::<Vec<_>>().join("|")
}

fn split_trigrams(raw: &str) -> BTreeSet<String> {
    raw.split('|')
        .filter(|shingle| !shingle.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::SqliteBucketStore;
    use crate::config::GridConfig;
    use crate::grid::{CellId, GridIndexer};
    use crate::matcher::{phonetic_code, trigrams};
    use crate::models::{GeoBucket, GeoPoint, LocationIndexEntry};
    use crate::store::BucketStore;

    fn open_store(dir: &TempDir) -> SqliteBucketStore {
        SqliteBucketStore::open(dir.path().join("buckets.sqlite3")).unwrap()
    }

    fn cell_at(lat: f64, lng: f64) -> CellId {
        GridIndexer::new(&GridConfig::default())
            .unwrap()
            .cell_of(GeoPoint::new(lat, lng))
            .unwrap()
    }

    fn bucket(cell: CellId, name: &str) -> GeoBucket {
        let now = Utc::now();
        GeoBucket {
            cell,
            centroid: GeoPoint::new(6.47, 3.63),
            canonical_name: name.to_string(),
            name_variants: vec![name.to_string()],
            property_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(cell: CellId, name: &str) -> LocationIndexEntry {
        LocationIndexEntry {
            original_name: name.to_string(),
            normalized_name: name.to_string(),
            cell,
            phonetic_code: phonetic_code(name),
            trigrams: trigrams(name),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn open_is_idempotent_and_rows_round_trip() {
        let dir = TempDir::new().unwrap();
        let cell = cell_at(6.4698, 3.6285);
        {
            let store = open_store(&dir);
            let outcome = store.create_if_absent(bucket(cell, "sangotedo")).unwrap();
            assert!(outcome.created);
        }
        // Re-open over the same file: schema migration must not clobber data.
        let store = open_store(&dir);
        let loaded = store.get_by_cell(&cell).unwrap().expect("bucket persisted");
        assert_eq!(loaded.canonical_name, "sangotedo");
        assert_eq!(loaded.name_variants, vec!["sangotedo".to_string()]);
        assert_eq!(loaded.property_count, 1);
        assert_eq!(loaded.centroid, GeoPoint::new(6.47, 3.63));
    }

    #[test]
    fn create_if_absent_keeps_the_first_row() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cell = cell_at(6.4698, 3.6285);

        let first = store.create_if_absent(bucket(cell, "sangotedo")).unwrap();
        let second = store.create_if_absent(bucket(cell, "other name")).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.bucket.canonical_name, "sangotedo");
        assert_eq!(store.list_buckets().unwrap().len(), 1);
    }

    #[test]
    fn record_assignment_is_transactional_per_bucket() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cell = cell_at(6.4698, 3.6285);
        store.create_if_absent(bucket(cell, "sangotedo")).unwrap();

        let updated = store.record_assignment(&cell, "sangotedo ajah", 20).unwrap();
        assert_eq!(updated.property_count, 2);
        assert!(updated.name_variants.contains(&"sangotedo ajah".to_string()));

        let reloaded = store.get_by_cell(&cell).unwrap().unwrap();
        assert_eq!(reloaded.property_count, 2);

        let err = store
            .record_assignment(&cell_at(9.0, 8.0), "nowhere", 20)
            .unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn index_entries_are_unique_per_name_and_cell() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cell = cell_at(6.4698, 3.6285);
        store.create_if_absent(bucket(cell, "sangotedo")).unwrap();

        store.upsert_index_entry(entry(cell, "sangotedo")).unwrap();
        store.upsert_index_entry(entry(cell, "sangotedo")).unwrap();
        let hits = store.find_name_candidates("sangotedo").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].trigrams, trigrams("sangotedo"));
    }

    #[test]
    fn candidate_probe_uses_substring_and_phonetic_code() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cell = cell_at(6.4698, 3.6285);
        store.create_if_absent(bucket(cell, "sangotedo")).unwrap();
        store.upsert_index_entry(entry(cell, "sangotedo ajah")).unwrap();
        store.upsert_index_entry(entry(cell, "ikoyi")).unwrap();

        let hits = store.find_name_candidates("sangotedo").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].normalized_name, "sangotedo ajah");

        assert!(store.find_name_candidates("").unwrap().is_empty());
    }

    #[test]
    fn get_by_cells_orders_by_count_then_name() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let busy = cell_at(6.5, 3.3);
        let quiet = cell_at(6.6, 3.4);
        store.create_if_absent(bucket(busy, "yaba")).unwrap();
        store.create_if_absent(bucket(quiet, "ikeja")).unwrap();
        store.record_assignment(&busy, "yaba", 20).unwrap();

        let rows = store.get_by_cells(&[quiet, busy]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].canonical_name, "yaba");
        assert_eq!(rows[1].canonical_name, "ikeja");

        assert!(store.get_by_cells(&[]).unwrap().is_empty());
    }
}
