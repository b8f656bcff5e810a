use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{BucketError, Result};
use crate::grid::CellId;
use crate::matcher::phonetic_code;
use crate::models::{BucketStats, GeoBucket, LocationIndexEntry};

use super::{BucketStore, CreateOutcome, compute_stats, sort_buckets_by_count_desc_name_asc};

/// In-memory store: the test double for the engine and a first-class
/// backend for ephemeral deployments. One lock guards both tables, which
/// gives the same per-cell atomicity the SQLite transactions provide.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucketStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: HashMap<CellId, GeoBucket>,
    entries: Vec<LocationIndexEntry>,
    entry_keys: HashSet<(String, CellId)>,
}

impl MemoryBucketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BucketError::lock_poisoned("memory store"))?;
        Ok(f(&mut inner))
    }

    /// Index rows currently held, in insertion order. Test helper.
    pub fn index_entries(&self) -> Result<Vec<LocationIndexEntry>> {
        self.with_inner(|inner| inner.entries.clone())
    }
}

impl BucketStore for MemoryBucketStore {
    fn get_by_cell(&self, cell: &CellId) -> Result<Option<GeoBucket>> {
        self.with_inner(|inner| inner.buckets.get(cell).cloned())
    }

    fn get_by_cells(&self, cells: &[CellId]) -> Result<Vec<GeoBucket>> {
        self.with_inner(|inner| {
            let wanted: HashSet<&CellId> = cells.iter().collect();
            let mut found = inner
                .buckets
                .values()
                .filter(|bucket| wanted.contains(&bucket.cell))
                .cloned()
                .collect::<Vec<_>>();
            sort_buckets_by_count_desc_name_asc(&mut found);
            found
        })
    }

    fn create_if_absent(&self, bucket: GeoBucket) -> Result<CreateOutcome> {
        self.with_inner(|inner| match inner.buckets.get(&bucket.cell) {
            Some(existing) => CreateOutcome {
                bucket: existing.clone(),
                created: false,
            },
            None => {
                inner.buckets.insert(bucket.cell, bucket.clone());
                CreateOutcome {
                    bucket,
                    created: true,
                }
            }
        })
    }

    fn record_assignment(
        &self,
        cell: &CellId,
        name: &str,
        variant_cap: usize,
    ) -> Result<GeoBucket> {
        self.with_inner(|inner| {
            let Some(bucket) = inner.buckets.get_mut(cell) else {
                return Err(BucketError::StoreUnavailable(format!(
                    "assignment recorded against missing bucket {cell}"
                )));
            };
            bucket.property_count += 1;
            if !bucket.has_variant(name) && bucket.name_variants.len() < variant_cap {
                bucket.name_variants.push(name.to_string());
            }
            bucket.updated_at = Utc::now();
            Ok(bucket.clone())
        })?
    }

    fn upsert_index_entry(&self, entry: LocationIndexEntry) -> Result<()> {
        self.with_inner(|inner| {
            let key = (entry.normalized_name.clone(), entry.cell);
            if inner.entry_keys.insert(key) {
                inner.entries.push(entry);
            }
        })
    }

    fn find_name_candidates(&self, normalized_query: &str) -> Result<Vec<LocationIndexEntry>> {
        let probe = leading_trigram(normalized_query);
        let code = phonetic_code(normalized_query);
        self.with_inner(|inner| {
            inner
                .entries
                .iter()
                .filter(|entry| {
                    (!probe.is_empty() && entry.normalized_name.contains(&probe))
                        || (!code.is_empty() && entry.phonetic_code == code)
                })
                .cloned()
                .collect()
        })
    }

    fn list_buckets(&self) -> Result<Vec<GeoBucket>> {
        self.with_inner(|inner| {
            let mut buckets = inner.buckets.values().cloned().collect::<Vec<_>>();
            sort_buckets_by_count_desc_name_asc(&mut buckets);
            buckets
        })
    }

    fn stats(&self) -> Result<BucketStats> {
        self.with_inner(|inner| {
            let buckets = inner.buckets.values().cloned().collect::<Vec<_>>();
            compute_stats(&buckets)
        })
    }
}

/// First three non-space characters of the query; the substring probe used
/// by candidate lookup on both backends.
pub(super) fn leading_trigram(normalized_query: &str) -> String {
    normalized_query
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::{MemoryBucketStore, leading_trigram};
    use crate::config::GridConfig;
    use crate::grid::{CellId, GridIndexer};
    use crate::matcher::{phonetic_code, trigrams};
    use crate::models::{GeoBucket, GeoPoint, LocationIndexEntry};
    use crate::store::BucketStore;

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
            centroid: GeoPoint::new(0.0, 0.0),
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
    fn create_if_absent_returns_existing_row_to_the_race_loser() {
        let store = MemoryBucketStore::new();
        let cell = cell_at(6.4698, 3.6285);
        let first = store.create_if_absent(bucket(cell, "sangotedo")).unwrap();
        assert!(first.created);

        let second = store.create_if_absent(bucket(cell, "sango tedo")).unwrap();
        assert!(!second.created);
        assert_eq!(second.bucket.canonical_name, "sangotedo");
        assert_eq!(store.list_buckets().unwrap().len(), 1);
    }

    #[test]
    fn record_assignment_increments_and_bounds_variants() {
        let store = MemoryBucketStore::new();
        let cell = cell_at(6.4698, 3.6285);
        store.create_if_absent(bucket(cell, "sangotedo")).unwrap();

        let updated = store.record_assignment(&cell, "sangotedo ajah", 2).unwrap();
        assert_eq!(updated.property_count, 2);
        assert_eq!(updated.name_variants.len(), 2);

        // At the cap: count still moves, variant is skipped.
        let capped = store.record_assignment(&cell, "sango tedo", 2).unwrap();
        assert_eq!(capped.property_count, 3);
        assert_eq!(capped.name_variants.len(), 2);

        // Known variant never duplicates.
        let repeat = store.record_assignment(&cell, "sangotedo ajah", 5).unwrap();
        assert_eq!(repeat.property_count, 4);
        assert_eq!(repeat.name_variants.len(), 2);
    }

    #[test]
    fn index_entries_dedup_on_name_and_cell() {
        let store = MemoryBucketStore::new();
        let cell = cell_at(6.4698, 3.6285);
        store.upsert_index_entry(entry(cell, "sangotedo")).unwrap();
        store.upsert_index_entry(entry(cell, "sangotedo")).unwrap();
        store.upsert_index_entry(entry(cell, "sangotedo ajah")).unwrap();
        assert_eq!(store.index_entries().unwrap().len(), 2);
    }

    #[test]
    fn candidate_probe_matches_substring_or_phonetic_code() {
        let store = MemoryBucketStore::new();
        let cell = cell_at(6.4698, 3.6285);
        store.upsert_index_entry(entry(cell, "sangotedo")).unwrap();
        store.upsert_index_entry(entry(cell, "ikoyi")).unwrap();

        let hits = store.find_name_candidates("sangotedo").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].normalized_name, "sangotedo");

        // Phonetic probe: same consonant skeleton, different leading chars.
        let mut phonetic_twin = entry(cell, "sangotedo");
        phonetic_twin.normalized_name = "zzz".to_string();
        phonetic_twin.trigrams = BTreeSet::new();
        let store2 = MemoryBucketStore::new();
        store2.upsert_index_entry(phonetic_twin).unwrap();
        let hits = store2.find_name_candidates("sangotedo").unwrap();
        assert_eq!(hits.len(), 1, "phonetic code probe should recall the row");

        assert!(store.find_name_candidates("").unwrap().is_empty());
    }

    #[test]
    fn stats_aggregate_counts() {
        let store = MemoryBucketStore::new();
        let a = cell_at(6.5, 3.3);
        let b = cell_at(6.6, 3.4);
        store.create_if_absent(bucket(a, "yaba")).unwrap();
        store.create_if_absent(bucket(b, "ikeja")).unwrap();
        store.record_assignment(&b, "ikeja", 20).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_buckets, 2);
        assert_eq!(stats.total_properties, 3);
        assert_eq!(stats.max_properties_in_bucket, 2);
        assert_eq!(stats.min_properties_in_bucket, 1);
        assert_eq!(stats.buckets_with_properties, 2);
        assert_eq!(stats.empty_buckets, 0);
    }

    #[test]
    fn leading_trigram_skips_spaces() {
        assert_eq!(leading_trigram("le k ki"), "lek");
        assert_eq!(leading_trigram("vi"), "vi");
        assert_eq!(leading_trigram(""), "");
    }
}
