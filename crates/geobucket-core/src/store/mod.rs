use crate::error::Result;
use crate::grid::CellId;
use crate::models::{BucketStats, GeoBucket, LocationIndexEntry};

mod memory;
mod migration;
mod sqlite;

pub use memory::MemoryBucketStore;
pub use sqlite::SqliteBucketStore;

/// Result of `create_if_absent`: the surviving row plus whether this call
/// inserted it. A lost create race returns the winner's row with
/// `created = false`; the race never surfaces as an error.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub bucket: GeoBucket,
    pub created: bool,
}

/// Collaborator contract the resolution engine depends on. The engine holds
/// no bucket state between calls, so any number of assigns/resolves may run
/// concurrently as long as an implementation keeps `create_if_absent` and
/// `record_assignment` atomic per cell. Reads may serve a slightly stale
/// snapshot.
pub trait BucketStore: Send + Sync {
    fn get_by_cell(&self, cell: &CellId) -> Result<Option<GeoBucket>>;

    /// Buckets for any of `cells`, ordered by property count descending
    /// then canonical name, so candidate iteration is deterministic.
    fn get_by_cells(&self, cells: &[CellId]) -> Result<Vec<GeoBucket>>;

    /// Atomic per cell id: exactly one row survives concurrent creates.
    fn create_if_absent(&self, bucket: GeoBucket) -> Result<CreateOutcome>;

    /// Atomically increments the property count and appends `name` to the
    /// variant set when new and under `variant_cap`. Two concurrent calls
    /// on one bucket must never lose an increment.
    fn record_assignment(&self, cell: &CellId, name: &str, variant_cap: usize)
    -> Result<GeoBucket>;

    /// No-op when the `(normalized_name, cell)` pair is already indexed.
    fn upsert_index_entry(&self, entry: LocationIndexEntry) -> Result<()>;

    /// Recall-oriented candidate fetch for fuzzy name lookup: probes the
    /// leading trigram as a substring and the phonetic code for equality.
    /// Supersets are fine; the matcher owns the precise accept decision.
    fn find_name_candidates(&self, normalized_query: &str) -> Result<Vec<LocationIndexEntry>>;

    /// All buckets, ordered by property count descending then canonical
    /// name.
    fn list_buckets(&self) -> Result<Vec<GeoBucket>>;

    fn stats(&self) -> Result<BucketStats>;
}

pub(crate) fn compute_stats(buckets: &[GeoBucket]) -> BucketStats {
    let total_buckets = buckets.len() as u64;
    if total_buckets == 0 {
        return BucketStats::default();
    }
    let counts = buckets.iter().map(|b| b.property_count);
    let total_properties: u64 = counts.clone().sum();
    let buckets_with_properties = counts.clone().filter(|&c| c > 0).count() as u64;
    BucketStats {
        total_buckets,
        total_properties,
        avg_properties_per_bucket: total_properties as f64 / total_buckets as f64,
        max_properties_in_bucket: counts.clone().max().unwrap_or(0),
        min_properties_in_bucket: counts.min().unwrap_or(0),
        buckets_with_properties,
        empty_buckets: total_buckets - buckets_with_properties,
    }
}

pub(crate) fn sort_buckets_by_count_desc_name_asc(buckets: &mut [GeoBucket]) {
    buckets.sort_by(|a, b| {
        b.property_count
            .cmp(&a.property_count)
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
            .then_with(|| a.cell.cmp(&b.cell))
    });
}
