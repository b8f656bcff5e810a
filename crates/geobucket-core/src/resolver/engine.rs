use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{EngineConfig, ResolverConfig};
use crate::error::{BucketError, Result};
use crate::grid::{CellId, GridIndexer};
use crate::matcher::{FuzzyMatcher, phonetic_code, trigrams};
use crate::models::{
    AssignOutcome, GeoBucket, GeoPoint, LayerTrace, LocationIndexEntry, MatchLayer,
    ResolveOutcome, ResolveTrace, ResolvedMatch,
};
use crate::normalize::NameNormalizer;
use crate::store::BucketStore;

use super::layers::{LayerContext, candidates_for, is_applicable};

const STOP_MIN_RESULTS: &str = "min_results_reached";
const STOP_LAYERS_EXHAUSTED: &str = "layers_exhausted";

/// Orchestrates grid, normalizer and matcher over a bucket store. Holds no
/// bucket state between calls; any number of assigns and resolves may run
/// concurrently against the same store.
#[derive(Debug, Clone)]
pub struct ResolutionEngine {
    grid: GridIndexer,
    normalizer: NameNormalizer,
    matcher: FuzzyMatcher,
    config: ResolverConfig,
}

impl ResolutionEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            grid: GridIndexer::new(&config.grid)?,
            normalizer: NameNormalizer::new(&config.normalizer)?,
            matcher: FuzzyMatcher::new(config.matcher),
            config: config.resolver,
        })
    }

    #[must_use]
    pub const fn grid(&self) -> &GridIndexer {
        &self.grid
    }

    #[must_use]
    pub const fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    /// Property-creation path: bucket the point, fold the name into the
    /// bucket's variant set, and index the pair for fuzzy lookup.
    ///
    /// A name that normalizes to empty fails before anything is written, so
    /// a rejected assign leaves no partial state. Losing the create race to
    /// a concurrent assign on the same new cell falls back to the existing
    /// bucket, so no increment is ever lost.
    pub fn assign(
        &self,
        store: &dyn BucketStore,
        point: GeoPoint,
        raw_name: &str,
    ) -> Result<AssignOutcome> {
        let cell = self.grid.cell_of(point)?;
        let name = self.normalizer.normalize(raw_name);
        if name.is_empty() {
            return Err(BucketError::UnresolvableName(raw_name.to_string()));
        }

        let (bucket, created) = if store.get_by_cell(&cell)?.is_some() {
            let bucket = store.record_assignment(&cell, &name, self.config.variant_cap)?;
            (bucket, false)
        } else {
            let now = Utc::now();
            let outcome = store.create_if_absent(GeoBucket {
                cell,
                centroid: self.grid.center_of(cell),
                canonical_name: name.clone(),
                name_variants: vec![name.clone()],
                property_count: 1,
                created_at: now,
                updated_at: now,
            })?;
            if outcome.created {
                (outcome.bucket, true)
            } else {
                let bucket = store.record_assignment(&cell, &name, self.config.variant_cap)?;
                (bucket, false)
            }
        };

        store.upsert_index_entry(LocationIndexEntry {
            original_name: raw_name.trim().to_string(),
            normalized_name: name.clone(),
            cell,
            phonetic_code: phonetic_code(&name),
            trigrams: trigrams(&name),
            created_at: Utc::now(),
        })?;

        Ok(AssignOutcome { bucket, created })
    }

    /// Search path, read-only. Walks the layer ladder in order, unioning
    /// candidates and deduplicating by cell; the first layer to reach a
    /// bucket is reported as its match reason. The ladder stops escalating
    /// once the union is non-empty and has reached
    /// `min_results_before_expand`.
    pub fn resolve(
        &self,
        store: &dyn BucketStore,
        query: &str,
        point: Option<GeoPoint>,
    ) -> Result<ResolveOutcome> {
        let started = Instant::now();
        let normalized = self.normalizer.normalize(query);
        let anchor = match point {
            Some(p) => Some(self.grid.cell_of(p)?),
            None => None,
        };

        let ctx = LayerContext {
            store,
            grid: &self.grid,
            matcher: &self.matcher,
            normalized_query: &normalized,
            anchor,
        };

        let mut matches: Vec<ResolvedMatch> = Vec::new();
        let mut seen: HashSet<CellId> = HashSet::new();
        let mut layer_traces = Vec::new();
        let mut stop_reason = STOP_LAYERS_EXHAUSTED;

        for layer in MatchLayer::ORDERED {
            if !is_applicable(layer, &ctx) {
                continue;
            }
            let candidates = candidates_for(layer, &ctx)?;
            let produced = candidates.len();
            let mut accepted = 0usize;
            for bucket in candidates {
                if seen.insert(bucket.cell) {
                    matches.push(ResolvedMatch { bucket, layer });
                    accepted += 1;
                }
            }
            layer_traces.push(LayerTrace {
                layer,
                candidates: produced,
                accepted,
            });
            if !matches.is_empty() && matches.len() >= self.config.min_results_before_expand {
                stop_reason = STOP_MIN_RESULTS;
                break;
            }
        }

        Ok(ResolveOutcome {
            matches,
            trace: ResolveTrace {
                trace_id: Uuid::new_v4().to_string(),
                query: query.to_string(),
                normalized_query: normalized,
                layers: layer_traces,
                stop_reason: stop_reason.to_string(),
                latency_ms: started.elapsed().as_millis(),
            },
        })
    }
}
