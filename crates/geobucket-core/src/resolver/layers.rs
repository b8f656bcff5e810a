use std::collections::HashSet;

use crate::error::Result;
use crate::grid::{CellId, GridIndexer};
use crate::matcher::FuzzyMatcher;
use crate::models::{GeoBucket, MatchLayer};
use crate::store::BucketStore;

const NEIGHBOR_RING: u32 = 1;
const EXPANDED_RING: u32 = 2;

/// Shared read-only inputs for one resolve call. Every layer is a pure
/// function over this context and the store snapshot.
pub(super) struct LayerContext<'a> {
    pub store: &'a dyn BucketStore,
    pub grid: &'a GridIndexer,
    pub matcher: &'a FuzzyMatcher,
    pub normalized_query: &'a str,
    pub anchor: Option<CellId>,
}

/// Spatial layers need an anchor cell; name layers need a non-empty
/// normalized query. The exact-cell layer is name-independent.
pub(super) fn is_applicable(layer: MatchLayer, ctx: &LayerContext<'_>) -> bool {
    match layer {
        MatchLayer::ExactCell => ctx.anchor.is_some(),
        MatchLayer::NeighborName | MatchLayer::ExpandedSpatial => {
            ctx.anchor.is_some() && !ctx.normalized_query.is_empty()
        }
        MatchLayer::FuzzyName => !ctx.normalized_query.is_empty(),
    }
}

pub(super) fn candidates_for(layer: MatchLayer, ctx: &LayerContext<'_>) -> Result<Vec<GeoBucket>> {
    match layer {
        MatchLayer::ExactCell => exact_cell(ctx),
        MatchLayer::NeighborName => neighbor_name(ctx),
        MatchLayer::FuzzyName => fuzzy_name(ctx),
        MatchLayer::ExpandedSpatial => expanded_spatial(ctx),
    }
}

fn exact_cell(ctx: &LayerContext<'_>) -> Result<Vec<GeoBucket>> {
    let Some(anchor) = ctx.anchor else {
        return Ok(Vec::new());
    };
    Ok(ctx.store.get_by_cell(&anchor)?.into_iter().collect())
}

fn neighbor_name(ctx: &LayerContext<'_>) -> Result<Vec<GeoBucket>> {
    let Some(anchor) = ctx.anchor else {
        return Ok(Vec::new());
    };
    let ring = ctx.grid.ring_of(anchor, NEIGHBOR_RING);
    let buckets = ctx.store.get_by_cells(&ring)?;
    Ok(buckets
        .into_iter()
        .filter(|bucket| bucket.has_variant(ctx.normalized_query))
        .collect())
}

fn fuzzy_name(ctx: &LayerContext<'_>) -> Result<Vec<GeoBucket>> {
    let entries = ctx.store.find_name_candidates(ctx.normalized_query)?;
    let mut cells = Vec::new();
    let mut seen = HashSet::new();
    for entry in entries {
        if ctx
            .matcher
            .matches(ctx.normalized_query, &entry.normalized_name)
            && seen.insert(entry.cell)
        {
            cells.push(entry.cell);
        }
    }

    let mut buckets = Vec::with_capacity(cells.len());
    for cell in cells {
        if let Some(bucket) = ctx.store.get_by_cell(&cell)? {
            buckets.push(bucket);
        }
    }
    Ok(buckets)
}

/// Widest net: two rings out, accepting whole-token overlap as well as a
/// full fuzzy match, so "sangotedo" still reaches a "sangotedo ajah"
/// bucket two cells away.
fn expanded_spatial(ctx: &LayerContext<'_>) -> Result<Vec<GeoBucket>> {
    let Some(anchor) = ctx.anchor else {
        return Ok(Vec::new());
    };
    let ring = ctx.grid.ring_of(anchor, EXPANDED_RING);
    let buckets = ctx.store.get_by_cells(&ring)?;
    Ok(buckets
        .into_iter()
        .filter(|bucket| relaxed_name_match(ctx.matcher, ctx.normalized_query, bucket))
        .collect())
}

fn relaxed_name_match(matcher: &FuzzyMatcher, query: &str, bucket: &GeoBucket) -> bool {
    let query_tokens: HashSet<&str> = query.split(' ').collect();
    std::iter::once(bucket.canonical_name.as_str())
        .chain(bucket.name_variants.iter().map(String::as_str))
        .any(|name| shares_token(&query_tokens, name) || matcher.matches(query, name))
}

fn shares_token(query_tokens: &HashSet<&str>, name: &str) -> bool {
    name.split(' ').any(|token| query_tokens.contains(token))
}
