use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::CellId;

/// WGS84 point, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Canonical grouping unit: one bucket per grid cell.
///
/// The centroid is always the deterministic center of the cell, never an
/// average of assigned points, so recomputation is idempotent. Buckets are
/// created lazily on first assignment and only ever grow (`property_count`,
/// `name_variants`); the resolve path never writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBucket {
    pub cell: CellId,
    pub centroid: GeoPoint,
    pub canonical_name: String,
    pub name_variants: Vec<String>,
    pub property_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeoBucket {
    #[must_use]
    pub fn has_variant(&self, normalized_name: &str) -> bool {
        self.canonical_name == normalized_name
            || self.name_variants.iter().any(|v| v == normalized_name)
    }
}

/// Denormalized row backing fuzzy lookup without touching bucket rows.
///
/// One row per distinct `(normalized_name, cell)` pair; immutable once
/// written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationIndexEntry {
    pub original_name: String,
    pub normalized_name: String,
    pub cell: CellId,
    pub phonetic_code: String,
    pub trigrams: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate bucket counters for reporting collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub total_buckets: u64,
    pub total_properties: u64,
    pub avg_properties_per_bucket: f64,
    pub max_properties_in_bucket: u64,
    pub min_properties_in_bucket: u64,
    pub buckets_with_properties: u64,
    pub empty_buckets: u64,
}

/// Result of one assignment: the bucket the property now references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignOutcome {
    pub bucket: GeoBucket,
    /// True when this call created the bucket row (won the create race).
    pub created: bool,
}

/// The fallback ladder, in execution order. Each layer is a pure candidate
/// function over (query, store snapshot); the orchestrator unions and
/// short-circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLayer {
    ExactCell,
    NeighborName,
    FuzzyName,
    ExpandedSpatial,
}

impl MatchLayer {
    pub const ORDERED: [Self; 4] = [
        Self::ExactCell,
        Self::NeighborName,
        Self::FuzzyName,
        Self::ExpandedSpatial,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExactCell => "exact_cell",
            Self::NeighborName => "neighbor_name",
            Self::FuzzyName => "fuzzy_name",
            Self::ExpandedSpatial => "expanded_spatial",
        }
    }
}

/// One resolved bucket plus the first layer that reached it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedMatch {
    pub bucket: GeoBucket,
    pub layer: MatchLayer,
}

/// Per-layer trace record: how many candidates the layer produced and how
/// many survived dedup into the running union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTrace {
    pub layer: MatchLayer,
    pub candidates: usize,
    pub accepted: usize,
}

/// Diagnostic record attached to every resolve outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveTrace {
    pub trace_id: String,
    pub query: String,
    pub normalized_query: String,
    pub layers: Vec<LayerTrace>,
    pub stop_reason: String,
    pub latency_ms: u128,
}

/// Ordered, deduplicated resolve result. An empty match list is a valid
/// outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOutcome {
    pub matches: Vec<ResolvedMatch>,
    pub trace: ResolveTrace,
}

impl ResolveOutcome {
    #[must_use]
    pub fn cells(&self) -> Vec<CellId> {
        self.matches.iter().map(|m| m.bucket.cell).collect()
    }
}

/// One line of the JSONL request log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub request_id: String,
    pub operation: String,
    pub status: String,
    pub latency_ms: u128,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
