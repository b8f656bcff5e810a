// Public fallible APIs in this crate share one concrete error contract (`BucketError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod client;
pub mod config;
pub mod error;
pub mod grid;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod oplog;
pub mod resolver;
pub mod store;

pub use client::BucketCatalog;
pub use config::EngineConfig;
pub use error::{BucketError, Result};
pub use grid::{CellId, GridIndexer};
pub use models::{GeoBucket, GeoPoint, MatchLayer};
pub use resolver::ResolutionEngine;
pub use store::{BucketStore, MemoryBucketStore, SqliteBucketStore};
