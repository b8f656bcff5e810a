use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{
    AssignOutcome, BucketStats, GeoBucket, GeoPoint, RequestLogEntry, ResolveOutcome,
};
use crate::oplog::RequestLog;
use crate::resolver::ResolutionEngine;
use crate::store::BucketStore;

/// Service facade the API layer talks to: one store, one engine, one
/// optional request log. The catalog owns no request state, so it can be
/// cloned and shared across handler tasks.
#[derive(Clone)]
pub struct BucketCatalog {
    store: Arc<dyn BucketStore>,
    engine: ResolutionEngine,
    request_log: Option<RequestLog>,
}

impl std::fmt::Debug for BucketCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketCatalog").finish_non_exhaustive()
    }
}

impl BucketCatalog {
    pub fn new(store: Arc<dyn BucketStore>, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            store,
            engine: ResolutionEngine::new(config)?,
            request_log: None,
        })
    }

    #[must_use]
    pub fn with_request_log(mut self, log: RequestLog) -> Self {
        self.request_log = Some(log);
        self
    }

    #[must_use]
    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    pub fn assign(&self, point: GeoPoint, raw_name: &str) -> Result<AssignOutcome> {
        let started = Instant::now();
        let result = self.engine.assign(self.store.as_ref(), point, raw_name);
        match &result {
            Ok(outcome) => self.log_ok(
                "assign",
                started,
                None,
                Some(json!({
                    "cell": outcome.bucket.cell.to_string(),
                    "created": outcome.created,
                })),
            ),
            Err(err) => self.log_error("assign", started, err),
        }
        result
    }

    pub fn resolve(&self, query: &str, point: Option<GeoPoint>) -> Result<ResolveOutcome> {
        let started = Instant::now();
        let result = self.engine.resolve(self.store.as_ref(), query, point);
        match &result {
            Ok(outcome) => self.log_ok(
                "resolve",
                started,
                Some(outcome.trace.trace_id.clone()),
                Some(json!({
                    "matches": outcome.matches.len(),
                    "stop_reason": outcome.trace.stop_reason,
                })),
            ),
            Err(err) => self.log_error("resolve", started, err),
        }
        result
    }

    pub fn buckets(&self) -> Result<Vec<GeoBucket>> {
        self.store.list_buckets()
    }

    pub fn stats(&self) -> Result<BucketStats> {
        self.store.stats()
    }

    fn log_ok(
        &self,
        operation: &str,
        started: Instant,
        trace_id: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        self.try_log(&RequestLogEntry {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: "ok".to_string(),
            latency_ms: started.elapsed().as_millis(),
            created_at: Utc::now().to_rfc3339(),
            trace_id,
            error_code: None,
            error_message: None,
            details,
        });
    }

    fn log_error(&self, operation: &str, started: Instant, err: &crate::error::BucketError) {
        self.try_log(&RequestLogEntry {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: "error".to_string(),
            latency_ms: started.elapsed().as_millis(),
            created_at: Utc::now().to_rfc3339(),
            trace_id: None,
            error_code: Some(err.code().to_string()),
            error_message: Some(err.to_string()),
            details: None,
        });
    }

    /// Logging is best-effort; a full disk must not fail the operation.
    fn try_log(&self, entry: &RequestLogEntry) {
        if let Some(log) = &self.request_log {
            let _ = log.append(entry);
        }
    }
}
