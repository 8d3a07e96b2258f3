//! Result sink: durable logging seam for pipeline outcomes
//!
//! Every invocation produces exactly one `QueryRecord`, hits or
//! rejections included. The default in-memory `QueryLog` keeps records
//! and aggregate statistics for operational visibility; deployments
//! that need durable storage implement `ResultSink` over their own
//! store and inject it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::query::pipeline::PipelineResult;

/// One logged pipeline invocation
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub id: Uuid,
    pub requester_id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub result: PipelineResult,
}

/// Accepts pipeline outcomes for durable logging
pub trait ResultSink: Send + Sync {
    /// Record one outcome. Must not block the pipeline for long and must
    /// not panic; a lost record is preferable to a failed query.
    fn record(&self, record: QueryRecord);
}

/// Aggregate statistics over logged queries
#[derive(Debug, Clone, Default)]
pub struct QueryLogStats {
    pub processed: u64,
    pub succeeded: u64,
    pub rejected: u64,
    pub rate_limited: u64,
    pub cache_hits: u64,
    pub degraded: u64,
    pub tokens_used: u64,
    pub total_latency_ms: u64,
}

impl QueryLogStats {
    /// Mean end-to-end latency over all processed queries
    pub fn mean_latency_ms(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.processed as f64
        }
    }
}

/// In-memory result sink
#[derive(Clone)]
pub struct QueryLog {
    records: Arc<Mutex<Vec<QueryRecord>>>,
    stats: Arc<Mutex<QueryLogStats>>,
}

impl QueryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(QueryLogStats::default())),
        }
    }

    /// Current aggregate statistics
    pub fn stats(&self) -> QueryLogStats {
        self.stats.lock().unwrap().clone()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Whether any record has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last `n` records, oldest first
    pub fn recent(&self, n: usize) -> Vec<QueryRecord> {
        let records = self.records.lock().unwrap();
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }
}

impl ResultSink for QueryLog {
    fn record(&self, record: QueryRecord) {
        {
            let mut stats = self.stats.lock().unwrap();
            stats.processed += 1;
            stats.tokens_used += record.result.tokens_used as u64;
            stats.total_latency_ms += record.result.latency_ms;

            if record.result.success {
                stats.succeeded += 1;
                if record.result.cache_hit {
                    stats.cache_hits += 1;
                }
            } else {
                match record.result.error.as_deref() {
                    Some("rate_limited") => stats.rate_limited += 1,
                    Some("empty_input") | Some("too_long") | Some("off_topic")
                    | Some("injection_attempt") => stats.rejected += 1,
                    _ => stats.degraded += 1,
                }
            }
        }

        let mut records = self.records.lock().unwrap();
        records.push(record);
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new()
    }
}
