//! Warehouse row schema for aggregate statistics.

use serde::{Deserialize, Serialize};

use linewatch_core::AggregateStats;

/// One aggregate record as consumed by the warehouse sink.
///
/// The schema is fixed: field names and order are part of the external
/// contract, and the sink ignores unknown extra fields. Timestamps are epoch
/// milliseconds here; the object-storage boundary normalizes them to seconds
/// via [`jsonl::normalize_timestamps`](crate::jsonl::normalize_timestamps).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub machine_id: String,
    pub avg_runtime: f64,
    pub max_runtime: f64,
    pub bottleneck_ratio: f64,
    pub bottleneck_score: f64,
    pub alert: bool,
    pub timestamp: i64,
}

impl From<&AggregateStats> for AggregateRow {
    fn from(stats: &AggregateStats) -> Self {
        Self {
            machine_id: stats.machine_id.clone(),
            avg_runtime: stats.avg_runtime,
            max_runtime: stats.max_runtime,
            bottleneck_ratio: stats.bottleneck_ratio,
            bottleneck_score: stats.bottleneck_score,
            alert: stats.alert,
            timestamp: stats.computed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
