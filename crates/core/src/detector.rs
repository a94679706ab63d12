//! Threshold rule evaluation.
//!
//! Detection is split into two independently evaluated tiers feeding the same
//! alert path:
//!
//! - **record tier** ([`evaluate_record`]) -- immediate low-latency checks on a
//!   single telemetry sample, upstream of aggregation;
//! - **aggregate tier** ([`evaluate_stats`]) -- checks on the statistics of a
//!   closed window.
//!
//! Rules never short-circuit: every matching reason is collected so no
//! diagnostic information is lost when several conditions fire together. An
//! empty result means "nothing to report" and is not an error.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::stats::AggregateStats;
use crate::telemetry::TelemetryRecord;

// ---------------------------------------------------------------------------
// TriggerReason
// ---------------------------------------------------------------------------

/// A named condition contributing to an alert.
///
/// Reasons are kept in a `BTreeSet`, so the derived ordering doubles as the
/// deterministic serialization order of the `reasons` array.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    /// Record tier: downtime above the configured threshold.
    HighDowntime,
    /// Record tier: runtime below the configured threshold.
    LowRuntime,
    /// Aggregate tier: bottleneck ratio above the configured threshold.
    RatioExceeded,
    /// Aggregate tier: bottleneck score above the configured threshold.
    ScoreExceeded,
}

impl TriggerReason {
    /// Stable string form used in rendered alerts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighDowntime => "high-downtime",
            Self::LowRuntime => "low-runtime",
            Self::RatioExceeded => "ratio-exceeded",
            Self::ScoreExceeded => "score-exceeded",
        }
    }

    /// Whether this reason comes from the aggregate tier.
    pub fn is_aggregate_tier(&self) -> bool {
        matches!(self, Self::RatioExceeded | Self::ScoreExceeded)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A non-empty set of triggered reasons for one machine, handed from the
/// detector stage to the alert dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub machine_id: String,
    /// Timestamp of the originating record or window close, epoch ms.
    pub timestamp: i64,
    pub reasons: BTreeSet<TriggerReason>,
}

// ---------------------------------------------------------------------------
// Rule evaluation
// ---------------------------------------------------------------------------

/// Evaluate the record tier against a single telemetry sample.
pub fn evaluate_record(
    record: &TelemetryRecord,
    thresholds: &Thresholds,
) -> BTreeSet<TriggerReason> {
    let mut reasons = BTreeSet::new();

    if record.downtime_minutes > thresholds.downtime_threshold {
        reasons.insert(TriggerReason::HighDowntime);
    }
    if record.runtime_minutes < thresholds.runtime_threshold {
        reasons.insert(TriggerReason::LowRuntime);
    }

    reasons
}

/// Evaluate the aggregate tier against a closed window's statistics.
pub fn evaluate_stats(stats: &AggregateStats, thresholds: &Thresholds) -> BTreeSet<TriggerReason> {
    let mut reasons = BTreeSet::new();

    if stats.bottleneck_ratio > thresholds.ratio_threshold {
        reasons.insert(TriggerReason::RatioExceeded);
    }
    if stats.bottleneck_score > thresholds.score_threshold {
        reasons.insert(TriggerReason::ScoreExceeded);
    }

    reasons
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MachineStatus;

    fn record(runtime: f64, downtime: f64) -> TelemetryRecord {
        TelemetryRecord {
            machine_id: "M-0".to_string(),
            timestamp: 1,
            runtime_minutes: runtime,
            downtime_minutes: downtime,
            production_count: 0,
            status: MachineStatus::Normal,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    // -- record tier ----------------------------------------------------------

    #[test]
    fn healthy_record_triggers_nothing() {
        let reasons = evaluate_record(&record(60.0, 5.0), &thresholds());
        assert!(reasons.is_empty());
    }

    #[test]
    fn high_downtime_triggers() {
        let reasons = evaluate_record(&record(60.0, 25.0), &thresholds());
        assert_eq!(
            reasons.into_iter().collect::<Vec<_>>(),
            vec![TriggerReason::HighDowntime]
        );
    }

    #[test]
    fn low_runtime_triggers() {
        let reasons = evaluate_record(&record(10.0, 0.0), &thresholds());
        assert!(reasons.contains(&TriggerReason::LowRuntime));
        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn both_record_rules_collect_without_short_circuit() {
        let reasons = evaluate_record(&record(10.0, 45.0), &thresholds());
        assert!(reasons.contains(&TriggerReason::HighDowntime));
        assert!(reasons.contains(&TriggerReason::LowRuntime));
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn thresholds_are_exclusive_bounds() {
        // Exactly at the threshold is not a violation.
        let reasons = evaluate_record(&record(30.0, 20.0), &thresholds());
        assert!(reasons.is_empty());
    }

    // -- aggregate tier -------------------------------------------------------

    #[test]
    fn ratio_above_threshold_triggers() {
        let stats = AggregateStats::compute("M-0", &[80.0, 90.0, 100.0], &thresholds(), 0);
        let reasons = evaluate_stats(&stats, &thresholds());
        assert!(reasons.contains(&TriggerReason::RatioExceeded));
    }

    #[test]
    fn moderate_ratio_does_not_trigger() {
        let stats = AggregateStats::compute("M-0", &[0.0, 50.0, 100.0], &thresholds(), 0);
        let reasons = evaluate_stats(&stats, &thresholds());
        assert!(reasons.is_empty());
    }

    #[test]
    fn extreme_average_triggers_both_aggregate_rules() {
        // avg 120 => score 1.2 > 1.0 and ratio 120/130 > 0.8.
        let stats = AggregateStats::compute("M-0", &[110.0, 120.0, 130.0], &thresholds(), 0);
        let reasons = evaluate_stats(&stats, &thresholds());
        assert!(reasons.contains(&TriggerReason::RatioExceeded));
        assert!(reasons.contains(&TriggerReason::ScoreExceeded));
    }

    // -- serialization --------------------------------------------------------

    #[test]
    fn reasons_serialize_as_kebab_case() {
        let json = serde_json::to_string(&TriggerReason::HighDowntime).unwrap();
        assert_eq!(json, "\"high-downtime\"");
        assert_eq!(TriggerReason::RatioExceeded.as_str(), "ratio-exceeded");
    }

    #[test]
    fn reason_set_serializes_in_deterministic_order() {
        let mut reasons = BTreeSet::new();
        reasons.insert(TriggerReason::ScoreExceeded);
        reasons.insert(TriggerReason::HighDowntime);

        let json = serde_json::to_string(&reasons).unwrap();
        assert_eq!(json, "[\"high-downtime\",\"score-exceeded\"]");
    }
}
