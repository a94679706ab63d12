//! Per-machine aggregate window statistics.

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

/// Statistics computed over one closed aggregation window for one machine.
///
/// Each computation supersedes the previous one for that machine -- windows
/// are never merged and no history is retained inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub machine_id: String,
    /// Number of samples in the closed window.
    pub sample_count: usize,
    /// Arithmetic mean of the window's runtime samples.
    pub avg_runtime: f64,
    /// Largest runtime sample in the window.
    pub max_runtime: f64,
    /// `avg_runtime / max_runtime`; in `0..=1` whenever `max_runtime > 0`.
    pub bottleneck_ratio: f64,
    /// `avg_runtime / 100.0`.
    pub bottleneck_score: f64,
    /// Whether either aggregate-tier threshold was exceeded.
    pub alert: bool,
    /// When the window closed, epoch milliseconds.
    pub computed_at: i64,
}

impl AggregateStats {
    /// Compute statistics for a closed window of runtime samples.
    ///
    /// An empty sample set yields zeroed averages with `max_runtime = 1.0`
    /// so the ratio never divides by zero.
    pub fn compute(
        machine_id: impl Into<String>,
        samples: &[f64],
        thresholds: &Thresholds,
        computed_at: i64,
    ) -> Self {
        let sample_count = samples.len();
        let avg_runtime = if sample_count == 0 {
            0.0
        } else {
            samples.iter().sum::<f64>() / sample_count as f64
        };
        let max_runtime = samples.iter().copied().fold(f64::MIN, f64::max).max(1.0);

        let bottleneck_ratio = avg_runtime / max_runtime;
        let bottleneck_score = avg_runtime / 100.0;
        let alert = bottleneck_ratio > thresholds.ratio_threshold
            || bottleneck_score > thresholds.score_threshold;

        Self {
            machine_id: machine_id.into(),
            sample_count,
            avg_runtime,
            max_runtime,
            bottleneck_ratio,
            bottleneck_score,
            alert,
            computed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn ten_sample_window_computes_mean_and_max() {
        let samples: Vec<f64> = (1..=10).map(|i| (i * 10) as f64).collect();
        let stats = AggregateStats::compute("M-0", &samples, &thresholds(), 1_000);

        assert_eq!(stats.sample_count, 10);
        assert!((stats.avg_runtime - 55.0).abs() < f64::EPSILON);
        assert_eq!(stats.max_runtime, 100.0);
        assert!((stats.bottleneck_ratio - 0.55).abs() < 1e-9);
        assert!((stats.bottleneck_score - 0.55).abs() < 1e-9);
        assert_eq!(stats.computed_at, 1_000);
    }

    #[test]
    fn high_ratio_sets_alert_flag() {
        // avg 90, max 100 => ratio 0.9 > 0.8.
        let stats = AggregateStats::compute("M-1", &[80.0, 90.0, 100.0], &thresholds(), 0);
        assert!((stats.bottleneck_ratio - 0.9).abs() < 1e-9);
        assert!(stats.alert);
    }

    #[test]
    fn moderate_ratio_does_not_alert() {
        // avg 50, max 100 => ratio 0.5.
        let stats = AggregateStats::compute("M-1", &[0.0, 50.0, 100.0], &thresholds(), 0);
        assert!((stats.bottleneck_ratio - 0.5).abs() < 1e-9);
        assert!(!stats.alert);
    }

    #[test]
    fn empty_window_defaults_max_to_one() {
        let stats = AggregateStats::compute("M-2", &[], &thresholds(), 0);
        assert_eq!(stats.sample_count, 0);
        assert_eq!(stats.avg_runtime, 0.0);
        assert_eq!(stats.max_runtime, 1.0);
        assert_eq!(stats.bottleneck_ratio, 0.0);
        assert!(!stats.alert);
    }

    #[test]
    fn sub_one_samples_keep_ratio_in_range() {
        // max below 1.0 is clamped to 1.0, so the ratio equals the average.
        let stats = AggregateStats::compute("M-3", &[0.2, 0.4], &thresholds(), 0);
        assert_eq!(stats.max_runtime, 1.0);
        assert!((stats.bottleneck_ratio - 0.3).abs() < 1e-9);
    }
}
