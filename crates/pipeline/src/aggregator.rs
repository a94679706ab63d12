//! Per-machine running-window aggregation.
//!
//! [`AggregatorStage`] owns one window accumulator per machine id. The window
//! closes after `window_size` samples; at close the stage computes
//! [`AggregateStats`], resets that machine's accumulator, and publishes the
//! statistics downstream. Samples arriving after a close simply start the
//! next window -- closed windows are never retroactively merged.
//!
//! The accumulator map is exclusively owned by this stage and mutated only
//! from its single receive loop, which is what keeps per-machine updates
//! serial without locks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use linewatch_bus::{MessageBus, Subscription};
use linewatch_core::topics::{TOPIC_AGGREGATES, TOPIC_TELEMETRY_RECORDS};
use linewatch_core::{AggregateStats, PipelineConfig, TelemetryRecord};

/// The aggregation worker.
pub struct AggregatorStage {
    bus: Arc<MessageBus>,
    config: PipelineConfig,
    sub: Subscription,
    /// machine id -> runtime samples observed since that window opened.
    windows: HashMap<String, Vec<f64>>,
}

impl AggregatorStage {
    /// Create the stage and subscribe to the decoded-records topic.
    pub fn new(bus: Arc<MessageBus>, config: PipelineConfig) -> Self {
        let sub = bus.subscribe(TOPIC_TELEMETRY_RECORDS);
        Self {
            bus,
            config,
            sub,
            windows: HashMap::new(),
        }
    }

    /// Drain the records topic until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        while let Some(envelope) = self.sub.recv(&cancel).await {
            let record: TelemetryRecord = match serde_json::from_value(envelope.payload) {
                Ok(record) => record,
                Err(e) => {
                    // Upstream publishes only valid records; anything else is
                    // dropped rather than redelivered.
                    tracing::warn!(error = %e, "Dropping undecodable record envelope");
                    continue;
                }
            };
            self.observe(record).await;
        }
        tracing::info!("Aggregator stopped");
    }

    /// Fold one record into its machine's window, closing the window when it
    /// reaches the configured size.
    async fn observe(&mut self, record: TelemetryRecord) {
        let window = self.windows.entry(record.machine_id.clone()).or_default();
        window.push(record.runtime_minutes);

        if window.len() < self.config.window_size {
            return;
        }

        let samples = std::mem::take(window);
        let stats = AggregateStats::compute(
            &record.machine_id,
            &samples,
            &self.config.thresholds,
            Utc::now().timestamp_millis(),
        );

        tracing::info!(
            machine_id = %stats.machine_id,
            sample_count = stats.sample_count,
            avg_runtime = stats.avg_runtime,
            max_runtime = stats.max_runtime,
            bottleneck_ratio = stats.bottleneck_ratio,
            "Aggregation window closed"
        );

        let payload =
            serde_json::to_value(&stats).expect("AggregateStats is always serialisable");

        if let Err(e) = self
            .bus
            .publish(TOPIC_AGGREGATES, Some(&stats.machine_id), payload)
            .await
        {
            tracing::error!(error = %e, machine_id = %stats.machine_id, "Failed to publish aggregate statistics");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use linewatch_core::MachineStatus;

    fn record(machine_id: &str, runtime: f64) -> TelemetryRecord {
        TelemetryRecord {
            machine_id: machine_id.to_string(),
            timestamp: 1,
            runtime_minutes: runtime,
            downtime_minutes: 0.0,
            production_count: 0,
            status: MachineStatus::Normal,
        }
    }

    fn stage_with_window(bus: &Arc<MessageBus>, window_size: usize) -> AggregatorStage {
        let config = PipelineConfig {
            window_size,
            ..PipelineConfig::default()
        };
        AggregatorStage::new(bus.clone(), config)
    }

    #[tokio::test]
    async fn window_of_ten_emits_one_stats_record() {
        let bus = Arc::new(MessageBus::default());
        let mut aggregates = bus.subscribe(TOPIC_AGGREGATES);
        let mut stage = stage_with_window(&bus, 10);
        let cancel = CancellationToken::new();

        for i in 1..=10 {
            stage.observe(record("M-0", (i * 10) as f64)).await;
        }

        let envelope = aggregates.recv(&cancel).await.unwrap();
        let stats: AggregateStats = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(stats.machine_id, "M-0");
        assert_eq!(stats.sample_count, 10);
        assert!((stats.avg_runtime - 55.0).abs() < f64::EPSILON);
        assert_eq!(stats.max_runtime, 100.0);

        // The window reset: ten more samples close exactly one more window.
        for i in 1..=10 {
            stage.observe(record("M-0", (i * 10) as f64)).await;
        }
        let envelope = aggregates.recv(&cancel).await.unwrap();
        let stats: AggregateStats = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(stats.sample_count, 10);
    }

    #[tokio::test]
    async fn windows_are_tracked_per_machine() {
        let bus = Arc::new(MessageBus::default());
        let mut aggregates = bus.subscribe(TOPIC_AGGREGATES);
        let mut stage = stage_with_window(&bus, 2);
        let cancel = CancellationToken::new();

        // Interleave two machines; only M-0 reaches its window size.
        stage.observe(record("M-0", 10.0)).await;
        stage.observe(record("M-1", 99.0)).await;
        stage.observe(record("M-0", 30.0)).await;

        let envelope = aggregates.recv(&cancel).await.unwrap();
        let stats: AggregateStats = serde_json::from_value(envelope.payload).unwrap();
        assert_eq!(stats.machine_id, "M-0");
        assert!((stats.avg_runtime - 20.0).abs() < f64::EPSILON);

        // M-1 still has an open window with a single sample.
        assert_eq!(stage.windows.get("M-1").map(Vec::len), Some(1));
        assert_eq!(stage.windows.get("M-0").map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn partial_window_emits_nothing() {
        let bus = Arc::new(MessageBus::default());
        let mut stage = stage_with_window(&bus, 5);

        for _ in 0..4 {
            stage.observe(record("M-0", 50.0)).await;
        }

        assert_eq!(stage.windows.get("M-0").map(Vec::len), Some(4));
    }
}
