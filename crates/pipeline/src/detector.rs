//! Detector stage: rule evaluation over records and aggregates.
//!
//! [`DetectorStage`] consumes both detection inputs -- the decoded-records
//! topic (the immediate, low-latency record tier) and the aggregates topic
//! (the per-window tier) -- evaluates the pure rules from
//! [`linewatch_core::detector`], and hands every non-empty [`Detection`]
//! point-to-point to the alert dispatcher's mailbox. A record or window that
//! triggers nothing produces nothing; that is the normal case, not an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use linewatch_bus::{Disposition, Envelope, MessageBus, Subscription};
use linewatch_core::detector::{evaluate_record, evaluate_stats};
use linewatch_core::topics::{MAILBOX_DISPATCHER, TOPIC_AGGREGATES, TOPIC_TELEMETRY_RECORDS};
use linewatch_core::{AggregateStats, Detection, TelemetryRecord, Thresholds};

/// The detection worker.
pub struct DetectorStage {
    bus: Arc<MessageBus>,
    thresholds: Thresholds,
    records: Subscription,
    aggregates: Subscription,
}

impl DetectorStage {
    /// Create the stage and subscribe to both detection inputs.
    pub fn new(bus: Arc<MessageBus>, thresholds: Thresholds) -> Self {
        let records = bus.subscribe(TOPIC_TELEMETRY_RECORDS);
        let aggregates = bus.subscribe(TOPIC_AGGREGATES);
        Self {
            bus,
            thresholds,
            records,
            aggregates,
        }
    }

    /// Drain both inputs until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let thresholds = self.thresholds;

        let record_bus = self.bus.clone();
        let record_loop = self.records.serve(cancel.clone(), move |envelope| {
            let bus = record_bus.clone();
            async move { handle_record(&bus, &thresholds, envelope).await }
        });

        let aggregate_bus = self.bus.clone();
        let aggregate_loop = self.aggregates.serve(cancel, move |envelope| {
            let bus = aggregate_bus.clone();
            async move { handle_stats(&bus, &thresholds, envelope).await }
        });

        tokio::join!(record_loop, aggregate_loop);
        tracing::info!("Detector stopped");
    }
}

/// Record tier: evaluate one telemetry sample.
async fn handle_record(
    bus: &MessageBus,
    thresholds: &Thresholds,
    envelope: Envelope,
) -> Disposition {
    let record: TelemetryRecord = match serde_json::from_value(envelope.payload) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable record envelope");
            return Disposition::Ack;
        }
    };

    let reasons = evaluate_record(&record, thresholds);
    if reasons.is_empty() {
        tracing::debug!(machine_id = %record.machine_id, "Record within thresholds");
        return Disposition::Ack;
    }

    let detection = Detection {
        machine_id: record.machine_id,
        timestamp: record.timestamp,
        reasons,
    };
    forward(bus, detection).await
}

/// Aggregate tier: evaluate one closed window's statistics.
async fn handle_stats(
    bus: &MessageBus,
    thresholds: &Thresholds,
    envelope: Envelope,
) -> Disposition {
    let stats: AggregateStats = match serde_json::from_value(envelope.payload) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable aggregate envelope");
            return Disposition::Ack;
        }
    };

    let reasons = evaluate_stats(&stats, thresholds);
    if reasons.is_empty() {
        tracing::debug!(machine_id = %stats.machine_id, "Window within thresholds");
        return Disposition::Ack;
    }

    let detection = Detection {
        machine_id: stats.machine_id,
        timestamp: stats.computed_at,
        reasons,
    };
    forward(bus, detection).await
}

/// Hand a non-empty detection to the dispatcher's mailbox.
async fn forward(bus: &MessageBus, detection: Detection) -> Disposition {
    tracing::info!(
        machine_id = %detection.machine_id,
        reasons = ?detection.reasons,
        "Bottleneck condition detected"
    );

    let payload = serde_json::to_value(&detection).expect("Detection is always serialisable");
    match bus.send(MAILBOX_DISPATCHER, payload).await {
        Ok(_) => Disposition::Ack,
        Err(e) => {
            tracing::error!(error = %e, machine_id = %detection.machine_id, "Failed to hand detection to dispatcher");
            Disposition::Nack
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
