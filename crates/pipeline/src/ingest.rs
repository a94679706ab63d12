//! Ingestion adapter: raw transport payloads to telemetry records.
//!
//! [`IngestStage`] subscribes to the raw telemetry topic, validates each
//! payload against the external ingestion schema, and republishes the decoded
//! [`TelemetryRecord`] keyed by machine id. Malformed payloads are dropped
//! and acknowledged -- bad data will not become valid on redelivery.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use linewatch_bus::{Disposition, Envelope, MessageBus, Subscription};
use linewatch_core::topics::{TOPIC_TELEMETRY_RAW, TOPIC_TELEMETRY_RECORDS};
use linewatch_core::{MachineStatus, TelemetryRecord};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for ingestion payloads that fail decoding or validation.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload does not match the ingestion schema at all.
    #[error("Payload is not a valid ingestion record: {0}")]
    Json(#[from] serde_json::Error),

    /// A field is present but violates a constraint.
    #[error("Field {field} is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// IngestionPayload
// ---------------------------------------------------------------------------

/// External ingestion record, field names as published by telemetry sources.
///
/// `downtime` and `productionCount` are optional and default to zero;
/// unrecognised `status` strings decode to [`MachineStatus::Unknown`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionPayload {
    pub machine_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Runtime minutes for this sample.
    pub runtime: f64,
    #[serde(default)]
    pub downtime: f64,
    #[serde(default)]
    pub production_count: i64,
    #[serde(default)]
    pub status: Option<MachineStatus>,
}

impl IngestionPayload {
    /// Validate the payload and convert it into a [`TelemetryRecord`].
    pub fn into_record(self) -> Result<TelemetryRecord, DecodeError> {
        if self.machine_id.trim().is_empty() {
            return Err(DecodeError::Invalid {
                field: "machineId",
                reason: "must not be empty",
            });
        }
        if self.timestamp <= 0 {
            return Err(DecodeError::Invalid {
                field: "timestamp",
                reason: "must be positive epoch milliseconds",
            });
        }
        if !self.runtime.is_finite() {
            return Err(DecodeError::Invalid {
                field: "runtime",
                reason: "must be a finite number",
            });
        }
        if !self.downtime.is_finite() {
            return Err(DecodeError::Invalid {
                field: "downtime",
                reason: "must be a finite number",
            });
        }

        Ok(TelemetryRecord {
            machine_id: self.machine_id,
            timestamp: self.timestamp,
            runtime_minutes: self.runtime,
            downtime_minutes: self.downtime,
            production_count: self.production_count,
            status: self.status.unwrap_or(MachineStatus::Unknown),
        })
    }
}

/// Decode and validate one raw payload.
pub fn decode(payload: &serde_json::Value) -> Result<TelemetryRecord, DecodeError> {
    let parsed: IngestionPayload = serde_json::from_value(payload.clone())?;
    parsed.into_record()
}

// ---------------------------------------------------------------------------
// IngestStage
// ---------------------------------------------------------------------------

/// The ingestion adapter worker.
pub struct IngestStage {
    bus: Arc<MessageBus>,
    sub: Subscription,
}

impl IngestStage {
    /// Create the stage and subscribe to the raw telemetry topic.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let sub = bus.subscribe(TOPIC_TELEMETRY_RAW);
        Self { bus, sub }
    }

    /// Drain the raw topic until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let bus = self.bus;
        self.sub
            .serve(cancel, move |envelope| {
                let bus = bus.clone();
                async move { handle(&bus, envelope).await }
            })
            .await;
    }
}

/// Process one raw payload: decode, validate, republish keyed by machine id.
async fn handle(bus: &MessageBus, envelope: Envelope) -> Disposition {
    let record = match decode(&envelope.payload) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                error = %e,
                payload = %envelope.payload,
                "Dropping malformed telemetry payload"
            );
            // Ack: redelivery cannot repair malformed data.
            return Disposition::Ack;
        }
    };

    let payload =
        serde_json::to_value(&record).expect("TelemetryRecord is always serialisable");

    match bus
        .publish(TOPIC_TELEMETRY_RECORDS, Some(&record.machine_id), payload)
        .await
    {
        Ok(_) => {
            tracing::debug!(machine_id = %record.machine_id, "Ingested telemetry record");
            Disposition::Ack
        }
        Err(e) => {
            tracing::error!(error = %e, machine_id = %record.machine_id, "Failed to publish decoded record");
            Disposition::Nack
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
