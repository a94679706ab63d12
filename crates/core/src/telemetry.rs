//! Canonical decoded telemetry event.

use serde::{Deserialize, Serialize};

/// Operational status reported alongside a telemetry sample.
///
/// Status strings the platform does not recognise deserialize to
/// [`MachineStatus::Unknown`] rather than failing the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    /// Machine operating within its expected envelope.
    Normal,
    /// Machine reported itself as degraded.
    Slow,
    /// Unreported or unrecognised status.
    #[serde(other)]
    Unknown,
}

/// A single decoded machine-telemetry event.
///
/// Created by the ingestion adapter, consumed by the aggregator and the
/// record-tier detector. Immutable once decoded -- ownership transfers at
/// publish time and the publisher never mutates it afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub machine_id: String,
    /// Sample time in epoch milliseconds. Always positive.
    pub timestamp: i64,
    pub runtime_minutes: f64,
    pub downtime_minutes: f64,
    pub production_count: i64,
    pub status: MachineStatus,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
