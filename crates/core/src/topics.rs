//! Canonical bus topic and mailbox names.
//!
//! Kept in one place so stage wiring and tests never drift on string names.

/// Raw ingestion payloads published by telemetry sources.
pub const TOPIC_TELEMETRY_RAW: &str = "telemetry.raw";

/// Decoded [`TelemetryRecord`](crate::TelemetryRecord)s, keyed by machine id.
pub const TOPIC_TELEMETRY_RECORDS: &str = "telemetry.records";

/// [`AggregateStats`](crate::AggregateStats) emitted at window close.
pub const TOPIC_AGGREGATES: &str = "telemetry.aggregates";

/// Published [`AlertMessage`](crate::AlertMessage)s for downstream consumers.
pub const TOPIC_ALERTS: &str = "alerts.bottleneck";

/// Point-to-point mailbox of the alert dispatcher stage.
pub const MAILBOX_DISPATCHER: &str = "alert-dispatcher";
