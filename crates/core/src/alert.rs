//! Externally published bottleneck alert.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::detector::{Detection, TriggerReason};

/// Value of the `type` field on every published alert payload.
pub const ALERT_TYPE_BOTTLENECK: &str = "bottleneck";

/// Severity of a bottleneck alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Only record-tier rules fired.
    Warning,
    /// At least one aggregate-tier rule fired.
    Critical,
}

/// The alert message published to the alert topic and rendered by the
/// notifier.
///
/// `reasons` is non-empty by construction: an alert only exists when at
/// least one detection rule fired. `(machine_id, timestamp)` is the identity
/// key the dispatcher de-duplicates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub machine_id: String,
    /// Timestamp of the originating record or window close, epoch ms.
    pub timestamp: i64,
    /// Every rule that fired, in deterministic order.
    pub reasons: BTreeSet<TriggerReason>,
    pub severity: Severity,
    /// Payload discriminator for downstream consumers; always `"bottleneck"`.
    #[serde(rename = "type")]
    pub alert_type: String,
}

impl AlertMessage {
    /// Build an alert from a non-empty detection.
    ///
    /// Severity is `Critical` when any aggregate-tier reason is present and
    /// `Warning` otherwise.
    pub fn from_detection(detection: Detection) -> Self {
        let severity = if detection.reasons.iter().any(TriggerReason::is_aggregate_tier) {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Self {
            machine_id: detection.machine_id,
            timestamp: detection.timestamp,
            reasons: detection.reasons,
            severity,
            alert_type: ALERT_TYPE_BOTTLENECK.to_string(),
        }
    }

    /// De-duplication identity for this alert.
    pub fn dedup_key(&self) -> (String, i64) {
        (self.machine_id.clone(), self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
