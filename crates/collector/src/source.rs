//! Publishing telemetry payloads onto the bus.

use linewatch_bus::{MessageBus, PublishError};
use linewatch_core::topics::TOPIC_TELEMETRY_RAW;

/// Publish raw payloads to the ingestion topic, keyed by machine id so each
/// machine's samples stay in order through the pipeline.
pub async fn publish_all(
    bus: &MessageBus,
    payloads: Vec<serde_json::Value>,
) -> Result<(), PublishError> {
    let count = payloads.len();

    for payload in payloads {
        let key = payload["machineId"].as_str().map(str::to_owned);
        bus.publish(TOPIC_TELEMETRY_RAW, key.as_deref(), payload)
            .await?;
    }

    tracing::info!(count, "Published telemetry batch");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
